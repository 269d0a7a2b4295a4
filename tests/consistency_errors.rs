//! Inconsistent compute decompositions must surface as typed consistency
//! failures on the task that owns the affected I/O range, with no usable
//! decomposition returned there.

use io_decomp::prelude::*;
use serial_test::serial;

fn run_universe<T: Send>(size: usize, f: impl Fn(&LocalComm) -> T + Sync) -> Vec<T> {
    let comms = LocalComm::universe(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
#[serial]
fn duplicated_element_is_rejected_by_its_io_owner() {
    // Both ranks claim global id 1; the summed count says N = 4, so the
    // compute union cannot cover [0, 4).
    let results = run_universe(2, |comm| {
        let elems: &[u64] = if comm.rank() == 0 { &[0, 1] } else { &[1, 2] };
        Decomposition::create(comm, elems, 1, 1)
    });
    match &results[0] {
        Err(IoDecompError::DuplicateContributor {
            global_id: 1,
            first,
            second,
        }) => assert_ne!(first, second),
        other => panic!("expected DuplicateContributor, got {other:?}"),
    }
    // detection is per task: the rank owning no I/O range sees nothing wrong
    assert!(results[1].is_ok());
}

#[test]
#[serial]
fn uncovered_element_is_rejected_by_its_io_owner() {
    // N = 4 but nobody computes global id 1.
    let results = run_universe(2, |comm| {
        let elems: &[u64] = if comm.rank() == 0 { &[0, 3] } else { &[2, 3] };
        Decomposition::create(comm, elems, 1, 1)
    });
    match &results[0] {
        Err(IoDecompError::MissingContributor {
            global_id: 1,
            io_start: 0,
            io_end: 4,
        }) => {}
        other => panic!("expected MissingContributor, got {other:?}"),
    }
    assert!(results[1].is_ok());
}

#[test]
fn out_of_space_element_fails_before_routing() {
    // A lone task claims id 2 of a 2-element space.
    let res = Decomposition::create(&NoComm, &[0, 2], 1, 1);
    assert_eq!(
        res.err(),
        Some(IoDecompError::OwnerOutOfRange {
            global_id: 2,
            n_global: 2
        })
    );
}
