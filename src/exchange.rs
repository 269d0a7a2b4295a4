//! Exchange construction: resolves, for every task, which peers its compute
//! elements must be traded with for I/O, and materializes the two triplet
//! lists a [`Decomposition`](crate::decomp::Decomposition) carries.
//!
//! Because I/O ranges are contiguous and deterministic, the owner of any
//! global id is plain arithmetic ([`IoLayout::owner_of`]); no directory
//! lookup round is needed. Each task routes one triplet per compute element
//! to its owner with a single personalized all-to-all, then audits its own
//! range: every element must arrive from exactly one compute task.

use crate::comm::Communicator;
use crate::error::IoDecompError;
use crate::layout::IoLayout;
use crate::triplet::{self, Triplet, TripletKey, search_by_key, sort_by_key};

/// Builds the compute-side and I/O-side triplet lists for this task.
///
/// `comp_list` holds one triplet per local compute element: (global id, owner
/// task, position in the caller's compute buffer), sorted task-major with
/// ascending global id inside each task group. `io_list` holds one triplet
/// per element of this task's I/O range: (global id, contributing task,
/// position within that task's compute list), sorted by global id, so the
/// list index of an entry is also the element's position in an I/O-ordered
/// buffer.
///
/// Collective over `comm`. On a consistency failure the error names the first
/// offending global id; peers that see no local inconsistency return
/// successfully, so detection is best-effort per task.
pub(crate) fn build_exchange<C: Communicator>(
    comm: &C,
    compute_elements: &[u64],
    layout: &IoLayout,
) -> Result<(Vec<Triplet>, Vec<Triplet>), IoDecompError> {
    let rank = comm.rank();
    let size = comm.size();

    // Route each compute element to its I/O owner.
    let mut comp_list = Vec::with_capacity(compute_elements.len());
    let mut outgoing: Vec<Vec<Triplet>> = vec![Vec::new(); size];
    for (offset, &global_id) in compute_elements.iter().enumerate() {
        let owner = layout.owner_of(global_id)?;
        if owner >= size {
            return Err(IoDecompError::InvalidArgument(
                "I/O tasks at the requested stride exceed the process group",
            ));
        }
        comp_list.push(Triplet::new(global_id, owner as u64, offset as u64));
        outgoing[owner].push(Triplet::new(global_id, rank as u64, offset as u64));
    }
    sort_by_key(&mut comp_list, TripletKey::Task);
    for bucket in &mut outgoing {
        sort_by_key(bucket, TripletKey::GlobalId);
    }

    log::trace!(
        "rank {rank}: routing {} compute elements to {} I/O owners",
        compute_elements.len(),
        outgoing.iter().filter(|b| !b.is_empty()).count()
    );

    let sends = outgoing
        .iter()
        .map(|bucket| triplet::as_bytes(bucket).to_vec())
        .collect();
    let received = comm.all_to_allv(sends)?;

    // Collect the contributions claimed for this task's own range.
    let my_range = layout.range(rank);
    let mut contrib: Vec<Triplet> = Vec::with_capacity(my_range.count as usize);
    for (from, payload) in received.iter().enumerate() {
        let records = triplet::from_bytes(payload)
            .map_err(|reason| IoDecompError::MalformedPayload { from, reason })?;
        for t in records {
            if t.task != from as u64 {
                return Err(IoDecompError::MalformedPayload {
                    from,
                    reason: format!("record names task {} as its source", t.task),
                });
            }
            if !my_range.contains(t.global_id) {
                return Err(IoDecompError::UnexpectedContribution {
                    global_id: t.global_id,
                    from,
                });
            }
            contrib.push(t);
        }
    }
    sort_by_key(&mut contrib, TripletKey::GlobalId);

    // Exactly one contributor per element of the range.
    for k in 0..my_range.count {
        let want = my_range.start + k;
        match search_by_key(&contrib, TripletKey::GlobalId, want) {
            None => {
                return Err(IoDecompError::MissingContributor {
                    global_id: want,
                    io_start: my_range.start,
                    io_end: my_range.end(),
                });
            }
            Some(i) => {
                if contrib.get(i + 1).is_some_and(|t| t.global_id == want) {
                    return Err(IoDecompError::DuplicateContributor {
                        global_id: want,
                        first: contrib[i].task as usize,
                        second: contrib[i + 1].task as usize,
                    });
                }
            }
        }
    }

    Ok((comp_list, contrib))
}
