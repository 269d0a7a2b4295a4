//! Field transfer: executes a built decomposition as sparse point-to-point
//! data movement between compute-ordered and I/O-ordered buffers.
//!
//! The engine is pure data movement over opaque fixed-size records. Per-peer
//! byte counts are implied by the decomposition's triplet lists, so no size
//! discovery happens at transfer time; both sides of every pairing pack and
//! unpack in the same (peer, global id) order fixed at build time, which
//! makes the output buffer byte-deterministic regardless of message arrival
//! order.

use hashbrown::HashMap;
use itertools::Itertools;

use crate::comm::Communicator;
use crate::decomp::Decomposition;
use crate::error::IoDecompError;
use crate::triplet::Triplet;

/// Which way records move through a decomposition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Compute-ordered input, I/O-ordered output (write path).
    ComputeToIo,
    /// I/O-ordered input, compute-ordered output (read path).
    IoToCompute,
}

/// Moves one field's records through `decomp` in the given direction.
///
/// For [`Direction::ComputeToIo`], `in_field` is indexed like the compute
/// element list the decomposition was built from and `out_field` receives
/// this task's I/O range in ascending global-id order; for
/// [`Direction::IoToCompute`] the roles invert. Buffers must hold exactly
/// `count * element_size` bytes for their respective layouts.
///
/// Collective over `comm`: every rank of the group must call with the same
/// direction and element size. A task with nothing to send or receive posts
/// no messages. Argument errors are detected and returned before any
/// communication is attempted.
pub fn transfer_field<C: Communicator>(
    decomp: &Decomposition,
    comm: &C,
    direction: Direction,
    element_size: usize,
    in_field: &[u8],
    out_field: &mut [u8],
) -> Result<(), IoDecompError> {
    if element_size == 0 {
        return Err(IoDecompError::InvalidArgument(
            "element_size must be nonzero",
        ));
    }
    if comm.size() != decomp.comm_size() {
        return Err(IoDecompError::CommSizeMismatch {
            expected: decomp.comm_size(),
            actual: comm.size(),
        });
    }
    let n_compute = decomp.n_compute();
    let io_count = decomp.io_count() as usize;
    let (n_in, n_out) = match direction {
        Direction::ComputeToIo => (n_compute, io_count),
        Direction::IoToCompute => (io_count, n_compute),
    };
    check_len(in_field.len(), n_in * element_size)?;
    check_len(out_field.len(), n_out * element_size)?;

    log::trace!(
        "rank {}: transfer {direction:?}, {n_in} -> {n_out} records of {element_size} bytes",
        comm.rank()
    );

    // The list driving sends is walked in its stored order to pack each
    // peer's message; the list driving receives is walked the same way to
    // scatter, consuming each peer's message front to back. comp_list
    // offsets address the compute buffer; io_list positions are the list
    // indices themselves.
    match direction {
        Direction::ComputeToIo => {
            let sends = pack_by_offset(decomp.comp_list(), element_size, in_field);
            let recv_counts = group_byte_counts(decomp.io_list(), element_size);
            let received = comm.exchange(&sends, &recv_counts)?;
            scatter_by_index(decomp.io_list(), element_size, &received, out_field)
        }
        Direction::IoToCompute => {
            let sends = pack_by_index(decomp.io_list(), element_size, in_field);
            let recv_counts = group_byte_counts(decomp.comp_list(), element_size);
            let received = comm.exchange(&sends, &recv_counts)?;
            scatter_by_offset(decomp.comp_list(), element_size, &received, out_field)
        }
    }
}

fn check_len(actual: usize, expected: usize) -> Result<(), IoDecompError> {
    if actual != expected {
        return Err(IoDecompError::BufferSizeMismatch { expected, actual });
    }
    Ok(())
}

/// Bytes expected from each peer named in `list`.
fn group_byte_counts(list: &[Triplet], element_size: usize) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    for t in list {
        *counts.entry(t.task as usize).or_default() += element_size;
    }
    counts
}

/// Packs per-peer messages gathering records at each triplet's offset.
fn pack_by_offset(list: &[Triplet], element_size: usize, field: &[u8]) -> HashMap<usize, Vec<u8>> {
    let mut sends = HashMap::new();
    for (task, group) in &list.iter().chunk_by(|t| t.task as usize) {
        let msg: &mut Vec<u8> = sends.entry(task).or_default();
        for t in group {
            let at = t.offset as usize * element_size;
            msg.extend_from_slice(&field[at..at + element_size]);
        }
    }
    sends
}

/// Packs per-peer messages gathering records at each triplet's list index.
fn pack_by_index(list: &[Triplet], element_size: usize, field: &[u8]) -> HashMap<usize, Vec<u8>> {
    let mut sends: HashMap<usize, Vec<u8>> = HashMap::new();
    for (i, t) in list.iter().enumerate() {
        let at = i * element_size;
        sends
            .entry(t.task as usize)
            .or_default()
            .extend_from_slice(&field[at..at + element_size]);
    }
    sends
}

/// Scatters each peer's message into the positions given by list indices.
fn scatter_by_index(
    list: &[Triplet],
    element_size: usize,
    received: &HashMap<usize, Vec<u8>>,
    field: &mut [u8],
) -> Result<(), IoDecompError> {
    let mut cursors: HashMap<usize, usize> = HashMap::new();
    for (i, t) in list.iter().enumerate() {
        let chunk = next_chunk(t, element_size, received, &mut cursors)?;
        field[i * element_size..(i + 1) * element_size].copy_from_slice(chunk);
    }
    Ok(())
}

/// Scatters each peer's message into the positions given by triplet offsets.
fn scatter_by_offset(
    list: &[Triplet],
    element_size: usize,
    received: &HashMap<usize, Vec<u8>>,
    field: &mut [u8],
) -> Result<(), IoDecompError> {
    let mut cursors: HashMap<usize, usize> = HashMap::new();
    for t in list {
        let chunk = next_chunk(t, element_size, received, &mut cursors)?;
        let at = t.offset as usize * element_size;
        field[at..at + element_size].copy_from_slice(chunk);
    }
    Ok(())
}

/// The next unconsumed record of `t.task`'s message.
fn next_chunk<'a>(
    t: &Triplet,
    element_size: usize,
    received: &'a HashMap<usize, Vec<u8>>,
    cursors: &mut HashMap<usize, usize>,
) -> Result<&'a [u8], IoDecompError> {
    let task = t.task as usize;
    let buf = received.get(&task).ok_or_else(|| IoDecompError::Comm {
        neighbor: task,
        reason: "no payload received from a task named by the exchange map".into(),
    })?;
    let cursor = cursors.entry(task).or_default();
    let chunk = buf
        .get(*cursor..*cursor + element_size)
        .ok_or_else(|| IoDecompError::Comm {
            neighbor: task,
            reason: "payload shorter than the exchange map requires".into(),
        })?;
    *cursor += element_size;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{LocalComm, NoComm};
    use crate::decomp::Decomposition;

    fn single_rank_decomp() -> Decomposition {
        // Rank 0 computes [3, 1, 0, 2] of a 4-element space it also owns.
        Decomposition::create(&NoComm, &[3, 1, 0, 2], 1, 1).unwrap()
    }

    #[test]
    fn rejects_zero_element_size() {
        let d = single_rank_decomp();
        let mut out = [0u8; 4];
        assert!(matches!(
            transfer_field(&d, &NoComm, Direction::ComputeToIo, 0, &[0u8; 4], &mut out),
            Err(IoDecompError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let d = single_rank_decomp();
        let mut out = [0u8; 4];
        let res = transfer_field(&d, &NoComm, Direction::ComputeToIo, 1, &[0u8; 3], &mut out);
        assert_eq!(
            res,
            Err(IoDecompError::BufferSizeMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn rejects_foreign_communicator() {
        let d = single_rank_decomp();
        let comms = LocalComm::universe(2);
        let mut out = [0u8; 4];
        assert_eq!(
            transfer_field(&d, &comms[0], Direction::ComputeToIo, 1, &[0u8; 4], &mut out),
            Err(IoDecompError::CommSizeMismatch {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn sorts_records_into_global_id_order() {
        let d = single_rank_decomp();
        // One byte per record, value = the global id it belongs to, laid out
        // in the compute order [3, 1, 0, 2].
        let in_field = [3u8, 1, 0, 2];
        let mut io_field = [0u8; 4];
        transfer_field(&d, &NoComm, Direction::ComputeToIo, 1, &in_field, &mut io_field).unwrap();
        assert_eq!(io_field, [0, 1, 2, 3]);

        let mut back = [0u8; 4];
        transfer_field(&d, &NoComm, Direction::IoToCompute, 1, &io_field, &mut back).unwrap();
        assert_eq!(back, in_field);
    }

    #[test]
    fn empty_decomposition_transfers_nothing() {
        let d = Decomposition::create(&NoComm, &[], 1, 1).unwrap();
        let mut out = [0u8; 0];
        transfer_field(&d, &NoComm, Direction::ComputeToIo, 8, &[], &mut out).unwrap();
    }
}
