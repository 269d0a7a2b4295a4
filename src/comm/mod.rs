//! Thin façade over the process group a decomposition is built across.
//!
//! The exchange builder and the field transfer engine only ever need three
//! things from the group: its shape (`rank`/`size`), a blocking personalized
//! all-to-all, and a blocking all-reduce sum. Everything else about the
//! backend (in-process mailboxes, MPI) stays behind this trait.
//!
//! All group operations are collective: every rank of the group must call
//! them in the same relative order with compatible arguments. A rank that
//! does not participate leaves its peers blocked; no timeout is applied.

use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;
use static_assertions::assert_eq_size;

use crate::error::IoDecompError;

mod local;
#[cfg(feature = "mpi-support")]
mod mpi;

pub use local::LocalComm;
#[cfg(feature = "mpi-support")]
pub use mpi::MpiComm;

/// Fixed-width count header exchanged ahead of variable-size payloads.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub(crate) struct WireCount(pub u64);

assert_eq_size!(WireCount, u64);

/// Blocking message passing within one process group.
///
/// `exchange` is the sparse primitive both the builder and the transfer
/// engine run on; `all_to_allv` and `allreduce_sum` have default
/// implementations layered on top of it (count header first, payload second),
/// which backends with native collectives override.
pub trait Communicator: Send + Sync {
    /// This process's rank within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Blocking sparse personalized exchange with known receive counts.
    ///
    /// `sends` maps peer rank to the bytes to deliver there; `recv_counts`
    /// maps peer rank to the exact byte count expected from it. Both sides of
    /// every pairing must agree on the count; a disagreement is either
    /// reported as a communication error or, for a peer that never sends,
    /// not locally detectable at all. Empty payloads and zero counts are
    /// equivalent to absent entries; no message is transmitted for them, so a
    /// task with nothing to move performs no communication here.
    fn exchange(
        &self,
        sends: &HashMap<usize, Vec<u8>>,
        recv_counts: &HashMap<usize, usize>,
    ) -> Result<HashMap<usize, Vec<u8>>, IoDecompError>;

    /// Blocking dense personalized all-to-all with count discovery.
    ///
    /// `sends[i]` is delivered to rank `i` (one entry per rank, empty
    /// allowed); the result holds the payload received from each rank.
    /// Collective: every rank exchanges a count header with every other rank
    /// before payloads move.
    fn all_to_allv(&self, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, IoDecompError> {
        let size = self.size();
        if sends.len() != size {
            return Err(IoDecompError::InvalidArgument(
                "all_to_allv requires exactly one send buffer per rank",
            ));
        }
        let header = std::mem::size_of::<WireCount>();
        let mut hdr_sends = HashMap::with_capacity(size);
        let mut hdr_counts = HashMap::with_capacity(size);
        for (peer, buf) in sends.iter().enumerate() {
            let count = WireCount(buf.len() as u64);
            hdr_sends.insert(peer, bytemuck::bytes_of(&count).to_vec());
            hdr_counts.insert(peer, header);
        }
        let headers = self.exchange(&hdr_sends, &hdr_counts)?;

        let mut payload_counts = HashMap::new();
        for peer in 0..size {
            let Some(bytes) = headers.get(&peer) else {
                continue;
            };
            if bytes.len() != header {
                return Err(IoDecompError::Comm {
                    neighbor: peer,
                    reason: format!("expected {header}-byte count header, got {}", bytes.len()),
                });
            }
            let n = bytemuck::pod_read_unaligned::<WireCount>(bytes).0 as usize;
            if n > 0 {
                payload_counts.insert(peer, n);
            }
        }
        let mut payload_sends = HashMap::new();
        for (peer, buf) in sends.into_iter().enumerate() {
            if !buf.is_empty() {
                payload_sends.insert(peer, buf);
            }
        }
        let mut received = self.exchange(&payload_sends, &payload_counts)?;
        Ok((0..size)
            .map(|peer| received.remove(&peer).unwrap_or_default())
            .collect())
    }

    /// Blocking all-reduce: the sum of `value` over every rank in the group.
    fn allreduce_sum(&self, value: u64) -> Result<u64, IoDecompError> {
        let word = bytemuck::bytes_of(&WireCount(value)).to_vec();
        let contributions = self.all_to_allv(vec![word; self.size()])?;
        let mut total = 0u64;
        for (peer, bytes) in contributions.iter().enumerate() {
            if bytes.len() != std::mem::size_of::<WireCount>() {
                return Err(IoDecompError::Comm {
                    neighbor: peer,
                    reason: format!("expected one count word, got {} bytes", bytes.len()),
                });
            }
            total += bytemuck::pod_read_unaligned::<WireCount>(bytes).0;
        }
        Ok(total)
    }
}

/// Compile-time no-op group for pure serial use and unit tests: one rank,
/// self-delivery only.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(
        &self,
        sends: &HashMap<usize, Vec<u8>>,
        recv_counts: &HashMap<usize, usize>,
    ) -> Result<HashMap<usize, Vec<u8>>, IoDecompError> {
        if let Some(&peer) = sends.keys().chain(recv_counts.keys()).find(|&&p| p != 0) {
            return Err(IoDecompError::Comm {
                neighbor: peer,
                reason: "single-task group has no such rank".into(),
            });
        }
        let want = recv_counts.get(&0).copied().unwrap_or(0);
        let have = sends.get(&0).map_or(0, Vec::len);
        let mut out = HashMap::new();
        if want == 0 && have == 0 {
            return Ok(out);
        }
        if want != have {
            return Err(IoDecompError::Comm {
                neighbor: 0,
                reason: format!("self-exchange mismatch: sent {have} bytes, expected {want}"),
            });
        }
        out.insert(0, sends.get(&0).cloned().unwrap_or_default());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nocomm_self_exchange() {
        let comm = NoComm;
        let mut sends = HashMap::new();
        sends.insert(0usize, vec![1u8, 2, 3]);
        let mut counts = HashMap::new();
        counts.insert(0usize, 3usize);
        let got = comm.exchange(&sends, &counts).unwrap();
        assert_eq!(got[&0], vec![1, 2, 3]);
    }

    #[test]
    fn nocomm_empty_exchange_is_noop() {
        let got = NoComm.exchange(&HashMap::new(), &HashMap::new()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn nocomm_rejects_unknown_peer_and_mismatch() {
        let comm = NoComm;
        let mut sends = HashMap::new();
        sends.insert(1usize, vec![0u8]);
        assert!(matches!(
            comm.exchange(&sends, &HashMap::new()),
            Err(IoDecompError::Comm { neighbor: 1, .. })
        ));
        let mut sends = HashMap::new();
        sends.insert(0usize, vec![0u8; 2]);
        let mut counts = HashMap::new();
        counts.insert(0usize, 5usize);
        assert!(matches!(
            comm.exchange(&sends, &counts),
            Err(IoDecompError::Comm { neighbor: 0, .. })
        ));
    }

    #[test]
    fn nocomm_collectives() {
        let comm = NoComm;
        assert_eq!(comm.allreduce_sum(17).unwrap(), 17);
        let got = comm.all_to_allv(vec![vec![9u8, 8]]).unwrap();
        assert_eq!(got, vec![vec![9u8, 8]]);
    }
}
