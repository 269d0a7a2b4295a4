//! In-process multi-rank backend: every "rank" is a thread sharing a mailbox.
//!
//! This is the harness that lets the full collective code path run inside one
//! OS process, deterministically, without an MPI launcher. Messages are keyed
//! by `(source, destination, epoch)`; the epoch is a per-rank counter bumped
//! on every `exchange` call, which works because group operations are
//! collective and therefore invoked in the same order on every rank.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use hashbrown::HashMap;

use crate::comm::Communicator;
use crate::error::IoDecompError;

type SlotKey = (usize, usize, u64); // (src, dst, epoch)

/// One rank of an in-process group created by [`LocalComm::universe`].
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<DashMap<SlotKey, Bytes>>,
    epoch: AtomicU64,
}

impl LocalComm {
    /// Creates a group of `size` ranks sharing one mailbox. Each returned
    /// handle is meant to be driven from its own thread.
    pub fn universe(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                epoch: AtomicU64::new(0),
            })
            .collect()
    }

    fn check_peer(&self, peer: usize) -> Result<(), IoDecompError> {
        if peer >= self.size {
            return Err(IoDecompError::Comm {
                neighbor: peer,
                reason: format!("group has only {} ranks", self.size),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn exchange(
        &self,
        sends: &HashMap<usize, Vec<u8>>,
        recv_counts: &HashMap<usize, usize>,
    ) -> Result<HashMap<usize, Vec<u8>>, IoDecompError> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);

        for (&peer, payload) in sends {
            self.check_peer(peer)?;
            if payload.is_empty() {
                continue;
            }
            self.mailbox
                .insert((self.rank, peer, epoch), Bytes::copy_from_slice(payload));
        }

        let mut expected: Vec<(usize, usize)> = recv_counts
            .iter()
            .filter(|&(_, &want)| want > 0)
            .map(|(&peer, &want)| (peer, want))
            .collect();
        expected.sort_unstable();

        let mut out = HashMap::with_capacity(expected.len());
        for (peer, want) in expected {
            self.check_peer(peer)?;
            let key = (peer, self.rank, epoch);
            let bytes = loop {
                if let Some((_, v)) = self.mailbox.remove(&key) {
                    break v;
                }
                std::thread::yield_now();
            };
            if bytes.len() != want {
                return Err(IoDecompError::Comm {
                    neighbor: peer,
                    reason: format!("received {} bytes, expected {want}", bytes.len()),
                });
            }
            out.insert(peer, bytes.to_vec());
        }
        log::trace!(
            "rank {}: exchange epoch {epoch}: {} sent, {} received",
            self.rank,
            sends.len(),
            out.len()
        );
        Ok(out)
    }
}
