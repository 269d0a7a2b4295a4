//! MPI backend (feature = "mpi-support").
//!
//! Wraps a duplicated communicator so library traffic can never collide with
//! the caller's own messages on the parent communicator. The caller owns MPI
//! initialization and the parent communicator; both must outlive every
//! decomposition built through this handle.

use hashbrown::HashMap;
use mpi::collective::{CommunicatorCollectives, SystemOperation};
use mpi::datatype::{Partition, PartitionMut};
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Communicator as MpiCommunicator, SimpleCommunicator};

use crate::comm::Communicator;
use crate::error::IoDecompError;

pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// Duplicates `parent` and communicates exclusively on the duplicate.
    pub fn duplicate_from<C: MpiCommunicator>(parent: &C) -> Self {
        Self {
            comm: parent.duplicate(),
        }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn exchange(
        &self,
        sends: &HashMap<usize, Vec<u8>>,
        recv_counts: &HashMap<usize, usize>,
    ) -> Result<HashMap<usize, Vec<u8>>, IoDecompError> {
        let size = self.size();
        if let Some(&peer) = sends
            .keys()
            .chain(recv_counts.keys())
            .find(|&&p| p >= size)
        {
            return Err(IoDecompError::Comm {
                neighbor: peer,
                reason: format!("group has only {size} ranks"),
            });
        }

        // Deterministic posting order; one message per (src, dst) pair, so a
        // single tag suffices and MPI's non-overtaking rule keeps sequential
        // exchanges matched.
        let mut recv_bufs: Vec<(usize, Vec<u8>)> = recv_counts
            .iter()
            .filter(|&(_, &want)| want > 0)
            .map(|(&peer, &want)| (peer, vec![0u8; want]))
            .collect();
        recv_bufs.sort_unstable_by_key(|&(peer, _)| peer);
        let mut send_refs: Vec<(usize, &[u8])> = sends
            .iter()
            .filter(|&(_, payload)| !payload.is_empty())
            .map(|(&peer, payload)| (peer, payload.as_slice()))
            .collect();
        send_refs.sort_unstable_by_key(|&(peer, _)| peer);

        mpi::request::scope(|scope| {
            let mut recv_reqs = Vec::with_capacity(recv_bufs.len());
            for (peer, buf) in recv_bufs.iter_mut() {
                recv_reqs.push(
                    self.comm
                        .process_at_rank(*peer as i32)
                        .immediate_receive_into(scope, &mut buf[..]),
                );
            }
            let mut send_reqs = Vec::with_capacity(send_refs.len());
            for &(peer, payload) in &send_refs {
                send_reqs.push(
                    self.comm
                        .process_at_rank(peer as i32)
                        .immediate_send(scope, payload),
                );
            }
            for req in recv_reqs {
                req.wait();
            }
            for req in send_reqs {
                req.wait();
            }
        });

        Ok(recv_bufs.into_iter().collect())
    }

    fn all_to_allv(&self, sends: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, IoDecompError> {
        let size = self.size();
        if sends.len() != size {
            return Err(IoDecompError::InvalidArgument(
                "all_to_allv requires exactly one send buffer per rank",
            ));
        }

        let send_counts: Vec<i32> = sends.iter().map(|b| b.len() as i32).collect();
        let mut recv_counts = vec![0i32; size];
        self.comm
            .all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let displs = |counts: &[i32]| -> Vec<i32> {
            counts
                .iter()
                .scan(0, |acc, &c| {
                    let at = *acc;
                    *acc += c;
                    Some(at)
                })
                .collect()
        };
        let send_displs = displs(&send_counts);
        let recv_displs = displs(&recv_counts);

        let flat: Vec<u8> = sends.concat();
        let total: i32 = recv_counts.iter().sum();
        let mut recv_flat = vec![0u8; total as usize];
        {
            let send_part = Partition::new(&flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part =
                PartitionMut::new(&mut recv_flat[..], &recv_counts[..], &recv_displs[..]);
            self.comm.all_to_all_varcount_into(&send_part, &mut recv_part);
        }

        Ok(recv_counts
            .iter()
            .zip(recv_displs.iter())
            .map(|(&count, &at)| recv_flat[at as usize..(at + count) as usize].to_vec())
            .collect())
    }

    fn allreduce_sum(&self, value: u64) -> Result<u64, IoDecompError> {
        let mut total = 0u64;
        self.comm
            .all_reduce_into(&value, &mut total, SystemOperation::sum());
        Ok(total)
    }
}
