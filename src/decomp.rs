//! The decomposition object: an immutable, reusable exchange map between one
//! compute decomposition and one I/O decomposition of a global element space.
//!
//! Built once per layout, then driven any number of times by
//! [`transfer_field`](crate::transfer::transfer_field). Releasing it is plain
//! ownership: dropping the value frees both triplet lists on every path.

use crate::comm::Communicator;
use crate::error::IoDecompError;
use crate::exchange::build_exchange;
use crate::layout::IoLayout;
use crate::triplet::{Triplet, TripletKey, search_by_key};

/// An immutable exchange map for one global element space.
///
/// The process group is not stored; it is passed to each collective operation
/// and must keep the same shape (see
/// [`IoDecompError::CommSizeMismatch`]) for as long as the decomposition is
/// in use.
pub struct Decomposition {
    io_start: u64,
    io_count: u64,
    n_compute: usize,
    comm_size: usize,
    comp_list: Vec<Triplet>,
    io_list: Vec<Triplet>,
}

impl Decomposition {
    /// Builds the exchange map between compute tasks and I/O tasks.
    ///
    /// `compute_elements` are the global ids this task computes, in the order
    /// its field buffers are laid out; the global element count is the sum of
    /// these list lengths over all tasks. `num_io_tasks` of the group's
    /// ranks, spaced `io_stride` apart starting at rank 0, each own one
    /// contiguous I/O range.
    ///
    /// Collective over `comm`. Locally-detectable argument errors are
    /// returned before any communication; consistency failures (an I/O
    /// element computed by zero tasks or by more than one) are reported by
    /// the task that owns the element, and no usable decomposition is
    /// returned anywhere an error is reported.
    pub fn create<C: Communicator>(
        comm: &C,
        compute_elements: &[u64],
        num_io_tasks: usize,
        io_stride: usize,
    ) -> Result<Self, IoDecompError> {
        if num_io_tasks > 1 {
            if io_stride == 0 {
                return Err(IoDecompError::InvalidArgument(
                    "io_stride must be nonzero for more than one I/O task",
                ));
            }
            let last = (num_io_tasks - 1).checked_mul(io_stride).ok_or(
                IoDecompError::InvalidArgument("num_io_tasks * io_stride overflows"),
            )?;
            if last >= comm.size() {
                return Err(IoDecompError::InvalidArgument(
                    "I/O tasks at the requested stride exceed the process group",
                ));
            }
        }

        let n_global = comm.allreduce_sum(compute_elements.len() as u64)?;
        if n_global > 0 && num_io_tasks == 0 {
            return Err(IoDecompError::InvalidArgument(
                "a non-empty element space needs at least one I/O task",
            ));
        }

        let layout = IoLayout::new(num_io_tasks, io_stride, n_global);
        let range = layout.range(comm.rank());
        let (comp_list, io_list) = build_exchange(comm, compute_elements, &layout)?;

        log::debug!(
            "rank {}: decomposition over {n_global} elements: {} computed here, I/O range [{}, {})",
            comm.rank(),
            compute_elements.len(),
            range.start,
            range.end()
        );

        Ok(Self {
            io_start: range.start,
            io_count: range.count,
            n_compute: compute_elements.len(),
            comm_size: comm.size(),
            comp_list,
            io_list,
        })
    }

    /// First element of this task's contiguous I/O range.
    #[inline]
    pub fn io_start(&self) -> u64 {
        self.io_start
    }

    /// Number of elements in this task's I/O range; sizes I/O-ordered
    /// buffers.
    #[inline]
    pub fn io_count(&self) -> u64 {
        self.io_count
    }

    /// Number of elements this task computes; sizes compute-ordered buffers.
    #[inline]
    pub fn n_compute(&self) -> usize {
        self.n_compute
    }

    /// Size of the process group the map was built over.
    #[inline]
    pub fn comm_size(&self) -> usize {
        self.comm_size
    }

    /// For an element of this task's I/O range, the rank that computes it
    /// and the element's position within that rank's compute list.
    pub fn io_contributor(&self, global_id: u64) -> Option<(usize, u64)> {
        let i = search_by_key(&self.io_list, TripletKey::GlobalId, global_id)?;
        let t = &self.io_list[i];
        Some((t.task as usize, t.offset))
    }

    pub(crate) fn comp_list(&self) -> &[Triplet] {
        &self.comp_list
    }

    pub(crate) fn io_list(&self) -> &[Triplet] {
        &self.io_list
    }
}

impl std::fmt::Debug for Decomposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposition")
            .field("io_start", &self.io_start)
            .field("io_count", &self.io_count)
            .field("n_compute", &self.n_compute)
            .field("comm_size", &self.comm_size)
            .field("comp_list", &self.comp_list)
            .field("io_list", &self.io_list)
            .finish()
    }
}
