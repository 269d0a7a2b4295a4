//! Range partitioning of the global element space across I/O tasks.
//!
//! I/O ownership is deterministic arithmetic on `(num_io_tasks, io_stride,
//! n_global)`: ranks at positions `0, stride, 2*stride, ..` each own one
//! contiguous slice of `[0, n_global)`, divided as evenly as possible in
//! I/O-task order. Because the rule is closed-form, any task can resolve the
//! owner of any global id without communication, which keeps exchange
//! construction free of a directory lookup round.

use crate::error::IoDecompError;

/// A contiguous sub-range `[start, start + count)` of the global element space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IoRange {
    pub start: u64,
    pub count: u64,
}

impl IoRange {
    /// An empty range; what every non-I/O rank owns.
    pub const EMPTY: IoRange = IoRange { start: 0, count: 0 };

    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    #[inline]
    pub fn contains(&self, global_id: u64) -> bool {
        global_id >= self.start && global_id < self.end()
    }
}

/// The I/O decomposition rule for one global element space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IoLayout {
    num_io_tasks: usize,
    io_stride: usize,
    n_global: u64,
}

impl IoLayout {
    pub fn new(num_io_tasks: usize, io_stride: usize, n_global: u64) -> Self {
        Self {
            num_io_tasks,
            io_stride,
            n_global,
        }
    }

    /// Total number of elements in the global space.
    #[inline]
    pub fn n_global(&self) -> u64 {
        self.n_global
    }

    /// Position of `rank` among the I/O tasks, if it is one.
    fn io_index(&self, rank: usize) -> Option<u64> {
        let idx = if self.io_stride == 0 {
            // Degenerate stride: only rank 0 can be an I/O task.
            if rank == 0 { 0 } else { return None }
        } else {
            if rank % self.io_stride != 0 {
                return None;
            }
            rank / self.io_stride
        };
        (idx < self.num_io_tasks).then_some(idx as u64)
    }

    /// The contiguous range `rank` reads/writes; empty for non-I/O ranks.
    ///
    /// The `n_global` elements are split among the I/O tasks in I/O-task
    /// order: every task gets `n_global / num_io_tasks`, and the first
    /// `n_global % num_io_tasks` tasks get one extra, so the ranges tile
    /// `[0, n_global)` with no gaps or overlaps.
    pub fn range(&self, rank: usize) -> IoRange {
        if self.num_io_tasks == 0 || self.n_global == 0 {
            return IoRange::EMPTY;
        }
        let Some(i) = self.io_index(rank) else {
            return IoRange::EMPTY;
        };
        let k = self.num_io_tasks as u64;
        let base = self.n_global / k;
        let rem = self.n_global % k;
        IoRange {
            start: i * base + i.min(rem),
            count: base + u64::from(i < rem),
        }
    }

    /// Inverse of [`range`](Self::range): the rank that owns `global_id`.
    ///
    /// Fails with [`IoDecompError::OwnerOutOfRange`] when the id does not
    /// exist in the global space, which on a live exchange means the compute
    /// decompositions across tasks disagree on the element count.
    pub fn owner_of(&self, global_id: u64) -> Result<usize, IoDecompError> {
        if global_id >= self.n_global || self.num_io_tasks == 0 {
            return Err(IoDecompError::OwnerOutOfRange {
                global_id,
                n_global: self.n_global,
            });
        }
        let k = self.num_io_tasks as u64;
        let base = self.n_global / k;
        let rem = self.n_global % k;
        // The first `rem` I/O tasks hold `base + 1` elements each.
        let cut = rem * (base + 1);
        let i = if global_id < cut {
            global_id / (base + 1)
        } else {
            rem + (global_id - cut) / base
        };
        Ok(i as usize * self.io_stride.max(1))
    }
}

/// Convenience form of the partitioning rule, mirroring the classic
/// `(rank, num_io_tasks, stride, n) -> (io_start, io_count)` call contract.
pub fn io_range(rank: usize, num_io_tasks: usize, io_stride: usize, n_elements: u64) -> (u64, u64) {
    let r = IoLayout::new(num_io_tasks, io_stride, n_elements).range(rank);
    (r.start, r.count)
}
