//! # io-decomp
//!
//! io-decomp is the decomposition-and-exchange layer of a scalable parallel
//! I/O stack: many cooperating processes each compute a subset of a global
//! element set, while a smaller set of I/O processes owns contiguous ranges
//! of the same space for reading and writing a persisted file. This crate
//! builds, once, the mapping between those two partitions and then executes
//! it as sparse personalized point-to-point data movement on every transfer.
//!
//! ## What it provides
//! - [`layout::IoLayout`]: deterministic range partitioning of the global
//!   space across strided I/O ranks, with a closed-form owner lookup
//! - [`decomp::Decomposition`]: the immutable exchange map built collectively
//!   from each task's compute element list
//! - [`transfer_field`](transfer::transfer_field): bidirectional movement of
//!   opaque fixed-size records between compute-ordered and I/O-ordered
//!   buffers
//! - Pluggable process-group backends ([`comm::NoComm`], [`comm::LocalComm`],
//!   and MPI behind the `mpi-support` feature)
//!
//! The crate performs no file I/O itself: an I/O-ordered buffer produced by a
//! compute-to-I/O transfer is the record contract with whatever backend
//! persists it: one fixed-size record per element of
//! `[io_start, io_start + io_count)`, in ascending global-id order.
//!
//! ## Determinism
//!
//! Triplet lists are sorted with a total-order tie-break at build time, and
//! every task packs and unpacks peer messages in that fixed order, so
//! repeated builds and transfers with identical inputs produce byte-identical
//! buffers regardless of message arrival order.
//!
//! ## Collective calling convention
//!
//! Building a decomposition and transferring a field are collective: every
//! rank of the process group must make the same calls in the same relative
//! order. A rank that skips a collective leaves its peers blocked; there are
//! no timeouts.

pub mod comm;
pub mod decomp;
pub mod error;
mod exchange;
pub mod layout;
pub mod transfer;
pub mod triplet;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::Communicator;
    pub use crate::comm::LocalComm;
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::NoComm;
    pub use crate::decomp::Decomposition;
    pub use crate::error::IoDecompError;
    pub use crate::layout::{IoLayout, IoRange, io_range};
    pub use crate::transfer::{Direction, transfer_field};
    pub use crate::triplet::{Triplet, TripletKey};
}
