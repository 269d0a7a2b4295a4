//! IoDecompError: unified error type for io-decomp public APIs
//!
//! Every fallible operation in this crate returns one of these variants as a
//! value; there is no shared "last error" state anywhere in the library.

use thiserror::Error;

/// Unified error type for io-decomp operations.
///
/// Variants fall into four classes: invalid arguments (detected locally,
/// before any communication is attempted), communication failures reported by
/// the process-group backend, and consistency failures discovered while
/// building an exchange. Consistency failures are detected per task; a peer
/// task may complete the same collective without seeing the error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IoDecompError {
    /// A locally-detectable bad argument. Returned before any collective call
    /// so that peer tasks are never left blocked on a mismatched exchange.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A field buffer does not hold exactly `count * element_size` bytes.
    #[error("field buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// The communicator passed to a transfer spans a different number of
    /// tasks than the one the decomposition was built over.
    #[error("communicator has {actual} ranks but decomposition was built over {expected}")]
    CommSizeMismatch { expected: usize, actual: usize },

    /// The process-group backend reported a failure talking to `neighbor`.
    #[error("communication with rank {neighbor} failed: {reason}")]
    Comm { neighbor: usize, reason: String },

    /// A peer delivered a payload whose bytes do not decode as the expected
    /// wire records.
    #[error("malformed payload from rank {from}: {reason}")]
    MalformedPayload { from: usize, reason: String },

    /// An element of this task's I/O range `[io_start, io_end)` was claimed
    /// by no compute task. The compute decompositions across tasks are
    /// inconsistent with the global element count.
    #[error("global element {global_id} in I/O range [{io_start}, {io_end}) has no compute contributor")]
    MissingContributor {
        global_id: u64,
        io_start: u64,
        io_end: u64,
    },

    /// An element of this task's I/O range was claimed by more than one
    /// compute task.
    #[error("global element {global_id} claimed by compute ranks {first} and {second}")]
    DuplicateContributor {
        global_id: u64,
        first: usize,
        second: usize,
    },

    /// A compute element's global id lies outside `[0, n_global)`, so no I/O
    /// task owns it.
    #[error("global element {global_id} is outside the global space of {n_global} elements")]
    OwnerOutOfRange { global_id: u64, n_global: u64 },

    /// A peer contributed an element that is not in this task's I/O range;
    /// the tasks disagree on the partitioning arithmetic.
    #[error("rank {from} contributed element {global_id}, which is outside this task's I/O range")]
    UnexpectedContribution { global_id: u64, from: usize },
}
