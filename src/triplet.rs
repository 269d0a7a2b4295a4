//! `Triplet`: the (global id, task, offset) record underlying every exchange map.
//!
//! A triplet array is sortable by any one of its three fields and then binary-
//! searchable by that same field. Sorting always falls back to the full record
//! as a tie-break so that equal-key runs have one canonical order and searches
//! are reproducible across runs.
//!
//! The type is `#[repr(C)]` and `Pod` so triplet arrays can be shipped between
//! tasks as raw bytes during exchange construction.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// One record of an exchange map.
///
/// The meaning of `offset` depends on the list the triplet lives in: in a
/// compute-ordered list it is the element's position in the caller's compute
/// buffer; in an I/O-ordered list it is the position within the contributing
/// task's compute element list.
#[repr(C)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Pod, Zeroable, serde::Serialize, serde::Deserialize,
)]
pub struct Triplet {
    /// Identifier of the element in the global element space.
    pub global_id: u64,
    /// The peer task this record pairs the element with.
    pub task: u64,
    /// List-dependent local position (see type docs).
    pub offset: u64,
}

const_assert_eq!(std::mem::size_of::<Triplet>(), 24);
const_assert_eq!(std::mem::align_of::<Triplet>(), 8);

impl Triplet {
    #[inline]
    pub fn new(global_id: u64, task: u64, offset: u64) -> Self {
        Self {
            global_id,
            task,
            offset,
        }
    }
}

/// Selects which field of a [`Triplet`] acts as the sort/search key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TripletKey {
    GlobalId,
    Task,
    Offset,
}

impl Triplet {
    /// The value of the selected key field.
    #[inline]
    pub fn key(&self, key: TripletKey) -> u64 {
        match key {
            TripletKey::GlobalId => self.global_id,
            TripletKey::Task => self.task,
            TripletKey::Offset => self.offset,
        }
    }
}

/// Sorts `arr` ascending by the chosen key field.
///
/// Records with equal keys are ordered by (global id, task, offset), so the
/// result is a total order independent of the input permutation.
pub fn sort_by_key(arr: &mut [Triplet], key: TripletKey) {
    arr.sort_unstable_by_key(|t| (t.key(key), t.global_id, t.task, t.offset));
}

/// Binary search for the first record whose key field equals `value`.
///
/// Requires `arr` to be sorted by the same key (see [`sort_by_key`]); the
/// result is unspecified otherwise. Returns the index of the first match.
pub fn search_by_key(arr: &[Triplet], key: TripletKey, value: u64) -> Option<usize> {
    let idx = arr.partition_point(|t| t.key(key) < value);
    match arr.get(idx) {
        Some(t) if t.key(key) == value => Some(idx),
        _ => None,
    }
}

/// Views a triplet array as raw wire bytes.
pub fn as_bytes(arr: &[Triplet]) -> &[u8] {
    bytemuck::cast_slice(arr)
}

/// Decodes wire bytes back into triplet records.
///
/// The payload may carry any alignment, so records are copied out rather than
/// reinterpreted in place.
pub fn from_bytes(payload: &[u8]) -> Result<Vec<Triplet>, String> {
    let record = std::mem::size_of::<Triplet>();
    if payload.len() % record != 0 {
        return Err(format!(
            "payload of {} bytes is not a whole number of {record}-byte records",
            payload.len()
        ));
    }
    Ok(bytemuck::pod_collect_to_vec(payload))
}
