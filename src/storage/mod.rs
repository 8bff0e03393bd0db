//! `StorageBackend` — the authoritative key→(vector, metadata) store.
//!
//! Three variants: in-memory, disk-persisted, and a
//! hybrid disk-plus-LRU-cache. All three implement the same trait; indices
//! never touch vector bytes except through it.

mod disk;
mod hybrid;
mod memory;

pub use disk::DiskStorage;
pub use hybrid::HybridStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;
use crate::types::{Metadata, Page, Vector, VectorId};

/// Operations common to every storage variant. `store_vector` /
/// `update_vector` / `delete_vector` are single-vector atomic with respect
/// to concurrent readers on the same backend; `list_vectors` may observe a
/// snapshot stale up to the last committed write.
pub trait StorageBackend: Send + Sync {
    /// Store a new vector. Returns `true` iff it was newly inserted, `false`
    /// iff `id` already existed (in which case nothing is changed).
    fn store_vector(
        &self,
        id: VectorId,
        vector: Vector,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError>;

    /// Retrieve a vector and its metadata by id.
    fn retrieve_vector(
        &self,
        id: &VectorId,
    ) -> Result<Option<(Vector, Option<Metadata>)>, StorageError>;

    /// Replace the vector and/or metadata for an existing id. Either
    /// component may be `None` to leave it unchanged. Returns `true` iff
    /// `id` existed.
    fn update_vector(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError>;

    /// Remove a vector. Returns `true` iff it existed.
    fn delete_vector(&self, id: &VectorId) -> Result<bool, StorageError>;

    /// List up to `limit` ids in unspecified order (the whole set if
    /// `limit` is `None`).
    fn list_vectors(&self, limit: Option<usize>) -> Result<Vec<VectorId>, StorageError>;

    /// Paginated id listing with an opaque, backend-defined cursor. A
    /// completed scan (following `next_cursor` until `has_more` is false)
    /// visits every id present at scan start exactly once, tolerating
    /// concurrent inserts (which may or may not appear) without duplicating
    /// or dropping ids that existed throughout.
    fn list_vector_ids_paginated(
        &self,
        page_size: usize,
        cursor: Option<&[u8]>,
    ) -> Result<Page<VectorId>, StorageError>;

    /// Number of vectors currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release any in-process resources (caches, open handles) held by this
    /// backend. Idempotent. The default no-op suits backends with nothing to
    /// release; `HybridStorage` overrides it to drop its LRU cache.
    fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Pagination cursor used by [`MemoryStorage`] and as the id-ordering
/// component of [`DiskStorage`]/[`HybridStorage`]'s cursor: the last id
/// returned, so the next page resumes immediately after it in the
/// backend's own stable iteration order.
pub(crate) fn encode_cursor(last_id: &VectorId) -> Vec<u8> {
    last_id.as_uuid().as_bytes().to_vec()
}

pub(crate) fn decode_cursor(bytes: &[u8]) -> Option<VectorId> {
    let arr: [u8; 16] = bytes.try_into().ok()?;
    Some(VectorId::parse(&uuid::Uuid::from_bytes(arr).to_string()).ok()?)
}

/// Paginate a slice of already-sorted ids by last-seen-id cursor. Shared by
/// all three backends so the cursor semantics are identical regardless of
/// where the ids physically live.
pub(crate) fn paginate_sorted_ids(
    mut ids: Vec<VectorId>,
    page_size: usize,
    cursor: Option<&[u8]>,
) -> Page<VectorId> {
    ids.sort();
    let start = match cursor.and_then(decode_cursor) {
        Some(last_id) => ids.partition_point(|id| *id <= last_id),
        None => 0,
    };
    let remaining = &ids[start.min(ids.len())..];
    let take = remaining.len().min(page_size);
    let page_items = remaining[..take].to_vec();
    let has_more = remaining.len() > take;
    let next_cursor = if has_more {
        page_items.last().map(encode_cursor)
    } else {
        None
    };
    Page::new(page_items, next_cursor)
}
