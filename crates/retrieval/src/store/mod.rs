//! Storage seams for the catalog and the embedding records.
//!
//! Both traits are synchronous: the only implementation is an embedded
//! SQLite database whose calls are short and local.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::types::{
    Book, Candidate, EmbeddingRecord, EmbeddingUpsert, NewBook, ReadingStatus, SearchFilters,
    ShelfEntry, ShelfStats, UserBook, UserId,
};
use shelf_core::AppResult;

/// Books and shelf entries.
pub trait CatalogStore: Send + Sync {
    /// Insert a book into the catalog.
    fn insert_book(&self, book: &NewBook) -> AppResult<Book>;

    /// Fetch a catalog book.
    fn get_book(&self, book_id: i64) -> AppResult<Option<Book>>;

    /// All catalog books ordered by title.
    fn list_books(&self) -> AppResult<Vec<Book>>;

    /// Books whose title or author contains `query`, ignoring case,
    /// ordered by title.
    fn search_books(&self, query: &str) -> AppResult<Vec<Book>>;

    /// Insert a shelf entry. The `id` of `entry` is ignored.
    fn insert_entry(&self, entry: &UserBook) -> AppResult<UserBook>;

    /// Overwrite status, rating, notes and `updated_at` of an existing entry.
    fn update_entry(&self, entry: &UserBook) -> AppResult<()>;

    /// Delete a user's shelf entry. Returns whether a row was removed.
    fn delete_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<bool>;

    /// Fetch one of the user's shelf entries.
    fn get_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<Option<ShelfEntry>>;

    /// Find the user's entry for a catalog book.
    fn find_entry(&self, user_id: UserId, book_id: i64) -> AppResult<Option<ShelfEntry>>;

    /// The user's entries, optionally by status, most recently updated first.
    fn list_entries(
        &self,
        user_id: UserId,
        status: Option<ReadingStatus>,
    ) -> AppResult<Vec<ShelfEntry>>;

    /// Users owning at least one shelf entry.
    fn list_users(&self) -> AppResult<Vec<UserId>>;

    /// Entry count, read count and unrounded mean rating for a user.
    fn shelf_stats(&self, user_id: UserId) -> AppResult<ShelfStats>;
}

/// Embedding records, one per shelf entry.
pub trait EmbeddingStore: Send + Sync {
    /// Insert or replace the record keyed by `user_book_id`.
    fn upsert(&self, record: &EmbeddingUpsert) -> AppResult<EmbeddingRecord>;

    /// Stored content hash for a shelf entry, if a record exists.
    fn content_hash(&self, user_book_id: i64) -> AppResult<Option<String>>;

    /// The user's records for `status`, ordered by the shelf entry's
    /// `updated_at` descending.
    fn recent(
        &self,
        user_id: UserId,
        status: ReadingStatus,
        limit: usize,
    ) -> AppResult<Vec<EmbeddingRecord>>;

    /// Size of the user's base candidate set under `filters`.
    fn count_candidates(&self, user_id: UserId, filters: &SearchFilters) -> AppResult<usize>;

    /// The `limit` records closest to `query` within the user's filtered set,
    /// ordered by cosine distance ascending.
    fn nearest(
        &self,
        user_id: UserId,
        filters: &SearchFilters,
        query: &[f32],
        limit: usize,
    ) -> AppResult<Vec<Candidate>>;

    /// Delete the record of a shelf entry. Returns whether a row was removed.
    fn delete(&self, user_book_id: i64) -> AppResult<bool>;

    /// Number of records, for one user or overall.
    fn count(&self, user_id: Option<UserId>) -> AppResult<usize>;
}
