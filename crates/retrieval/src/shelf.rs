//! Shelf management: catalog books and per-user shelf entries.
//!
//! Every save is announced to the registered observers, which is how the
//! embedding index stays in step with the shelf.

use crate::store::CatalogStore;
use crate::types::{Book, NewBook, ReadingStatus, ShelfEntry, ShelfStats, UserBook, UserId};
use chrono::Utc;
use shelf_core::{AppError, AppResult};
use std::sync::Arc;

/// Receives shelf save and removal notifications.
///
/// Observers must not fail the save that triggered them, so the methods
/// return nothing; implementations log their own errors.
#[async_trait::async_trait]
pub trait ShelfObserver: Send + Sync {
    async fn entry_saved(&self, entry: &ShelfEntry);

    async fn entry_removed(&self, user_id: UserId, user_book_id: i64);
}

/// Changes applied by [`Shelf::update_entry`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub status: Option<ReadingStatus>,
    /// `Some(None)` clears the rating
    pub rating: Option<Option<u8>>,
    pub notes: Option<String>,
}

/// Shelf service over a catalog store.
pub struct Shelf {
    catalog: Arc<dyn CatalogStore>,
    observers: Vec<Arc<dyn ShelfObserver>>,
}

impl Shelf {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            observers: Vec::new(),
        }
    }

    /// Register an observer for save notifications.
    pub fn with_observer(mut self, observer: Arc<dyn ShelfObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add a book to the catalog.
    pub fn add_book(&self, book: NewBook) -> AppResult<Book> {
        if book.title.trim().is_empty() || book.author.trim().is_empty() {
            return Err(AppError::Other(
                "Book title and author are required".to_string(),
            ));
        }

        let book = self.catalog.insert_book(&book)?;
        tracing::info!("Added book {} ({} by {})", book.id, book.title, book.author);
        Ok(book)
    }

    pub fn list_books(&self) -> AppResult<Vec<Book>> {
        self.catalog.list_books()
    }

    /// Catalog books whose title or author contains `query`. A blank query
    /// lists the whole catalog.
    pub fn search_books(&self, query: &str) -> AppResult<Vec<Book>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_books();
        }
        self.catalog.search_books(query)
    }

    /// Put a catalog book on the user's shelf.
    pub async fn add_to_shelf(
        &self,
        user_id: UserId,
        book_id: i64,
        status: Option<ReadingStatus>,
        rating: Option<u8>,
        notes: Option<String>,
    ) -> AppResult<ShelfEntry> {
        validate_rating(rating)?;

        let book = self
            .catalog
            .get_book(book_id)?
            .ok_or_else(|| AppError::NotFound(format!("Book {}", book_id)))?;

        if self.catalog.find_entry(user_id, book_id)?.is_some() {
            return Err(AppError::Other(format!(
                "Book {} is already on the shelf of user {}",
                book_id, user_id
            )));
        }

        let user_book = self.catalog.insert_entry(&UserBook {
            id: 0,
            user_id,
            book_id,
            status: status.unwrap_or_default(),
            rating,
            notes: notes.unwrap_or_default(),
            updated_at: Utc::now(),
        })?;

        let entry = ShelfEntry { user_book, book };
        tracing::info!(
            "User {} shelved book {} as {}",
            user_id,
            book_id,
            entry.user_book.status
        );

        self.notify_saved(&entry).await;
        Ok(entry)
    }

    /// Change status, rating or notes of a shelf entry.
    pub async fn update_entry(
        &self,
        user_id: UserId,
        user_book_id: i64,
        update: EntryUpdate,
    ) -> AppResult<ShelfEntry> {
        let mut entry = self.get_entry(user_id, user_book_id)?;

        if let Some(rating) = update.rating {
            validate_rating(rating)?;
            entry.user_book.rating = rating;
        }
        if let Some(status) = update.status {
            entry.user_book.status = status;
        }
        if let Some(notes) = update.notes {
            entry.user_book.notes = notes;
        }
        entry.user_book.updated_at = Utc::now();

        self.catalog.update_entry(&entry.user_book)?;
        tracing::info!("User {} updated shelf entry {}", user_id, user_book_id);

        self.notify_saved(&entry).await;
        Ok(entry)
    }

    /// Take an entry off the user's shelf.
    pub async fn remove_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<()> {
        if !self.catalog.delete_entry(user_id, user_book_id)? {
            return Err(AppError::NotFound(format!(
                "Shelf entry {} of user {}",
                user_book_id, user_id
            )));
        }

        tracing::info!("User {} removed shelf entry {}", user_id, user_book_id);
        for observer in &self.observers {
            observer.entry_removed(user_id, user_book_id).await;
        }
        Ok(())
    }

    pub fn get_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<ShelfEntry> {
        self.catalog
            .get_entry(user_id, user_book_id)?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Shelf entry {} of user {}",
                    user_book_id, user_id
                ))
            })
    }

    /// The user's entries, most recently updated first.
    pub fn list(&self, user_id: UserId, status: Option<ReadingStatus>) -> AppResult<Vec<ShelfEntry>> {
        self.catalog.list_entries(user_id, status)
    }

    /// Totals for the user's shelf.
    pub fn stats(&self, user_id: UserId) -> AppResult<ShelfStats> {
        let mut stats = self.catalog.shelf_stats(user_id)?;
        stats.average_rating = stats
            .average_rating
            .map(|average| (average * 10.0).round() / 10.0);
        Ok(stats)
    }

    async fn notify_saved(&self, entry: &ShelfEntry) {
        for observer in &self.observers {
            observer.entry_saved(entry).await;
        }
    }
}

fn validate_rating(rating: Option<u8>) -> AppResult<()> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => Err(AppError::Other(format!(
            "Rating must be between 1 and 5, got {}",
            r
        ))),
        _ => Ok(()),
    }
}
