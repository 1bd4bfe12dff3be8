//! Core types for the bookshelf and its embedding records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_core::{AppError, AppResult};
use std::fmt;
use std::str::FromStr;

/// Identity of the acting user. Every store query is scoped by it.
pub type UserId = i64;

/// A catalog book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub publication_year: Option<i32>,
    pub description: String,
}

/// A book to be inserted into the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub publication_year: Option<i32>,
    pub description: String,
}

/// Reading status of a shelf entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    WantToRead,
    Reading,
    Read,
}

impl ReadingStatus {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Read => "read",
        }
    }

    /// Human-readable label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "Want to Read",
            ReadingStatus::Reading => "Currently Reading",
            ReadingStatus::Read => "Read",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "want_to_read" | "to_read" | "want" => Ok(ReadingStatus::WantToRead),
            "reading" | "currently_reading" => Ok(ReadingStatus::Reading),
            "read" | "finished" => Ok(ReadingStatus::Read),
            other => Err(AppError::Other(format!(
                "Unknown reading status: {}. Expected want_to_read, reading or read",
                other
            ))),
        }
    }
}

/// A user's association with a catalog book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBook {
    pub id: i64,
    pub user_id: UserId,
    pub book_id: i64,
    pub status: ReadingStatus,
    /// 1-5 when set
    pub rating: Option<u8>,
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

/// A shelf entry joined with its catalog book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfEntry {
    pub user_book: UserBook,
    pub book: Book,
}

/// Reading totals for one user's shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfStats {
    pub total_books: usize,
    pub books_read: usize,
    /// Mean over rated entries, rounded to one decimal
    pub average_rating: Option<f64>,
}

/// A stored embedding record, without its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub user_book_id: i64,
    pub user_id: UserId,
    pub content: String,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Values written by an embedding upsert.
#[derive(Debug, Clone)]
pub struct EmbeddingUpsert {
    pub user_book_id: i64,
    pub user_id: UserId,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

/// A record returned by nearest-neighbour search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub record: EmbeddingRecord,
    /// Cosine distance to the query vector (lower is closer)
    pub distance: f32,
}

/// Coarse filters applied to the base candidate set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub status: Option<ReadingStatus>,
    /// Canonical genre name
    pub genre: Option<String>,
    /// Other names the genre goes by, e.g. "sci-fi" for Science Fiction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genre_aliases: Vec<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ReadingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_genre_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genre_aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a book's free-text genre satisfies the genre filter.
    ///
    /// The canonical name or any alias must appear as a run of whole words,
    /// ignoring case and punctuation, so "Sci-Fi" and
    /// "Science Fiction & Fantasy" both match Science Fiction.
    pub fn matches_genre(&self, book_genre: &str) -> bool {
        let Some(ref genre) = self.genre else {
            return true;
        };

        let words = genre_words(book_genre);
        std::iter::once(genre)
            .chain(self.genre_aliases.iter())
            .map(|term| genre_words(term))
            .any(|term| {
                !term.is_empty() && words.windows(term.len()).any(|window| window == term)
            })
    }

    /// Check if any filters are set
    pub fn has_filters(&self) -> bool {
        self.status.is_some() || self.genre.is_some()
    }

    /// Short description for prompts and logs, e.g. `status read, genre Fantasy`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status {}", status.label().to_lowercase()));
        }
        if let Some(ref genre) = self.genre {
            parts.push(format!("genre {}", genre));
        }
        parts.join(", ")
    }
}

fn genre_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
