//! Canonical text summary of a shelf entry.
//!
//! The summary is what gets embedded and what ends up in the answer context,
//! so it must be a pure function of the entry's fields.

use crate::types::ShelfEntry;
use sha2::{Digest, Sha256};

/// Compose the summary text for a shelf entry.
pub fn compose_summary(entry: &ShelfEntry) -> String {
    let book = &entry.book;
    let user_book = &entry.user_book;

    let genre = non_empty(&book.genre).unwrap_or("Unknown");
    let published = book
        .publication_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let rating = user_book
        .rating
        .map(|r| format!("{}/5", r))
        .unwrap_or_else(|| "None".to_string());
    let notes = non_empty(&user_book.notes).unwrap_or("No notes");

    let mut text = format!(
        "Book: {} by {}. Genre: {}. Published: {}. Status: {}. Rating: {}. Notes: {}. Last updated: {}.",
        book.title.trim(),
        book.author.trim(),
        genre,
        published,
        user_book.status.label(),
        rating,
        notes,
        user_book.updated_at.format("%Y-%m-%d"),
    );

    if let Some(description) = non_empty(&book.description) {
        text.push_str(" Description: ");
        text.push_str(description);
    }

    text
}

/// SHA-256 hex digest of the summary text.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Book, ReadingStatus, UserBook};
    use chrono::{TimeZone, Utc};

    fn entry(rating: Option<u8>, notes: &str, description: &str) -> ShelfEntry {
        ShelfEntry {
            user_book: UserBook {
                id: 7,
                user_id: 1,
                book_id: 3,
                status: ReadingStatus::Read,
                rating,
                notes: notes.to_string(),
                updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap(),
            },
            book: Book {
                id: 3,
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                genre: "Science Fiction".to_string(),
                publication_year: Some(1965),
                description: description.to_string(),
            },
        }
    }

    #[test]
    fn test_summary_with_all_fields() {
        let text = compose_summary(&entry(Some(5), "Loved the worldbuilding", "Desert planet."));
        assert_eq!(
            text,
            "Book: Dune by Frank Herbert. Genre: Science Fiction. Published: 1965. \
             Status: Read. Rating: 5/5. Notes: Loved the worldbuilding. \
             Last updated: 2024-03-01. Description: Desert planet."
        );
    }

    #[test]
    fn test_summary_placeholders() {
        let text = compose_summary(&entry(None, "  ", ""));
        assert!(text.contains("Rating: None."));
        assert!(text.contains("Notes: No notes."));
        assert!(!text.contains("Description"));
    }

    #[test]
    fn test_hash_is_stable() {
        let a = compose_summary(&entry(Some(4), "ok", ""));
        let b = compose_summary(&entry(Some(4), "ok", ""));
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
        assert_ne!(content_hash(&a), content_hash("something else"));
    }
}
