//! SQLite-backed catalog and embedding store.

use super::{CatalogStore, EmbeddingStore};
use crate::types::{
    Book, Candidate, EmbeddingRecord, EmbeddingUpsert, NewBook, ReadingStatus, SearchFilters,
    ShelfEntry, ShelfStats, UserBook, UserId,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shelf_core::{AppError, AppResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    genre TEXT NOT NULL DEFAULT '',
    publication_year INTEGER,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS user_books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'want_to_read',
    rating INTEGER CHECK (rating IS NULL OR rating BETWEEN 1 AND 5),
    notes TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, book_id)
);

CREATE TABLE IF NOT EXISTS book_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_book_id INTEGER NOT NULL UNIQUE REFERENCES user_books(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding BLOB NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_books_user ON user_books(user_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_book_embeddings_user ON book_embeddings(user_id);
"#;

const ENTRY_COLUMNS: &str = "ub.id, ub.user_id, ub.book_id, ub.status, ub.rating, ub.notes, \
     ub.updated_at, b.id, b.title, b.author, b.genre, b.publication_year, b.description";

const RECORD_COLUMNS: &str =
    "e.id, e.user_book_id, e.user_id, e.content, e.content_hash, e.updated_at";

/// Both stores over one SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file, creating parent directories.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite database: {}", e)))?;

        let store = Self::init(conn)?;
        tracing::debug!("Opened shelf database at {:?}", db_path);
        Ok(store)
    }

    /// In-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open in-memory database: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AppError::Store(format!("Failed to enable foreign keys: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store("Database connection lock poisoned".to_string()))
    }

    fn query_entries(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> AppResult<Vec<ShelfEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM user_books ub JOIN books b ON b.id = ub.book_id WHERE {} \
             ORDER BY ub.updated_at DESC, ub.id DESC",
            ENTRY_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params, entry_from_row)
            .map_err(|e| AppError::Store(format!("Failed to query shelf entries: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read shelf entry: {}", e)))
    }
}

/// Fixed-precision RFC 3339 so that text order equals time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(idx: usize, value: String) -> rusqlite::Result<ReadingStatus> {
    value
        .parse::<ReadingStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_rating(idx: usize, value: Option<i64>) -> rusqlite::Result<Option<u8>> {
    value
        .map(|r| {
            u8::try_from(r).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e))
            })
        })
        .transpose()
}

fn book_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(offset)?,
        title: row.get(offset + 1)?,
        author: row.get(offset + 2)?,
        genre: row.get(offset + 3)?,
        publication_year: row.get(offset + 4)?,
        description: row.get(offset + 5)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ShelfEntry> {
    Ok(ShelfEntry {
        user_book: UserBook {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            status: parse_status(3, row.get(3)?)?,
            rating: parse_rating(4, row.get(4)?)?,
            notes: row.get(5)?,
            updated_at: parse_timestamp(6, row.get(6)?)?,
        },
        book: book_from_row(row, 7)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    Ok(EmbeddingRecord {
        id: row.get(0)?,
        user_book_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        content_hash: row.get(4)?,
        updated_at: parse_timestamp(5, row.get(5)?)?,
    })
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Store(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine distance in [0, 2]; `None` when the dimensions differ.
fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(1.0);
    }

    Some(1.0 - dot / (norm_a * norm_b))
}

// Genre is matched in Rust through `SearchFilters::matches_genre`.
const FILTERED_RECORDS: &str = "FROM book_embeddings e \
     JOIN user_books ub ON ub.id = e.user_book_id \
     JOIN books b ON b.id = ub.book_id \
     WHERE e.user_id = ?1 \
       AND (?2 IS NULL OR ub.status = ?2)";

impl CatalogStore for SqliteStore {
    fn insert_book(&self, book: &NewBook) -> AppResult<Book> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO books (title, author, genre, publication_year, description) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                book.title.trim(),
                book.author.trim(),
                book.genre.trim(),
                book.publication_year,
                book.description.trim(),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert book: {}", e)))?;

        Ok(Book {
            id: conn.last_insert_rowid(),
            title: book.title.trim().to_string(),
            author: book.author.trim().to_string(),
            genre: book.genre.trim().to_string(),
            publication_year: book.publication_year,
            description: book.description.trim().to_string(),
        })
    }

    fn get_book(&self, book_id: i64) -> AppResult<Option<Book>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, author, genre, publication_year, description FROM books WHERE id = ?1",
            params![book_id],
            |row| book_from_row(row, 0),
        )
        .optional()
        .map_err(|e| AppError::Store(format!("Failed to fetch book {}: {}", book_id, e)))
    }

    fn list_books(&self) -> AppResult<Vec<Book>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, author, genre, publication_year, description FROM books \
                 ORDER BY title COLLATE NOCASE, id",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| book_from_row(row, 0))
            .map_err(|e| AppError::Store(format!("Failed to list books: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read book: {}", e)))
    }

    fn search_books(&self, query: &str) -> AppResult<Vec<Book>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, author, genre, publication_year, description FROM books \
                 WHERE instr(lower(title), lower(?1)) > 0 OR instr(lower(author), lower(?1)) > 0 \
                 ORDER BY title COLLATE NOCASE, id",
            )
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![query], |row| book_from_row(row, 0))
            .map_err(|e| AppError::Store(format!("Failed to search books: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read book: {}", e)))
    }

    fn insert_entry(&self, entry: &UserBook) -> AppResult<UserBook> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_books (user_id, book_id, status, rating, notes, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.user_id,
                entry.book_id,
                entry.status.as_str(),
                entry.rating.map(i64::from),
                entry.notes,
                format_timestamp(&entry.updated_at),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to insert shelf entry: {}", e)))?;

        Ok(UserBook {
            id: conn.last_insert_rowid(),
            ..entry.clone()
        })
    }

    fn update_entry(&self, entry: &UserBook) -> AppResult<()> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE user_books SET status = ?1, rating = ?2, notes = ?3, updated_at = ?4 \
                 WHERE id = ?5 AND user_id = ?6",
                params![
                    entry.status.as_str(),
                    entry.rating.map(i64::from),
                    entry.notes,
                    format_timestamp(&entry.updated_at),
                    entry.id,
                    entry.user_id,
                ],
            )
            .map_err(|e| AppError::Store(format!("Failed to update shelf entry: {}", e)))?;

        if updated == 0 {
            return Err(AppError::NotFound(format!("Shelf entry {}", entry.id)));
        }
        Ok(())
    }

    fn delete_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM user_books WHERE id = ?1 AND user_id = ?2",
                params![user_book_id, user_id],
            )
            .map_err(|e| AppError::Store(format!("Failed to delete shelf entry: {}", e)))?;
        Ok(deleted > 0)
    }

    fn get_entry(&self, user_id: UserId, user_book_id: i64) -> AppResult<Option<ShelfEntry>> {
        Ok(self
            .query_entries("ub.user_id = ?1 AND ub.id = ?2", params![user_id, user_book_id])?
            .into_iter()
            .next())
    }

    fn find_entry(&self, user_id: UserId, book_id: i64) -> AppResult<Option<ShelfEntry>> {
        Ok(self
            .query_entries("ub.user_id = ?1 AND ub.book_id = ?2", params![user_id, book_id])?
            .into_iter()
            .next())
    }

    fn list_entries(
        &self,
        user_id: UserId,
        status: Option<ReadingStatus>,
    ) -> AppResult<Vec<ShelfEntry>> {
        self.query_entries(
            "ub.user_id = ?1 AND (?2 IS NULL OR ub.status = ?2)",
            params![user_id, status.map(|s| s.as_str())],
        )
    }

    fn list_users(&self) -> AppResult<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT user_id FROM user_books ORDER BY user_id")
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("Failed to list users: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read user id: {}", e)))
    }

    fn shelf_stats(&self, user_id: UserId) -> AppResult<ShelfStats> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(status = ?2), 0), AVG(rating) \
             FROM user_books WHERE user_id = ?1",
            params![user_id, ReadingStatus::Read.as_str()],
            |row| {
                Ok(ShelfStats {
                    total_books: row.get::<_, i64>(0)? as usize,
                    books_read: row.get::<_, i64>(1)? as usize,
                    average_rating: row.get(2)?,
                })
            },
        )
        .map_err(|e| AppError::Store(format!("Failed to compute shelf stats: {}", e)))
    }
}

impl EmbeddingStore for SqliteStore {
    fn upsert(&self, record: &EmbeddingUpsert) -> AppResult<EmbeddingRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO book_embeddings \
                 (user_book_id, user_id, content, content_hash, embedding, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(user_book_id) DO UPDATE SET \
                 user_id = excluded.user_id, \
                 content = excluded.content, \
                 content_hash = excluded.content_hash, \
                 embedding = excluded.embedding, \
                 updated_at = excluded.updated_at",
            params![
                record.user_book_id,
                record.user_id,
                record.content,
                record.content_hash,
                embedding_to_bytes(&record.embedding),
                format_timestamp(&record.updated_at),
            ],
        )
        .map_err(|e| AppError::Store(format!("Failed to upsert embedding: {}", e)))?;

        conn.query_row(
            &format!(
                "SELECT {} FROM book_embeddings e WHERE e.user_book_id = ?1",
                RECORD_COLUMNS
            ),
            params![record.user_book_id],
            record_from_row,
        )
        .map_err(|e| AppError::Store(format!("Failed to read upserted embedding: {}", e)))
    }

    fn content_hash(&self, user_book_id: i64) -> AppResult<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT content_hash FROM book_embeddings WHERE user_book_id = ?1",
            params![user_book_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Store(format!("Failed to read content hash: {}", e)))
    }

    fn recent(
        &self,
        user_id: UserId,
        status: ReadingStatus,
        limit: usize,
    ) -> AppResult<Vec<EmbeddingRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} {} ORDER BY ub.updated_at DESC, e.id ASC LIMIT ?3",
            RECORD_COLUMNS, FILTERED_RECORDS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(
                params![user_id, status.as_str(), limit as i64],
                record_from_row,
            )
            .map_err(|e| AppError::Store(format!("Failed to query recent records: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("Failed to read embedding record: {}", e)))
    }

    fn count_candidates(&self, user_id: UserId, filters: &SearchFilters) -> AppResult<usize> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT b.genre {}", FILTERED_RECORDS))
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let genres = stmt
            .query_map(
                params![user_id, filters.status.map(|s| s.as_str())],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| AppError::Store(format!("Failed to count candidates: {}", e)))?;

        let mut count = 0;
        for genre in genres {
            let genre =
                genre.map_err(|e| AppError::Store(format!("Failed to count candidates: {}", e)))?;
            if filters.matches_genre(&genre) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn nearest(
        &self,
        user_id: UserId,
        filters: &SearchFilters,
        query: &[f32],
        limit: usize,
    ) -> AppResult<Vec<Candidate>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {}, e.embedding, b.genre {} ORDER BY e.id",
            RECORD_COLUMNS, FILTERED_RECORDS
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(
                params![user_id, filters.status.map(|s| s.as_str())],
                |row| {
                    Ok((
                        record_from_row(row)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .map_err(|e| AppError::Store(format!("Failed to query embeddings: {}", e)))?;

        let mut candidates = Vec::new();
        for row in rows {
            let (record, bytes, genre) =
                row.map_err(|e| AppError::Store(format!("Failed to read embedding: {}", e)))?;
            if !filters.matches_genre(&genre) {
                continue;
            }
            let embedding = bytes_to_embedding(&bytes)?;

            match cosine_distance(query, &embedding) {
                Some(distance) => candidates.push(Candidate { record, distance }),
                None => tracing::warn!(
                    "Skipping record {} with {} dimensions (query has {})",
                    record.id,
                    embedding.len(),
                    query.len()
                ),
            }
        }

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);

        tracing::debug!(
            "Nearest search returned {} records (limit {})",
            candidates.len(),
            limit
        );

        Ok(candidates)
    }

    fn delete(&self, user_book_id: i64) -> AppResult<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM book_embeddings WHERE user_book_id = ?1",
                params![user_book_id],
            )
            .map_err(|e| AppError::Store(format!("Failed to delete embedding: {}", e)))?;
        Ok(deleted > 0)
    }

    fn count(&self, user_id: Option<UserId>) -> AppResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM book_embeddings WHERE ?1 IS NULL OR user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Store(format!("Failed to count embeddings: {}", e)))?;
        Ok(count as usize)
    }
}
