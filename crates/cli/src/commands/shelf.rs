//! Shelf command handler.
//!
//! Manages a user's shelf entries. Saves re-embed the entry.

use super::print_json;
use crate::services::Services;
use clap::{Args, Subcommand};
use shelf_core::{config::AppConfig, AppError, AppResult};
use shelf_retrieval::{EntryUpdate, ReadingStatus, Shelf, ShelfEntry, SqliteStore, UserId};
use std::sync::Arc;

/// Shelf management for one user
#[derive(Args, Debug)]
pub struct ShelfCommand {
    /// User who owns the shelf
    #[arg(short, long, global = true, env = "SHELF_USER", default_value = "1")]
    pub user: UserId,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub action: ShelfAction,
}

#[derive(Subcommand, Debug)]
pub enum ShelfAction {
    /// Put a catalog book on the shelf
    Add {
        /// Catalog book id
        book_id: i64,

        /// Reading status (want_to_read, reading, read)
        #[arg(short, long)]
        status: Option<ReadingStatus>,

        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: Option<u8>,

        /// Personal notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Change status, rating or notes of an entry
    Update {
        /// Shelf entry id
        entry_id: i64,

        /// Reading status (want_to_read, reading, read)
        #[arg(short, long)]
        status: Option<ReadingStatus>,

        /// Rating from 1 to 5
        #[arg(short, long, conflicts_with = "clear_rating")]
        rating: Option<u8>,

        /// Remove the rating
        #[arg(long)]
        clear_rating: bool,

        /// Personal notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Take an entry off the shelf
    Remove {
        /// Shelf entry id
        entry_id: i64,
    },

    /// List shelf entries, most recently updated first
    List {
        /// Only entries with this status
        #[arg(short, long)]
        status: Option<ReadingStatus>,
    },

    /// Show shelf totals and the average rating
    Stats,
}

impl ShelfCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing shelf command for user {}", self.user);
        tracing::debug!("Shelf command options: {:?}", self);

        // Reads never re-embed, so they skip model client setup
        let shelf = match self.action {
            ShelfAction::List { .. } | ShelfAction::Stats => {
                Shelf::new(Arc::new(SqliteStore::open(&config.database_path())?))
            }
            _ => Services::open(config)?.shelf(),
        };

        match &self.action {
            ShelfAction::Add {
                book_id,
                status,
                rating,
                notes,
            } => {
                let entry = shelf
                    .add_to_shelf(self.user, *book_id, *status, *rating, notes.clone())
                    .await?;
                self.print_entry("Added", &entry)
            }

            ShelfAction::Update {
                entry_id,
                status,
                rating,
                clear_rating,
                notes,
            } => {
                let update = EntryUpdate {
                    status: *status,
                    rating: if *clear_rating {
                        Some(None)
                    } else {
                        rating.map(Some)
                    },
                    notes: notes.clone(),
                };
                if update.status.is_none() && update.rating.is_none() && update.notes.is_none() {
                    return Err(AppError::Other(
                        "Nothing to update: pass --status, --rating, --clear-rating or --notes"
                            .to_string(),
                    ));
                }

                let entry = shelf.update_entry(self.user, *entry_id, update).await?;
                self.print_entry("Updated", &entry)
            }

            ShelfAction::Remove { entry_id } => {
                shelf.remove_entry(self.user, *entry_id).await?;
                if self.json {
                    print_json(&serde_json::json!({ "removed": entry_id }))
                } else {
                    println!("Removed shelf entry {}", entry_id);
                    Ok(())
                }
            }

            ShelfAction::List { status } => self.list(&shelf, *status),
            ShelfAction::Stats => self.stats(&shelf),
        }
    }

    fn stats(&self, shelf: &Shelf) -> AppResult<()> {
        let stats = shelf.stats(self.user)?;

        if self.json {
            return print_json(&stats);
        }

        println!("Books on shelf: {}", stats.total_books);
        println!("Books read:     {}", stats.books_read);
        match stats.average_rating {
            Some(average) => println!("Average rating: {:.1}/5", average),
            None => println!("Average rating: -"),
        }
        Ok(())
    }

    fn list(&self, shelf: &Shelf, status: Option<ReadingStatus>) -> AppResult<()> {
        let entries = shelf.list(self.user, status)?;

        if self.json {
            return print_json(&entries);
        }

        if entries.is_empty() {
            println!("No shelf entries for user {}.", self.user);
        }
        for entry in &entries {
            println!("{:>4}  {}", entry.user_book.id, format_entry(entry));
        }
        Ok(())
    }

    fn print_entry(&self, action: &str, entry: &ShelfEntry) -> AppResult<()> {
        if self.json {
            return print_json(entry);
        }

        println!(
            "{} shelf entry {}: {}",
            action,
            entry.user_book.id,
            format_entry(entry)
        );
        Ok(())
    }
}

fn format_entry(entry: &ShelfEntry) -> String {
    let user_book = &entry.user_book;
    let mut line = format!(
        "{} by {} - {}",
        entry.book.title,
        entry.book.author,
        user_book.status.label()
    );
    if let Some(rating) = user_book.rating {
        line.push_str(&format!(", {}/5", rating));
    }
    line.push_str(&format!(" (updated {})", user_book.updated_at.format("%Y-%m-%d")));
    line
}
