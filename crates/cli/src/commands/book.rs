//! Book command handler.
//!
//! Manages the shared book catalog.

use super::print_json;
use clap::{Args, Subcommand};
use shelf_core::{config::AppConfig, AppResult};
use shelf_retrieval::{Book, NewBook, Shelf, SqliteStore};
use std::sync::Arc;

/// Book catalog management
#[derive(Args, Debug)]
pub struct BookCommand {
    #[command(subcommand)]
    pub action: BookAction,
}

#[derive(Subcommand, Debug)]
pub enum BookAction {
    /// Add a book to the catalog
    Add(BookAddCommand),
    /// List catalog books
    List(BookListCommand),
}

impl BookCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        // The catalog needs no model clients
        let store = SqliteStore::open(&config.database_path())?;
        let shelf = Shelf::new(Arc::new(store));

        match &self.action {
            BookAction::Add(cmd) => cmd.execute(&shelf),
            BookAction::List(cmd) => cmd.execute(&shelf),
        }
    }
}

/// Add a book
#[derive(Args, Debug)]
pub struct BookAddCommand {
    /// Book title
    pub title: String,

    /// Book author
    pub author: String,

    /// Genre (e.g. Fantasy, Science Fiction)
    #[arg(short, long, default_value = "")]
    pub genre: String,

    /// Publication year
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Short description
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl BookAddCommand {
    fn execute(&self, shelf: &Shelf) -> AppResult<()> {
        tracing::info!("Executing book add command");

        let book = shelf.add_book(NewBook {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genre: self.genre.trim().to_string(),
            publication_year: self.year,
            description: self.description.trim().to_string(),
        })?;

        if self.json {
            print_json(&book)
        } else {
            println!("Added book {}: {}", book.id, format_book(&book));
            Ok(())
        }
    }
}

/// List books
#[derive(Args, Debug)]
pub struct BookListCommand {
    /// Only books whose title or author contains this text
    #[arg(short, long)]
    pub query: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl BookListCommand {
    fn execute(&self, shelf: &Shelf) -> AppResult<()> {
        let books = match self.query {
            Some(ref query) => shelf.search_books(query)?,
            None => shelf.list_books()?,
        };

        if self.json {
            return print_json(&books);
        }

        if books.is_empty() {
            match self.query {
                Some(ref query) => println!("No books match '{}'.", query),
                None => println!("The catalog is empty. Add one with 'shelf book add'."),
            }
        }
        for book in &books {
            println!("{:>4}  {}", book.id, format_book(book));
        }
        Ok(())
    }
}

fn format_book(book: &Book) -> String {
    let mut line = format!("{} by {}", book.title, book.author);
    if !book.genre.is_empty() {
        line.push_str(&format!(" [{}]", book.genre));
    }
    if let Some(year) = book.publication_year {
        line.push_str(&format!(" ({})", year));
    }
    line
}
