//! Keyword tables that drive the retrieval planner.
//!
//! Matching is case-insensitive and works on whole words: the question and
//! each phrase are split into word tokens and a phrase matches when its
//! tokens appear contiguously in the question. "read" therefore never
//! matches inside "reading" or "thread".

use crate::types::ReadingStatus;
use serde::{Deserialize, Serialize};
use shelf_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::path::Path;

const RECENCY_PHRASES: &[&str] = &[
    "last read",
    "last finish",
    "last finished",
    "most recent",
    "most recently",
    "just finished",
    "just read",
    "recently read",
    "recently finished",
    "latest book",
    "last book",
    "read last",
    "finished last",
    "lately",
    "recently",
];

const STATUS_KEYWORDS: &[(&str, ReadingStatus)] = &[
    ("finished", ReadingStatus::Read),
    ("finish", ReadingStatus::Read),
    ("have read", ReadingStatus::Read),
    ("already read", ReadingStatus::Read),
    ("i read", ReadingStatus::Read),
    ("completed", ReadingStatus::Read),
    ("done reading", ReadingStatus::Read),
    ("currently reading", ReadingStatus::Reading),
    ("am reading", ReadingStatus::Reading),
    ("i'm reading", ReadingStatus::Reading),
    ("reading now", ReadingStatus::Reading),
    ("in progress", ReadingStatus::Reading),
    ("want to read", ReadingStatus::WantToRead),
    ("want-to-read", ReadingStatus::WantToRead),
    ("to-read", ReadingStatus::WantToRead),
    ("to read list", ReadingStatus::WantToRead),
    ("wishlist", ReadingStatus::WantToRead),
    ("tbr", ReadingStatus::WantToRead),
];

const GENRE_KEYWORDS: &[(&str, &str)] = &[
    ("sci-fi", "Science Fiction"),
    ("scifi", "Science Fiction"),
    ("science fiction", "Science Fiction"),
    ("fantasy", "Fantasy"),
    ("mystery", "Mystery"),
    ("mysteries", "Mystery"),
    ("thriller", "Thriller"),
    ("thrillers", "Thriller"),
    ("romance", "Romance"),
    ("horror", "Horror"),
    ("biography", "Biography"),
    ("biographies", "Biography"),
    ("memoir", "Biography"),
    ("history", "History"),
    ("historical", "History"),
    ("non-fiction", "Non-Fiction"),
    ("nonfiction", "Non-Fiction"),
    ("poetry", "Poetry"),
    ("self-help", "Self-Help"),
    ("classic", "Classics"),
    ("classics", "Classics"),
    ("young adult", "Young Adult"),
    ("ya", "Young Adult"),
];

/// Phrase tables used to classify questions and extract filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRules {
    /// Recency phrases; `false` disables a phrase
    #[serde(default)]
    pub recency: BTreeMap<String, bool>,

    /// Status keywords
    #[serde(default)]
    pub status: BTreeMap<String, ReadingStatus>,

    /// Genre keywords mapped to the canonical genre name
    #[serde(default)]
    pub genre: BTreeMap<String, String>,
}

impl Default for QueryRules {
    fn default() -> Self {
        Self {
            recency: RECENCY_PHRASES
                .iter()
                .map(|p| (p.to_string(), true))
                .collect(),
            status: STATUS_KEYWORDS
                .iter()
                .map(|(k, s)| (k.to_string(), *s))
                .collect(),
            genre: GENRE_KEYWORDS
                .iter()
                .map(|(k, g)| (k.to_string(), g.to_string()))
                .collect(),
        }
    }
}

impl QueryRules {
    /// Load a rules file and merge it over the built-in tables.
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read rules file {:?}: {}", path, e))
        })?;

        let overrides: QueryRules = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse rules file {:?}: {}", path, e))
        })?;

        tracing::debug!(
            "Loaded query rules from {:?} ({} recency, {} status, {} genre entries)",
            path,
            overrides.recency.len(),
            overrides.status.len(),
            overrides.genre.len()
        );

        Ok(Self::default().merge(overrides))
    }

    /// Built-in tables, or merged with a rules file when one is given.
    pub fn load_or_default(path: Option<&Path>) -> AppResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Entries of `other` replace or extend entries of `self`.
    pub fn merge(mut self, other: QueryRules) -> Self {
        self.recency.extend(
            other
                .recency
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v)),
        );
        self.status.extend(
            other
                .status
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v)),
        );
        self.genre.extend(
            other
                .genre
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v)),
        );
        self
    }

    /// Whether the question asks about recent reading.
    pub fn is_recency(&self, question: &str) -> bool {
        let words = tokenize(question);
        self.recency
            .iter()
            .any(|(phrase, enabled)| *enabled && contains_phrase(&words, &tokenize(phrase)))
    }

    /// Status named by the question, longest matching keyword first.
    pub fn match_status(&self, question: &str) -> Option<ReadingStatus> {
        best_match(&tokenize(question), &self.status).copied()
    }

    /// Canonical genre named by the question, longest matching keyword first.
    pub fn match_genre(&self, question: &str) -> Option<String> {
        best_match(&tokenize(question), &self.genre).cloned()
    }

    /// Every keyword that maps to `genre`, in table order.
    pub fn genre_aliases(&self, genre: &str) -> Vec<String> {
        self.genre
            .iter()
            .filter(|(_, canonical)| canonical.eq_ignore_ascii_case(genre))
            .map(|(keyword, _)| keyword.clone())
            .collect()
    }
}

fn best_match<'a, V>(words: &[String], table: &'a BTreeMap<String, V>) -> Option<&'a V> {
    table
        .iter()
        .map(|(keyword, value)| (tokenize(keyword), value))
        .filter(|(tokens, _)| contains_phrase(words, tokens))
        .max_by_key(|(tokens, _)| (tokens.len(), tokens.iter().map(String::len).sum::<usize>()))
        .map(|(_, value)| value)
}

/// Lowercased word tokens. Hyphens and apostrophes inside a word are kept
/// so "sci-fi" and "i'm" stay single tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(['\u{2019}', '\u{2018}'], "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
        .map(|w| w.trim_matches(|c: char| c == '-' || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && words.windows(phrase.len()).any(|window| window == phrase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tokenize_keeps_inner_punctuation() {
        assert_eq!(
            tokenize("Recommend a Sci-Fi book, I'm bored!"),
            vec!["recommend", "a", "sci-fi", "book", "i'm", "bored"]
        );
        assert_eq!(tokenize("I\u{2019}m reading"), vec!["i'm", "reading"]);
    }

    #[test]
    fn test_recency_detection() {
        let rules = QueryRules::default();
        assert!(rules.is_recency("What did I last finish reading?"));
        assert!(rules.is_recency("Which book did I read most recently?"));
        assert!(rules.is_recency("what have I been reading LATELY"));
        assert!(!rules.is_recency("Recommend a sci-fi book"));
        assert!(!rules.is_recency("Who wrote the last of the mohicans?"));
    }

    #[test]
    fn test_status_matching_respects_word_boundaries() {
        let rules = QueryRules::default();
        assert_eq!(
            rules.match_status("what did I last finish reading?"),
            Some(ReadingStatus::Read)
        );
        assert_eq!(
            rules.match_status("What am I currently reading?"),
            Some(ReadingStatus::Reading)
        );
        assert_eq!(
            rules.match_status("anything on my want to read list?"),
            Some(ReadingStatus::WantToRead)
        );
        assert_eq!(rules.match_status("a thread about books"), None);
        assert_eq!(rules.match_status("books about reading"), None);
    }

    #[test]
    fn test_genre_matching() {
        let rules = QueryRules::default();
        assert_eq!(
            rules.match_genre("recommend a sci-fi book"),
            Some("Science Fiction".to_string())
        );
        assert_eq!(
            rules.match_genre("any good Science Fiction?"),
            Some("Science Fiction".to_string())
        );
        assert_eq!(rules.match_genre("a story about fantasyland"), None);
    }

    #[test]
    fn test_genre_aliases() {
        let rules = QueryRules::default();
        assert_eq!(
            rules.genre_aliases("Science Fiction"),
            vec!["sci-fi", "science fiction", "scifi"]
        );
        assert_eq!(rules.genre_aliases("Cozy Mystery"), Vec::<String>::new());
    }

    #[test]
    fn test_rules_file_merges_over_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rules.yaml");
        std::fs::write(
            &path,
            r#"
recency:
  lately: false
  "Freshest Pick": true
genre:
  cozy: Cozy Mystery
status:
  abandoned: want_to_read
"#,
        )
        .unwrap();

        let rules = QueryRules::load(&path).unwrap();
        assert!(!rules.is_recency("what have I read lately"));
        assert!(rules.is_recency("my freshest pick?"));
        assert!(rules.is_recency("what did I just read"));
        assert_eq!(rules.match_genre("a cozy one"), Some("Cozy Mystery".to_string()));
        assert_eq!(
            rules.match_status("books I abandoned"),
            Some(ReadingStatus::WantToRead)
        );
        assert_eq!(rules.match_genre("fantasy"), Some("Fantasy".to_string()));
    }

    #[test]
    fn test_missing_rules_file_is_config_error() {
        let result = QueryRules::load(Path::new("/nonexistent/rules.yaml"));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
