//! Tests for retrieval routing, search, reranking and embedding upsert.

use super::support::{day, FailingEmbedder, Library, RefusingEmbedder, ScriptedLlm, Stage};
use crate::embeddings::EmbeddingProvider;
use crate::indexer::IndexOutcome;
use crate::rag::{BookAssistant, ContextRetriever, RetrievalPlan, Reranker};
use crate::rules::QueryRules;
use crate::store::{CatalogStore, EmbeddingStore};
use crate::types::{Candidate, EmbeddingRecord, ReadingStatus};
use shelf_core::config::{AnswerSettings, RetrievalSettings};
use shelf_core::AppError;
use shelf_prompt::PromptSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn retriever_with(
        library: &Library,
        llm: Arc<ScriptedLlm>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: RetrievalSettings,
    ) -> ContextRetriever {
        ContextRetriever::new(
            llm,
            "test-model",
            embedder,
            library.store.clone(),
            &PromptSet::builtin().unwrap(),
            QueryRules::default(),
            &settings,
        )
    }

    fn retriever(library: &Library, llm: Arc<ScriptedLlm>) -> ContextRetriever {
        retriever_with(
            library,
            llm,
            library.embedder.clone(),
            RetrievalSettings::default(),
        )
    }

    /// Three fantasy books and one science fiction book for user 1, one
    /// fantasy book for user 2.
    async fn fantasy_library() -> Library {
        let library = Library::new();
        library
            .shelve(1, "The Hobbit", "Fantasy", ReadingStatus::Read, "Dragons and a long walk", day(1, 5))
            .await;
        library
            .shelve(1, "A Wizard of Earthsea", "Fantasy", ReadingStatus::Read, "Quiet magic school", day(1, 6))
            .await;
        library
            .shelve(1, "Mistborn", "Fantasy", ReadingStatus::Reading, "Heist with metal magic", day(1, 7))
            .await;
        library
            .shelve(1, "Dune", "Science Fiction", ReadingStatus::Read, "Desert politics", day(1, 8))
            .await;
        library
            .shelve(2, "The Wizard's Tower", "Fantasy", ReadingStatus::Read, "Dragons everywhere", day(1, 9))
            .await;
        library
    }

    fn fantasy_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .with_rewrite("fantasy dragons adventure\nfantasy magic rated\nepic fantasy favourites")
            .with_score("The Hobbit", "9")
            .with_score("A Wizard of Earthsea", "3")
            .with_score("Mistborn", "Score: 7")
    }

    #[tokio::test]
    async fn test_recency_question_skips_vector_search() {
        let library = Library::new();
        library
            .shelve(1, "Dune", "Science Fiction", ReadingStatus::Read, "", day(1, 1))
            .await;
        library
            .shelve(1, "Neuromancer", "Science Fiction", ReadingStatus::Read, "", day(3, 1))
            .await;
        library
            .shelve(1, "Hyperion", "Science Fiction", ReadingStatus::Read, "", day(2, 1))
            .await;
        library
            .shelve(1, "Circe", "Fantasy", ReadingStatus::Reading, "", day(4, 1))
            .await;
        library
            .shelve(2, "Emma", "Classics", ReadingStatus::Read, "", day(5, 1))
            .await;

        let llm = Arc::new(ScriptedLlm::new());
        let context = retriever(&library, llm.clone())
            .retrieve(1, "what did I last finish reading?")
            .await
            .unwrap();

        assert_eq!(
            context.plan,
            RetrievalPlan::Recency {
                status: ReadingStatus::Read
            }
        );
        let titles: Vec<&str> = context
            .entries
            .iter()
            .map(|e| {
                ["Neuromancer", "Hyperion", "Dune", "Circe", "Emma"]
                    .into_iter()
                    .find(|t| e.content.contains(t))
                    .unwrap()
            })
            .collect();
        assert_eq!(titles, vec!["Neuromancer", "Hyperion", "Dune"]);

        assert_eq!(library.store.nearest_calls(), 0);
        assert_eq!(library.store.recent_calls(), 1);
        assert_eq!(llm.total_calls(), 0);
        assert!(context.entries.iter().all(|e| e.distance.is_none()));
    }

    #[tokio::test]
    async fn test_recency_question_with_named_status() {
        let library = fantasy_library().await;
        let llm = Arc::new(ScriptedLlm::new());

        let context = retriever(&library, llm.clone())
            .retrieve(1, "What am I currently reading most recently?")
            .await
            .unwrap();

        assert_eq!(
            context.plan,
            RetrievalPlan::Recency {
                status: ReadingStatus::Reading
            }
        );
        assert_eq!(context.entries.len(), 1);
        assert!(context.entries[0].content.contains("Mistborn"));
        assert_eq!(library.store.nearest_calls(), 0);
    }

    #[tokio::test]
    async fn test_semantic_search_filters_dedupes_and_reranks() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());

        let context = retriever(&library, llm.clone())
            .retrieve(1, "Which fantasy books did I love?")
            .await
            .unwrap();

        match &context.plan {
            RetrievalPlan::Semantic { filters } => {
                assert_eq!(filters.genre.as_deref(), Some("Fantasy"));
                assert_eq!(filters.status, None);
            }
            other => panic!("expected semantic plan, got {:?}", other),
        }

        // One search per variant, and each record scored once after merging.
        assert_eq!(llm.calls(Stage::Rewrite), 1);
        assert_eq!(library.store.nearest_calls(), 3);
        assert_eq!(llm.calls(Stage::Rerank), 3);

        let scores: Vec<Option<u8>> = context.entries.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![Some(9), Some(7), Some(3)]);
        assert!(context.entries[0].content.contains("The Hobbit"));
        assert!(context.entries[1].content.contains("Mistborn"));
        assert!(context.entries[2].content.contains("A Wizard of Earthsea"));
    }

    #[tokio::test]
    async fn test_search_never_crosses_users() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let retriever = retriever(&library, llm.clone());

        let semantic = retriever.retrieve(1, "books with dragons").await.unwrap();
        assert!(!semantic.is_empty());
        assert!(semantic
            .entries
            .iter()
            .all(|e| !e.content.contains("The Wizard's Tower")));

        let recency = retriever.retrieve(1, "what did I finish recently").await.unwrap();
        assert!(recency
            .entries
            .iter()
            .all(|e| !e.content.contains("The Wizard's Tower")));

        let other = retriever.retrieve(2, "books with dragons").await.unwrap();
        assert_eq!(other.entries.len(), 1);
        assert!(other.entries[0].content.contains("The Wizard's Tower"));
    }

    #[tokio::test]
    async fn test_filter_without_records_returns_empty_context() {
        let library = Library::new();
        library
            .shelve(1, "The Hobbit", "Fantasy", ReadingStatus::Read, "", day(1, 5))
            .await;
        let llm = Arc::new(fantasy_llm());

        let context = retriever(&library, llm.clone())
            .retrieve(1, "recommend a sci-fi book")
            .await
            .unwrap();

        assert!(context.is_empty());
        assert_eq!(context.text(), "");
        assert_eq!(llm.total_calls(), 0);
        assert_eq!(library.store.nearest_calls(), 0);
    }

    #[tokio::test]
    async fn test_genre_filter_matches_genre_aliases() {
        let library = Library::new();
        library
            .shelve(1, "Dune", "Sci-Fi", ReadingStatus::Read, "Desert politics", day(1, 5))
            .await;
        library
            .shelve(1, "Foundation", "Science Fiction & Fantasy", ReadingStatus::Read, "Empire falls", day(1, 6))
            .await;
        library
            .shelve(1, "Emma", "Romance", ReadingStatus::Read, "Matchmaking", day(1, 7))
            .await;
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_rewrite("science fiction classics
space opera")
                .with_score("Dune", "8")
                .with_score("Foundation", "6"),
        );

        let context = retriever(&library, llm.clone())
            .retrieve(1, "recommend a sci-fi book")
            .await
            .unwrap();

        assert_eq!(context.entries.len(), 2);
        assert!(context.entries[0].content.contains("Dune"));
        assert!(context.entries[1].content.contains("Foundation"));
        assert!(context.entries.iter().all(|e| !e.content.contains("Emma")));
        assert_eq!(library.store.nearest_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_variant_is_dropped_and_others_contribute() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let retriever = retriever_with(
            &library,
            llm.clone(),
            Arc::new(RefusingEmbedder::new("fantasy magic rated")),
            RetrievalSettings::default(),
        );

        let context = retriever
            .retrieve(1, "Which fantasy books did I love?")
            .await
            .unwrap();

        assert_eq!(llm.calls(Stage::Rewrite), 1);
        assert_eq!(library.store.nearest_calls(), 2);
        assert_eq!(llm.calls(Stage::Rerank), 3);
        let scores: Vec<Option<u8>> = context.entries.iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![Some(9), Some(7), Some(3)]);
    }

    #[tokio::test]
    async fn test_rewrite_failure_searches_original_question() {
        let library = fantasy_library().await;
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_failing_rewrite()
                .with_score("The Hobbit", "8"),
        );

        let context = retriever(&library, llm.clone())
            .retrieve(1, "books with dragons")
            .await
            .unwrap();

        assert_eq!(llm.calls(Stage::Rewrite), 1);
        assert_eq!(library.store.nearest_calls(), 1);
        assert!(!context.is_empty());
        assert!(context.entries[0].content.contains("The Hobbit"));
    }

    #[tokio::test]
    async fn test_all_variants_failing_is_unavailable() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let retriever = retriever_with(
            &library,
            llm.clone(),
            Arc::new(FailingEmbedder),
            RetrievalSettings::default(),
        );

        let result = retriever.retrieve(1, "books with dragons").await;
        assert!(matches!(result, Err(AppError::RetrievalUnavailable(_))));
        assert_eq!(llm.calls(Stage::Rerank), 0);
    }

    #[tokio::test]
    async fn test_empty_question_is_rejected() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());

        let result = retriever(&library, llm.clone()).retrieve(1, "   \n").await;
        assert!(matches!(result, Err(AppError::InvalidQuestion(_))));
        assert_eq!(llm.total_calls(), 0);
        assert_eq!(library.store.nearest_calls(), 0);
    }

    #[tokio::test]
    async fn test_deadline_bounds_retrieval() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm().with_rewrite_delay(Duration::from_millis(500)));
        let settings = RetrievalSettings {
            deadline_ms: 50,
            ..RetrievalSettings::default()
        };
        let retriever = retriever_with(&library, llm, library.embedder.clone(), settings);

        let result = retriever.retrieve(1, "books with dragons").await;
        assert!(matches!(result, Err(AppError::RetrievalUnavailable(_))));
    }

    #[tokio::test]
    async fn test_rerank_ceiling_falls_back_to_distance() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let settings = RetrievalSettings {
            rerank_ceiling: 2,
            ..RetrievalSettings::default()
        };
        let retriever = retriever_with(&library, llm.clone(), library.embedder.clone(), settings);

        let context = retriever
            .retrieve(1, "Which fantasy books did I love?")
            .await
            .unwrap();

        assert_eq!(llm.calls(Stage::Rerank), 0);
        assert_eq!(context.entries.len(), 3);
        assert!(context.entries.iter().all(|e| e.score.is_none()));

        let distances: Vec<f32> = context
            .entries
            .iter()
            .map(|e| e.distance.unwrap())
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_top_k_limits_context() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let settings = RetrievalSettings {
            top_k: 2,
            ..RetrievalSettings::default()
        };
        let retriever = retriever_with(&library, llm, library.embedder.clone(), settings);

        let context = retriever
            .retrieve(1, "Which fantasy books did I love?")
            .await
            .unwrap();
        assert_eq!(context.entries.len(), 2);
        assert_eq!(context.entries[0].score, Some(9));
    }

    #[tokio::test]
    async fn test_equal_scores_keep_incoming_order() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .with_score("Alpha", "5")
                .with_score("Bravo", "9")
                .with_score("Charlie", "5")
                .with_score("Delta", "nonsense"),
        );
        let reranker = Reranker::new(
            llm.clone(),
            "test-model",
            PromptSet::builtin().unwrap().rerank,
        );

        let candidates: Vec<Candidate> = ["Alpha", "Bravo", "Charlie", "Delta"]
            .iter()
            .enumerate()
            .map(|(i, name)| Candidate {
                record: EmbeddingRecord {
                    id: i as i64 + 1,
                    user_book_id: i as i64 + 1,
                    user_id: 1,
                    content: format!("Book: {} by Someone.", name),
                    content_hash: String::new(),
                    updated_at: day(1, 1),
                },
                distance: 0.1 * (i as f32 + 1.0),
            })
            .collect();

        let ranked = reranker.rerank("anything", candidates, 4).await;
        let ids: Vec<i64> = ranked.iter().map(|r| r.candidate.record.id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
        assert_eq!(ranked[3].score, Some(0));
        assert_eq!(llm.calls(Stage::Rerank), 4);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let library = Library::new();
        let entry = library
            .shelve(1, "Piranesi", "Fantasy", ReadingStatus::Read, "Halls and tides", day(6, 1))
            .await;
        assert_eq!(library.embedder.calls(), 1);

        let before = library.store.recent(1, ReadingStatus::Read, 10).unwrap();
        let outcome = library.indexer().upsert(&entry).await.unwrap();
        let after = library.store.recent(1, ReadingStatus::Read, 10).unwrap();

        assert_eq!(outcome, IndexOutcome::Unchanged);
        assert_eq!(library.embedder.calls(), 1);
        assert_eq!(library.store.count(Some(1)).unwrap(), 1);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_changed_entry() {
        let library = Library::new();
        let mut entry = library
            .shelve(1, "Piranesi", "Fantasy", ReadingStatus::Reading, "", day(6, 1))
            .await;

        entry.user_book.status = ReadingStatus::Read;
        entry.user_book.rating = Some(5);
        entry.user_book.updated_at = day(6, 20);
        library.store.inner.update_entry(&entry.user_book).unwrap();
        let outcome = library.indexer().upsert(&entry).await.unwrap();

        assert_eq!(outcome, IndexOutcome::Updated);
        assert_eq!(library.embedder.calls(), 2);
        assert_eq!(library.store.count(None).unwrap(), 1);

        let records = library.store.recent(1, ReadingStatus::Read, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].content.contains("Rating: 5/5"));
        assert!(records[0].content.contains("Last updated: 2024-06-20"));
    }

    #[tokio::test]
    async fn test_ask_without_context_says_so_in_prompt() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let assistant = BookAssistant::new(
            retriever(&library, llm.clone()),
            llm.clone(),
            "test-model",
            PromptSet::builtin().unwrap().answer,
            AnswerSettings::default(),
        );

        let answer = assistant
            .ask(1, "Any horror on my shelf?")
            .await
            .unwrap();

        assert!(answer.context.is_empty());
        assert_eq!(answer.answer, "You finished Dune most recently.");
        assert_eq!(llm.calls(Stage::Answer), 1);
        assert_eq!(llm.total_calls(), 1);
        assert!(llm
            .last_prompt()
            .unwrap()
            .contains("No shelf entries matched this question."));
    }

    #[tokio::test]
    async fn test_stream_ask_yields_answer_and_context() {
        let library = fantasy_library().await;
        let llm = Arc::new(fantasy_llm());
        let assistant = BookAssistant::new(
            retriever(&library, llm.clone()),
            llm.clone(),
            "test-model",
            PromptSet::builtin().unwrap().answer,
            AnswerSettings::default(),
        );

        let (context, mut stream) = assistant
            .stream_ask(1, "What did I read last?")
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.unwrap().content);
        }

        assert_eq!(text, "You finished Dune most recently.");
        assert!(context.entries[0].content.contains("Dune"));
        assert!(llm.last_prompt().unwrap().contains("Book: Dune"));
    }
}
