//! LLM provider implementations.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use futures::{Stream, StreamExt};
use shelf_core::{AppError, AppResult};

/// Re-frame a byte stream into complete text lines.
///
/// Network chunks do not respect line boundaries, so partial lines are
/// buffered until their newline arrives. A trailing line without a newline
/// is flushed when the stream ends.
pub(crate) fn line_stream<S, B, E>(bytes: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    bytes
        .map(Some)
        .chain(futures::stream::once(async { None }))
        .scan(Vec::<u8>::new(), |buffer, item| {
            let lines: Vec<AppResult<String>> = match item {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(chunk.as_ref());
                    let mut lines = Vec::new();
                    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        let text = String::from_utf8_lossy(&line).trim().to_string();
                        if !text.is_empty() {
                            lines.push(Ok(text));
                        }
                    }
                    lines
                }
                Some(Err(e)) => vec![Err(AppError::Llm(format!("Stream error: {}", e)))],
                None => {
                    let rest = std::mem::take(buffer);
                    let text = String::from_utf8_lossy(&rest).trim().to_string();
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        vec![Ok(text)]
                    }
                }
            };
            futures::future::ready(Some(futures::stream::iter(lines)))
        })
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_stream_joins_split_lines() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"a\":".to_vec()),
            Ok(b"1}\n{\"b\"".to_vec()),
            Ok(b":2}\n\n{\"c\":3}".to_vec()),
        ];

        let lines: Vec<String> = line_stream(futures::stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"]);
    }

    #[tokio::test]
    async fn test_line_stream_surfaces_errors() {
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(b"ok\n".to_vec()), Err("connection reset".to_string())];

        let items: Vec<AppResult<String>> = line_stream(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(AppError::Llm(_))));
    }
}
