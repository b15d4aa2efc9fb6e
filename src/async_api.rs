//! File and stream helpers around [`Pipeline`].
//!
//! Reading is async; CPU-bound normalization runs on the blocking pool.

use crate::config::CleaningConfiguration;
use crate::error::{Error, Result};
use crate::model::RunOutcome;
use crate::normalize::{self, NormalizeOptions};
use crate::pipeline::Pipeline;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Decodes document bytes, replacing invalid UTF-8 and dropping a BOM.
pub fn decode(data: &[u8]) -> String {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!("Input is not valid UTF-8 at byte {}; replacing invalid sequences", e.valid_up_to());
            String::from_utf8_lossy(data).into_owned()
        }
    }
}

/// Reads a document as text.
pub async fn read_document(path: impl AsRef<Path>) -> Result<String> {
    let data = fs::read(path).await?;
    Ok(decode(&data))
}

/// Reads a document from an async reader.
pub async fn read_from<R: AsyncRead + Unpin>(mut reader: R) -> Result<String> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    Ok(decode(&data))
}

/// Cleans a file with the given pipeline.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> unocr::Result<()> {
/// use unocr::{CleaningConfiguration, Pipeline};
///
/// let pipeline = Pipeline::offline();
/// let outcome = unocr::async_api::clean_file(&pipeline, "book.md", &CleaningConfiguration::default()).await?;
/// if let Some(cleaned) = outcome.completed() {
///     tokio::fs::write("book.clean.md", cleaned.content).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub async fn clean_file(
    pipeline: &Pipeline,
    path: impl AsRef<Path>,
    config: &CleaningConfiguration,
) -> Result<RunOutcome> {
    let text = read_document(path).await?;
    pipeline.run(&text, config).await
}

/// Normalizes text on the blocking pool.
pub async fn normalize_text(text: String, options: NormalizeOptions) -> Result<String> {
    tokio::task::spawn_blocking(move || normalize::normalize(&text, &options))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Reads and normalizes a file.
pub async fn normalize_file(path: impl AsRef<Path>, options: &NormalizeOptions) -> Result<String> {
    let text = read_document(path).await?;
    normalize_text(text, options.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_bom_and_replaces_invalid() {
        assert_eq!(decode(b"\xEF\xBB\xBFhello"), "hello");
        assert_eq!(decode(b"ok \xFF"), "ok \u{FFFD}");
    }

    #[tokio::test]
    async fn test_read_from_reader() {
        let text = read_from(&b"line one\nline two"[..]).await.unwrap();
        assert_eq!(text, "line one\nline two");
    }

    #[tokio::test]
    async fn test_normalize_text_on_blocking_pool() {
        let out = normalize_text("ﬁne".to_string(), NormalizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "fine");
    }
}
