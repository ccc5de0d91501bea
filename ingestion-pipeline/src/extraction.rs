//! §4.7 steps 1-2: resolve a source path's media type by extension and pull
//! its raw, per-page text.

use std::path::Path;

use common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    PlainText,
    Markdown,
    Pdf,
}

pub fn resolve_media_type(source_path: &str) -> Result<MediaType, AppError> {
    let extension = Path::new(source_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => Ok(MediaType::PlainText),
        "md" => Ok(MediaType::Markdown),
        "pdf" => Ok(MediaType::Pdf),
        other => Err(AppError::UnsupportedFormat(other.to_string())),
    }
}

/// One page of raw text; `page` is `None` for media with no native page
/// concept (plain text, Markdown).
pub async fn extract_pages(source_path: &str, media_type: MediaType) -> Result<Vec<(Option<i64>, String)>, AppError> {
    match media_type {
        MediaType::PlainText => {
            let content = tokio::fs::read_to_string(source_path).await?;
            Ok(vec![(None, content)])
        }
        MediaType::Markdown => {
            let content = tokio::fs::read_to_string(source_path).await?;
            Ok(vec![(None, strip_front_matter(&content).to_string())])
        }
        MediaType::Pdf => {
            let path = source_path.to_string();
            let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&path)).await??;
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(index, text)| (Some(index as i64 + 1), text))
                .collect())
        }
    }
}

/// Strips a leading `---`-delimited YAML front-matter block, if present, and
/// returns the body that follows (§4.7 step 2).
fn strip_front_matter(content: &str) -> &str {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---\n").or_else(|| trimmed.strip_prefix("---\r\n")) else {
        return content;
    };
    let Some(close) = after_open.find("\n---") else {
        return content;
    };
    let after_close = &after_open[close + "\n---".len()..];
    after_close.trim_start_matches(['\r', '\n'])
}

impl From<pdf_extract::OutputError> for AppError {
    fn from(err: pdf_extract::OutputError) -> Self {
        AppError::Processing(format!("pdf extraction failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_media_type_matches_supported_extensions() {
        assert_eq!(resolve_media_type("/a/b.txt").unwrap(), MediaType::PlainText);
        assert_eq!(resolve_media_type("/a/b.md").unwrap(), MediaType::Markdown);
        assert_eq!(resolve_media_type("/a/b.pdf").unwrap(), MediaType::Pdf);
        assert!(resolve_media_type("/a/b.docx").is_err());
    }

    #[test]
    fn strip_front_matter_removes_leading_yaml_block() {
        let content = "---\ntitle: Hello\ntags: [a, b]\n---\n\n# Body\ntext here";
        assert_eq!(strip_front_matter(content), "# Body\ntext here");
    }

    #[test]
    fn strip_front_matter_leaves_content_without_block_untouched() {
        let content = "# Body\nno front matter here";
        assert_eq!(strip_front_matter(content), content);
    }
}
