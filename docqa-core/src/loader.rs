//! Document loaders: PDF files and web pages.
//!
//! Both loaders produce [`Document`] values ready for chunking.
//! - [`PdfLoader`]: extract text from a PDF on the local filesystem.
//! - [`UrlLoader`]: fetch a URL and extract readable text, stripped of HTML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// A loaded document: a source identifier plus its full extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Where the text came from: a file name or a URL.
    pub source: String,
    /// The extracted text.
    pub text: String,
}

// ---------------------------------------------------------------------------
// PdfLoader
// ---------------------------------------------------------------------------

/// Extracts text from PDF files via the `pdf-extract` crate.
#[derive(Default)]
pub struct PdfLoader;

impl PdfLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a PDF from disk and extract its text.
    ///
    /// The document source is the file name component of `path`. A PDF with
    /// no extractable text (scanned images, empty pages) is rejected with
    /// [`LoadError::EmptyDocument`] rather than silently indexing nothing.
    pub fn load(&self, path: &Path) -> Result<Vec<Document>, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let text =
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| LoadError::PdfParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        let text = text.trim();
        if text.is_empty() {
            return Err(LoadError::EmptyDocument { origin: source });
        }

        Ok(vec![Document {
            source,
            text: text.to_string(),
        }])
    }
}

// ---------------------------------------------------------------------------
// UrlLoader
// ---------------------------------------------------------------------------

/// Fetches a URL and extracts its readable text content.
///
/// HTML responses are reduced to plain text; `text/*` responses are taken
/// as-is. Anything else (images, binaries) is rejected rather than indexed
/// as garbage.
#[derive(Default)]
pub struct UrlLoader;

impl UrlLoader {
    pub fn new() -> Self {
        Self
    }

    /// Fetch `url` and turn the response into a document.
    pub async fn load(&self, url: &str) -> Result<Vec<Document>, LoadError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(LoadError::Fetch {
                url: url.to_string(),
                message: "URL must start with http:// or https://".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("docqa/0.1")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| LoadError::Fetch {
                url: url.to_string(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await.map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        document_from_response(url, &content_type, body)
    }
}

/// Turn a fetched response into a document, dispatching on content type.
///
/// A missing content-type header is treated as HTML, the common case for
/// servers that omit it.
fn document_from_response(
    url: &str,
    content_type: &str,
    body: String,
) -> Result<Vec<Document>, LoadError> {
    let text = if content_type.is_empty()
        || content_type.contains("text/html")
        || content_type.contains("application/xhtml")
    {
        extract_text_from_html(&body)
    } else if content_type.starts_with("text/") {
        body
    } else {
        return Err(LoadError::UnsupportedContent {
            url: url.to_string(),
            content_type: content_type.to_string(),
        });
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(LoadError::EmptyDocument {
            origin: url.to_string(),
        });
    }

    Ok(vec![Document {
        source: url.to_string(),
        text: text.to_string(),
    }])
}

/// Block-level elements that should break text onto a new line.
fn is_block_tag(tag: &str) -> bool {
    const BLOCK_PREFIXES: &[&str] = &[
        "p", "/p", "br", "div", "/div", "h1", "h2", "h3", "h4", "h5", "h6", "/h", "li", "tr",
        "table", "section", "/section", "article", "/article",
    ];
    BLOCK_PREFIXES.iter().any(|prefix| tag.starts_with(prefix))
}

/// Simple HTML-to-text extraction.
///
/// Strips tags, drops `<script>` and `<style>` contents, inserts newlines at
/// block elements, and decodes the common entities. Not a full HTML parser,
/// but enough to make typical article pages indexable.
fn extract_text_from_html(html: &str) -> String {
    let mut text = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();
    let mut building_tag = false;

    for ch in html.chars() {
        if ch == '<' {
            in_tag = true;
            building_tag = true;
            tag_name.clear();
            continue;
        }
        if ch == '>' {
            in_tag = false;
            building_tag = false;

            let tag_lower = tag_name.to_lowercase();
            match tag_lower.as_str() {
                "script" => in_script = true,
                "/script" => in_script = false,
                "style" => in_style = true,
                "/style" => in_style = false,
                _ => {}
            }
            if is_block_tag(&tag_lower) {
                text.push('\n');
            }
            continue;
        }
        if in_tag {
            if building_tag && (ch.is_alphanumeric() || ch == '/') {
                tag_name.push(ch);
            } else {
                building_tag = false;
            }
            continue;
        }
        if in_script || in_style {
            continue;
        }
        text.push(ch);
    }

    let text = decode_entities(&text);

    // Collapse runs of blank lines and trim each line.
    let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.dedup_by(|a, b| a.is_empty() && b.is_empty());
    lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
