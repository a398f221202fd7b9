//! Text extraction from uploaded PDFs and profile web pages.

use std::sync::OnceLock;

use bytes::Bytes;
use reqwest::{Client, Response};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::errors::AppError;

/// Largest accepted PDF upload.
pub const MAX_PDF_BYTES: usize = 5 * 1024 * 1024;
/// Largest page body read when fetching a URL.
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first kilobyte.
const PDF_HEADER_SEARCH_BYTES: usize = 1024;

/// Elements whose content is never visible text.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "svg", "template", "head"];
/// Elements that end a line of text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "section", "article", "header",
    "footer", "ul", "ol", "table", "blockquote", "pre",
];

/// Checks an upload is a PDF: declared as `application/pdf` or named
/// `*.pdf`, within the size cap, and carrying a PDF header.
pub fn ensure_pdf(
    bytes: &[u8],
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<(), AppError> {
    if !declared_pdf(content_type, file_name) {
        return Err(AppError::Validation(
            "Only PDF files are supported".to_string(),
        ));
    }
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() > MAX_PDF_BYTES {
        return Err(AppError::Validation(format!(
            "PDF exceeds the {} MB limit",
            MAX_PDF_BYTES / (1024 * 1024)
        )));
    }
    let head = &bytes[..bytes.len().min(PDF_HEADER_SEARCH_BYTES)];
    if !head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        return Err(AppError::Validation(
            "The uploaded file is not a valid PDF".to_string(),
        ));
    }
    Ok(())
}

fn declared_pdf(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let by_type = content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"));
    let by_name = file_name.is_some_and(|name| name.to_ascii_lowercase().ends_with(".pdf"));
    by_type || by_name
}

/// Extracts text from PDF bytes on a blocking thread.
pub async fn pdf_text(bytes: Bytes) -> Result<String, AppError> {
    // pdf-extract panics on some malformed inputs; a panicked task is an unreadable PDF.
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| {
            warn!("PDF extraction task failed: {e}");
            AppError::UnprocessableEntity("Could not read text from the PDF".to_string())
        })?
        .map_err(|e| {
            debug!("PDF extraction failed: {e:?}");
            AppError::UnprocessableEntity("Could not read text from the PDF".to_string())
        })?;

    let text = collapse_whitespace(&text);
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "The PDF contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}

/// Parses a user-supplied profile URL. Only absolute http(s) URLs are accepted.
pub fn parse_source_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim())
        .map_err(|_| AppError::Validation("Please provide a valid URL".to_string()))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(AppError::Validation(
            "Only http and https URLs are supported".to_string(),
        )),
    }
}

/// Fetches `url` and returns its visible text.
pub async fn fetch_page_text(client: &Client, url: &Url) -> Result<String, AppError> {
    let response = client
        .get(url.as_str())
        .header("accept", "text/html,application/xhtml+xml,text/plain")
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch URL: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!(
            "Fetching the URL returned status {}",
            status.as_u16()
        )));
    }

    let body = read_capped(response, MAX_PAGE_BYTES).await?;

    let text = html_to_text(&String::from_utf8_lossy(&body));
    if text.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "No readable text found at that URL".to_string(),
        ));
    }
    Ok(text)
}

/// Reads at most `limit` bytes of the body; the rest is never downloaded.
async fn read_capped(mut response: Response, limit: usize) -> Result<Vec<u8>, AppError> {
    let declared = response.content_length().unwrap_or(0);
    let mut body = Vec::with_capacity((declared as usize).min(limit));

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to read page body: {e}")))?
    {
        let room = limit - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= limit {
            debug!(limit, declared, "Page body truncated");
            break;
        }
    }
    Ok(body)
}

fn body_selector() -> &'static Selector {
    static BODY: OnceLock<Selector> = OnceLock::new();
    BODY.get_or_init(|| Selector::parse("body").expect("static selector is valid"))
}

/// Reduces an HTML document to its visible text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(body_selector())
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    push_visible_text(root, &mut text);
    collapse_whitespace(&text)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let name = child.value().name();
        if HIDDEN_TAGS.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push('\n');
            continue;
        }

        let block = BLOCK_TAGS.contains(&name);
        if block {
            out.push('\n');
        }
        push_visible_text(child, out);
        if block {
            out.push('\n');
        }
    }
}

/// Collapses runs of whitespace within lines and drops blank lines.
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
