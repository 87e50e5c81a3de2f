use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use url::Url;

/// What a stored document was fetched as; decides the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Pdf,
}

impl DocumentKind {
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Html => "html",
            DocumentKind::Pdf => "md",
        }
    }
}

/// Writes fetched documents under `root/<domain>/<url-path-dir>/<basename>.<ext>`.
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pure function of the URL's network location and path; query and fragment are ignored.
    pub fn path_for(&self, url: &str, kind: DocumentKind) -> Result<PathBuf> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| anyhow!("URL has no host: {}", url))?;
        let domain = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let path = parsed.path().trim_matches('/');
        let path = if path.is_empty() { "index" } else { path };
        let (dir, base) = match path.rsplit_once('/') {
            Some((dir, base)) => (dir, base),
            None => ("", path),
        };

        let mut target = self.root.join(domain);
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            target.push(segment);
        }
        target.push(format!("{}.{}", base, kind.extension()));
        Ok(target)
    }

    pub fn store_html(&self, url: &str, html: &str) -> Result<PathBuf> {
        let path = self.path_for(url, DocumentKind::Html)?;
        write_file(&path, html)?;
        info!("Saved HTML: {}", path.display());
        Ok(path)
    }

    /// Converts the PDF to text page by page and stores it. A PDF that cannot be
    /// converted is logged and skipped; `None` is returned in that case.
    pub fn store_pdf(&self, url: &str, bytes: &[u8]) -> Result<Option<PathBuf>> {
        let path = self.path_for(url, DocumentKind::Pdf)?;
        let text = match pdf_to_text(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Error converting PDF to text for {}: {:#}", url, e);
                return Ok(None);
            }
        };
        write_file(&path, &text)?;
        info!("Saved text for PDF: {}", path.display());
        Ok(Some(path))
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Concatenate each page's extracted text in page order.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    let document = lopdf::Document::load_mem(bytes).context("Unreadable PDF")?;
    let mut text = String::new();
    for page_number in document.get_pages().keys() {
        let page_text = document
            .extract_text(&[*page_number])
            .with_context(|| format!("Failed to extract text from page {}", page_number))?;
        text.push_str(&page_text);
    }
    Ok(text)
}
