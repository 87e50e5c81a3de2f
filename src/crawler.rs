use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{error, info, warn};
use url::Url;

use crate::fetch::Fetcher;
use crate::store::ContentStore;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

pub struct CrawlConfig {
    pub max_depth: usize,
    pub delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 0,
            delay: Duration::from_secs(1),
        }
    }
}

/// Frontier entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: String,
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub pdf_links: HashSet<String>,
    pub visited: HashSet<String>,
    pub stored: usize,
}

pub struct Crawler<'a> {
    fetcher: &'a dyn Fetcher,
    store: &'a ContentStore,
    config: CrawlConfig,
}

impl<'a> Crawler<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, store: &'a ContentStore, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
        }
    }

    /// Breadth-first crawl from `seeds`. Pages deeper than `max_depth` are never
    /// fetched; PDFs linked from a fetched page are always captured.
    pub async fn crawl(&self, seeds: &[String]) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();
        let mut frontier: VecDeque<CrawlTask> = seeds
            .iter()
            .filter_map(|seed| match normalize_url(seed) {
                Some(url) => Some(CrawlTask { url, depth: 0 }),
                None => {
                    warn!("Skipping invalid seed URL: {}", seed);
                    None
                }
            })
            .collect();

        while let Some(task) = frontier.pop_front() {
            if outcome.visited.contains(&task.url) || task.depth > self.config.max_depth {
                continue;
            }
            outcome.visited.insert(task.url.clone());

            if !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }

            let page = match self.fetcher.get(&task.url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Error crawling {}: {:#}", task.url, e);
                    continue;
                }
            };

            if is_pdf(&task.url) {
                self.save_pdf(&task.url, &page.body, &mut outcome);
                continue;
            }

            let html = page.text();
            match self.store.store_html(&task.url, &html) {
                Ok(_) => outcome.stored += 1,
                Err(e) => error!("Failed to store {}: {:#}", task.url, e),
            }

            let Ok(base) = Url::parse(&task.url) else {
                continue;
            };
            for link in extract_links(&html, &base) {
                if is_pdf(&link) {
                    if outcome.visited.contains(&link) || outcome.pdf_links.contains(&link) {
                        continue;
                    }
                    outcome.visited.insert(link.clone());
                    match self.fetcher.get(&link).await {
                        Ok(pdf) => {
                            self.save_pdf(&link, &pdf.body, &mut outcome);
                            info!("Downloaded and saved PDF: {}", link);
                        }
                        Err(e) => warn!("Error downloading PDF {}: {:#}", link, e),
                    }
                } else if task.depth < self.config.max_depth {
                    frontier.push_back(CrawlTask {
                        url: link,
                        depth: task.depth + 1,
                    });
                }
            }
        }

        outcome
    }

    fn save_pdf(&self, url: &str, bytes: &[u8], outcome: &mut CrawlOutcome) {
        match self.store.store_pdf(url, bytes) {
            Ok(Some(_)) => outcome.stored += 1,
            Ok(None) => {}
            Err(e) => error!("Failed to store {}: {:#}", url, e),
        }
        outcome.pdf_links.insert(url.to_string());
    }
}

pub fn is_pdf(url: &str) -> bool {
    url.to_lowercase().ends_with(".pdf")
}

/// Parse and drop the fragment so `page#a` and `page#b` are one URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Absolute http(s) targets of every anchor, in document order.
pub fn extract_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubFetcher;
    use tempfile::TempDir;

    fn config(max_depth: usize) -> CrawlConfig {
        CrawlConfig {
            max_depth,
            delay: Duration::ZERO,
        }
    }

    fn site() -> StubFetcher {
        StubFetcher::new()
            .with_page(
                "https://city.gov/",
                r#"<a href="/rentals">Rentals</a>
                   <a href="docs/ordinance.pdf">Ordinance</a>
                   <a href="mailto:clerk@city.gov">Clerk</a>
                   <a href="/rentals#fees">Fees</a>"#,
            )
            .with_page(
                "https://city.gov/rentals",
                r#"<a href="/">Home</a>
                   <a href="/rentals/permits">Permits</a>
                   <a href="https://city.gov/docs/ordinance.pdf">Again</a>
                   <a href="/docs/fees.PDF">Fees</a>"#,
            )
            .with_page(
                "https://city.gov/rentals/permits",
                r#"<a href="/rentals/permits/apply">Apply</a>"#,
            )
            .with_page("https://city.gov/rentals/permits/apply", "<p>apply</p>")
            .with_bytes("https://city.gov/docs/ordinance.pdf", b"%PDF-garbage".to_vec())
            .with_bytes("https://city.gov/docs/fees.PDF", b"%PDF-garbage".to_vec())
    }

    #[test]
    fn links_are_resolved_against_the_page() {
        let base = Url::parse("https://city.gov/a/b").unwrap();
        let links = extract_links(
            r#"<a href="c">c</a><a href="/d#x">d</a><a href="javascript:void(0)">js</a><a>none</a>"#,
            &base,
        );
        assert_eq!(links, vec!["https://city.gov/a/c", "https://city.gov/d"]);
    }

    #[test]
    fn pdf_detection_is_case_insensitive() {
        assert!(is_pdf("https://x.gov/a.PDF"));
        assert!(!is_pdf("https://x.gov/a.pdf?download=1"));
    }

    #[tokio::test]
    async fn depth_zero_fetches_seed_and_its_pdfs_only() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let fetcher = site();
        let crawler = Crawler::new(&fetcher, &store, config(0));

        let outcome = crawler.crawl(&["https://city.gov/".to_string()]).await;

        assert_eq!(
            fetcher.requests(),
            vec!["https://city.gov/", "https://city.gov/docs/ordinance.pdf"]
        );
        assert!(outcome.pdf_links.contains("https://city.gov/docs/ordinance.pdf"));
        assert!(dir.path().join("city.gov").join("index.html").exists());
        assert!(!dir.path().join("city.gov").join("rentals.html").exists());
    }

    #[tokio::test]
    async fn depth_bound_and_dedup() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let fetcher = site();
        let crawler = Crawler::new(&fetcher, &store, config(1));

        let outcome = crawler.crawl(&["https://city.gov/".to_string()]).await;

        for url in fetcher.requests() {
            assert_eq!(fetcher.request_count(&url), 1, "{} fetched twice", url);
        }
        // depth 2 page is discovered but never fetched
        assert_eq!(fetcher.request_count("https://city.gov/rentals/permits"), 0);
        // PDFs linked from a depth-1 page are still captured
        assert!(outcome.pdf_links.contains("https://city.gov/docs/fees.PDF"));
        assert_eq!(outcome.pdf_links.len(), 2);
        assert!(outcome.visited.contains("https://city.gov/rentals"));
        assert!(dir.path().join("city.gov").join("rentals.html").exists());
    }

    #[tokio::test]
    async fn failed_pages_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let fetcher = StubFetcher::new()
            .with_page("https://a.gov/", r#"<a href="/missing">x</a><a href="/gone.pdf">p</a><a href="/ok">ok</a>"#)
            .with_page("https://a.gov/ok", "fine");
        let crawler = Crawler::new(&fetcher, &store, config(1));

        let outcome = crawler
            .crawl(&["https://a.gov/".to_string(), "not a url".to_string()])
            .await;

        assert!(outcome.visited.contains("https://a.gov/missing"));
        assert!(!outcome.pdf_links.contains("https://a.gov/gone.pdf"));
        assert!(dir.path().join("a.gov").join("ok.html").exists());
        assert!(!dir.path().join("a.gov").join("missing.html").exists());
    }

    #[tokio::test]
    async fn recrawl_writes_the_same_paths() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let seeds = vec!["https://city.gov/".to_string()];

        let first = site();
        Crawler::new(&first, &store, config(1)).crawl(&seeds).await;
        let before = list_files(dir.path());

        let second = site();
        Crawler::new(&second, &store, config(1)).crawl(&seeds).await;
        assert_eq!(list_files(dir.path()), before);
    }

    fn list_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        out.sort();
        out
    }
}
