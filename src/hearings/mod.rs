//! Hearing records: fetch each page, extract structured fields with the model,
//! merge into the stored record and persist incrementally so reruns resume.

pub mod committee;
pub mod extract;
pub mod record;

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::fetch::Fetcher;
use crate::llm::response::{parse_list, parse_object};
use crate::llm::{LanguageModel, EXTRACTOR_PERSONA};
use committee::{CommitteeCache, CommitteeRegistry};
use extract::{build_hearing, consolidated_prompt, find_here_link, strip_decorative_markup, witness_list, witness_prompt};
use record::{
    is_already_scraped, load_records, merge_hearing, save_records, ExtractedHearing, HearingRecord,
    PLACEHOLDER_VIDEO_LINK,
};

pub const DEFAULT_RETRIES: usize = 3;
const SAVE_EVERY: usize = 5;
/// Witnesses on this site live on a page linked from the hearing page.
const VETERANS_HOST: &str = "veterans.house.gov";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HearingRunSummary {
    pub total: usize,
    pub skipped: usize,
    pub scraped: usize,
    pub failed: usize,
    pub errored: usize,
}

impl HearingRunSummary {
    pub fn print(&self) {
        println!(
            "{} hearings: {} scraped, {} already done, {} not fetched, {} errors.",
            self.total, self.scraped, self.skipped, self.failed, self.errored,
        );
    }
}

pub struct HearingScraper<'a> {
    fetcher: &'a dyn Fetcher,
    model: &'a dyn LanguageModel,
    registry: &'a dyn CommitteeRegistry,
    cache: CommitteeCache,
    retries: usize,
}

impl<'a> HearingScraper<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        model: &'a dyn LanguageModel,
        registry: &'a dyn CommitteeRegistry,
    ) -> Self {
        Self {
            fetcher,
            model,
            registry,
            cache: CommitteeCache::new(),
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Up to `retries` attempts, no backoff. Error statuses count as failures.
    pub async fn fetch_page_content(&self, url: &str) -> Option<String> {
        for _ in 0..self.retries {
            match self.fetcher.get(url).await {
                Ok(page) if page.is_success() => return Some(page.text()),
                Ok(page) => warn!("Error fetching page content: HTTP {} for {}. Retrying...", page.status, url),
                Err(e) => warn!("Error fetching page content: {:#}. Retrying...", e),
            }
        }
        error!("Failed to fetch page content for {} after {} attempts.", url, self.retries);
        None
    }

    /// `Ok(None)` when the page could not be fetched. Model call failures are errors.
    pub async fn scrape(&mut self, url: &str) -> Result<Option<ExtractedHearing>> {
        let Some(raw_html) = self.fetch_page_content(url).await else {
            return Ok(None);
        };
        let html = strip_decorative_markup(&raw_html);
        let info = self.cache.resolve(self.registry, url);

        let started = Instant::now();
        let reply = self
            .model
            .complete(EXTRACTOR_PERSONA, &consolidated_prompt(&html, &info))
            .await
            .context("Extraction call failed")?;
        info!("LLM response time: {:.2} seconds", started.elapsed().as_secs_f64());

        let data = parse_object(&reply).unwrap_or_default();
        let mut hearing = build_hearing(&data, &info, url);
        hearing.video_link = self.resolve_video_link(hearing.video_link).await;

        if url.contains(VETERANS_HOST) {
            if let Some(witnesses) = self.linked_witnesses(&raw_html, url).await? {
                hearing.witnesses = witnesses;
            }
        }
        Ok(Some(hearing))
    }

    async fn resolve_video_link(&self, link: String) -> String {
        if link.is_empty() || link == PLACEHOLDER_VIDEO_LINK {
            return link;
        }
        match self.fetcher.get(&link).await {
            Ok(page) => page.final_url,
            Err(e) => {
                warn!("Could not resolve video link {}: {:#}", link, e);
                link
            }
        }
    }

    /// Witnesses from the page behind the hearing's "here" link. `None` keeps
    /// whatever the primary extraction found.
    async fn linked_witnesses(&self, html: &str, url: &str) -> Result<Option<Vec<String>>> {
        let Some(link) = find_here_link(html, url) else {
            warn!("No witness link on {}", url);
            return Ok(None);
        };
        let page = match self.fetcher.get(&link).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Could not fetch witness page {}: {:#}", link, e);
                return Ok(None);
            }
        };
        let reply = self
            .model
            .complete(EXTRACTOR_PERSONA, &witness_prompt(&page.text()))
            .await
            .context("Witness extraction call failed")?;
        let items = parse_list(&reply).unwrap_or_default();
        Ok(Some(witness_list(&serde_json::Value::Array(items))))
    }

    async fn process_one(&mut self, hearing: &HearingRecord, index: usize, total: usize) -> Result<HearingRecord> {
        let Some(url) = hearing.url.clone().filter(|u| !u.trim().is_empty()) else {
            warn!("Skipping hearing {}/{} without URL: {:?}", index + 1, total, hearing.title);
            return Ok(HearingRecord {
                scraped: false,
                ..hearing.clone()
            });
        };

        info!("Processing hearing {}/{}: {}", index + 1, total, url);
        match self.scrape(&url).await? {
            Some(new) => Ok(merge_hearing(hearing, new)),
            None => {
                warn!("Failed to scrape data for {}", url);
                Ok(HearingRecord {
                    scraped: false,
                    ..hearing.clone()
                })
            }
        }
    }

    /// Process every record of `input` in order, writing the whole collection to
    /// `output` every few records, after any record that errors, and at the end.
    pub async fn process_hearings(&mut self, input: &Path, output: &Path) -> Result<HearingRunSummary> {
        let mut hearings = load_records(input)?;
        let total = hearings.len();
        let mut summary = HearingRunSummary {
            total,
            ..Default::default()
        };

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        for index in 0..total {
            if is_already_scraped(&hearings[index]) {
                info!(
                    "Skipping already scraped hearing {}/{}: {}",
                    index + 1,
                    total,
                    hearings[index].url.as_deref().unwrap_or("No URL")
                );
                summary.skipped += 1;
                pb.inc(1);
                continue;
            }

            match self.process_one(&hearings[index], index, total).await {
                Ok(updated) => {
                    if updated.scraped {
                        summary.scraped += 1;
                    } else {
                        summary.failed += 1;
                    }
                    hearings[index] = updated;
                    if (index + 1) % SAVE_EVERY == 0 || index + 1 == total {
                        save_records(output, &hearings)?;
                        info!("Progress saved: {}/{} hearings processed", index + 1, total);
                    }
                }
                Err(e) => {
                    error!("Error processing hearing {}/{}: {:?}", index + 1, total, e);
                    let hearing = &mut hearings[index];
                    hearing.scraped = false;
                    hearing.error = Some(format!("{:#}", e));
                    summary.errored += 1;
                    save_records(output, &hearings)?;
                    info!("Progress saved after error: {}/{} hearings processed", index + 1, total);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        save_records(output, &hearings)?;
        info!("All hearings processed. Results saved to {}", output.display());
        Ok(summary)
    }
}
