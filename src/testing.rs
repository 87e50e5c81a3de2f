//! Deterministic stand-ins for the network, the model and the committee registry.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::fetch::{FetchedPage, Fetcher};
use crate::hearings::committee::{Committee, CommitteeRegistry, Subcommittee};
use crate::llm::LanguageModel;

/// Serves canned bodies by URL and records every request in order.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, (u16, Vec<u8>)>,
    redirects: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), (200, body.as_bytes().to_vec()));
        self
    }

    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.pages.insert(url.to_string(), (200, body));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), (status, Vec::new()));
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage> {
        self.requests.lock().unwrap().push(url.to_string());
        let final_url = self
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        match self.pages.get(&final_url) {
            Some((status, body)) => Ok(FetchedPage {
                final_url,
                status: *status,
                body: body.clone(),
            }),
            None => Err(anyhow!("connection refused: {}", url)),
        }
    }
}

/// Replies from a queue; fails once the queue is exhausted so tests notice extra calls.
#[derive(Default)]
pub struct StubModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("model called more often than scripted"))
    }
}

pub struct StubRegistry {
    pub committees: Vec<Committee>,
    pub snapshot: Mutex<String>,
    pub lookups: Mutex<usize>,
}

impl StubRegistry {
    pub fn new(committees: Vec<Committee>) -> Self {
        Self {
            committees,
            snapshot: Mutex::new("v1".to_string()),
            lookups: Mutex::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

impl CommitteeRegistry for StubRegistry {
    fn snapshot(&self) -> Result<String> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    fn committees(&self, thomas_id: Option<&str>) -> Result<Vec<Committee>> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self
            .committees
            .iter()
            .filter(|c| thomas_id.map_or(true, |id| c.thomas_id == id))
            .cloned()
            .collect())
    }
}

pub fn banking_committee() -> Committee {
    Committee {
        thomas_id: "SSBK".into(),
        name: "Committee on Banking, Housing, and Urban Affairs".into(),
        url: Some("https://www.banking.senate.gov/".into()),
        minority_url: None,
        subcommittees: vec![
            Subcommittee {
                name: "Economic Policy".into(),
                thomas_id: "12".into(),
            },
            Subcommittee {
                name: "Housing, Transportation, and Community Development".into(),
                thomas_id: "09".into(),
            },
        ],
    }
}
