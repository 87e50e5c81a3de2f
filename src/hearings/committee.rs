use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

/// Subcommittee name the model uses for full-committee hearings.
pub const FULL_COMMITTEE: &str = "Full Committee";

/// Host whose hearings all belong to one committee regardless of URL matching.
const HOUSE_ADMINISTRATION_HOST: &str = "cha.house.gov";
const HOUSE_ADMINISTRATION_ID: &str = "HSHA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subcommittee {
    pub name: String,
    pub thomas_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Committee {
    pub thomas_id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub minority_url: Option<String>,
    #[serde(default)]
    pub subcommittees: Vec<Subcommittee>,
}

/// Read-only committee dataset.
pub trait CommitteeRegistry {
    /// Changes whenever the registry contents change.
    fn snapshot(&self) -> Result<String>;

    /// All committees, or only the one with `thomas_id`.
    fn committees(&self, thomas_id: Option<&str>) -> Result<Vec<Committee>>;
}

/// Committee context for one hearing page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitteeInfo {
    pub committee_id: Option<String>,
    pub committee: Option<String>,
    /// Name → id, always including `"Full Committee" → ""`.
    pub subcommittees: BTreeMap<String, String>,
}

impl CommitteeInfo {
    pub fn unresolved() -> Self {
        let mut subcommittees = BTreeMap::new();
        subcommittees.insert(FULL_COMMITTEE.to_string(), String::new());
        Self {
            committee_id: None,
            committee: None,
            subcommittees,
        }
    }

    fn from_committee(committee: &Committee) -> Self {
        let mut subcommittees: BTreeMap<String, String> = committee
            .subcommittees
            .iter()
            .map(|s| (s.name.clone(), s.thomas_id.clone()))
            .collect();
        subcommittees.insert(FULL_COMMITTEE.to_string(), String::new());
        Self {
            committee_id: Some(committee.thomas_id.clone()),
            committee: Some(committee.name.clone()),
            subcommittees,
        }
    }

    pub fn subcommittee_id(&self, name: &str) -> String {
        self.subcommittees.get(name).cloned().unwrap_or_default()
    }
}

/// Host with any leading `www.` removed; empty when the URL has no host.
pub fn normalize_host(url: &str) -> String {
    let host = Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Match the hearing URL's host against each committee's official or minority site.
pub fn lookup_committee(registry: &dyn CommitteeRegistry, hearing_url: &str) -> Result<CommitteeInfo> {
    let host = normalize_host(hearing_url);
    let filter = hearing_url
        .contains(HOUSE_ADMINISTRATION_HOST)
        .then_some(HOUSE_ADMINISTRATION_ID);

    let found = registry.committees(filter)?.into_iter().find(|committee| {
        [&committee.url, &committee.minority_url]
            .into_iter()
            .flatten()
            .any(|site| normalize_host(site) == host)
    });

    Ok(match found {
        Some(committee) => CommitteeInfo::from_committee(&committee),
        None => CommitteeInfo::unresolved(),
    })
}

/// Read-through cache of committee lookups keyed by host, dropped whenever
/// the registry snapshot changes.
#[derive(Default)]
pub struct CommitteeCache {
    snapshot: Option<String>,
    entries: HashMap<String, CommitteeInfo>,
}

impl CommitteeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry failures are logged and yield an unresolved context.
    pub fn resolve(&mut self, registry: &dyn CommitteeRegistry, hearing_url: &str) -> CommitteeInfo {
        match self.try_resolve(registry, hearing_url) {
            Ok(info) => info,
            Err(e) => {
                error!("Committee lookup failed for {}: {:#}", hearing_url, e);
                CommitteeInfo::unresolved()
            }
        }
    }

    fn try_resolve(&mut self, registry: &dyn CommitteeRegistry, hearing_url: &str) -> Result<CommitteeInfo> {
        let snapshot = registry.snapshot()?;
        if self.snapshot.as_deref() != Some(snapshot.as_str()) {
            self.entries.clear();
            self.snapshot = Some(snapshot);
        }

        let key = cache_key(hearing_url);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }

        let info = lookup_committee(registry, hearing_url)?;
        debug!("Resolved {} to {:?}", key, info.committee_id);
        self.entries.insert(key, info.clone());
        Ok(info)
    }
}

fn cache_key(hearing_url: &str) -> String {
    // cha.house.gov narrows the search, so it must not share an entry with its host alone
    let narrowed = hearing_url.contains(HOUSE_ADMINISTRATION_HOST);
    format!("{}|{}", normalize_host(hearing_url), narrowed)
}
