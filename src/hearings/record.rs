use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::extract::witness_list;

/// `video_link` value meaning "the page has a stream variable but no direct link".
pub const PLACEHOLDER_VIDEO_LINK: &str = "url";

/// One hearing as stored in the JSON file. Seed records usually carry only
/// `title` and `url`; unknown keys are kept as they are. Known keys holding the
/// wrong JSON type are coerced so one odd record cannot fail the whole file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HearingRecord {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub video_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub subcommittee: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub subcommittee_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_witnesses", skip_serializing_if = "Option::is_none")]
    pub witnesses: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub committee: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub committee_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub thomas_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub scraped: bool,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Strings as they are, numbers and booleans in their JSON spelling, anything else absent.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    })
}

fn lenient_witnesses<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(witness_list(&other)),
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

/// A fully defaulted extraction result for one hearing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedHearing {
    pub title: String,
    pub video_link: String,
    pub subcommittee: String,
    pub subcommittee_id: String,
    pub location: String,
    pub witnesses: Vec<String>,
    pub date_time: String,
    pub committee: String,
    pub committee_id: String,
    pub url: String,
    pub thomas_id: String,
}

/// Done means scraped and holding a real video link; placeholder links are retried.
pub fn is_already_scraped(record: &HearingRecord) -> bool {
    record.scraped && record.video_link.as_deref().unwrap_or("") != PLACEHOLDER_VIDEO_LINK
}

/// Overwrite every field with the new extraction except `title` and `url`,
/// which keep their stored values when present.
pub fn merge_hearing(existing: &HearingRecord, new: ExtractedHearing) -> HearingRecord {
    HearingRecord {
        title: existing.title.clone().or(Some(new.title)),
        url: existing.url.clone().or(Some(new.url)),
        video_link: Some(new.video_link),
        subcommittee: Some(new.subcommittee),
        subcommittee_id: Some(new.subcommittee_id),
        location: Some(new.location),
        witnesses: Some(new.witnesses),
        date_time: Some(new.date_time),
        committee: Some(new.committee),
        committee_id: Some(new.committee_id),
        thomas_id: Some(new.thomas_id),
        scraped: true,
        error: None,
        extra: existing.extra.clone(),
    }
}

pub fn load_records(path: &Path) -> Result<Vec<HearingRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of hearings", path.display()))
}

/// Rewrite the whole collection through a sibling temp file so a crash mid-write
/// leaves the previous version intact.
pub fn save_records(path: &Path, records: &[HearingRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
