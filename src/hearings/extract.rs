use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::US::Eastern;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use tracing::error;
use url::Url;

use super::committee::{CommitteeInfo, FULL_COMMITTEE};
use super::record::{ExtractedHearing, PLACEHOLDER_VIDEO_LINK};

static DECORATIVE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("polygon, path").unwrap());
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const PAGE_DATE_FORMAT: &str = "%m/%d/%y %I:%M%p";
const UTC_FORMAT: &str = "%Y-%m-%d %H:%M:%S+00:00";

/// Drop SVG `<polygon>` and `<path>` elements, which carry nothing but coordinates.
pub fn strip_decorative_markup(html: &str) -> String {
    let mut document = Html::parse_document(html);
    let ids: Vec<_> = document.select(&DECORATIVE_SELECTOR).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
    document.html()
}

pub fn consolidated_prompt(html: &str, info: &CommitteeInfo) -> String {
    let names = info
        .subcommittees
        .keys()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ");
    let mapping = serde_json::to_string(&info.subcommittees).unwrap_or_default();

    format!(
        r#"Extract the following information from the HTML of a congressional hearing page. Return a single JSON object with these keys:

1. title: the hearing title as a string.
2. video_link: the main hearing video link as a string. It is often the src of an iframe (for example https://www.senate.gov/isvp/?type=arch&comm=commerce&filename=commerce071223) or an embedded YouTube link. If there are several, take the first. If the page is from hsgac.senate.gov or indian.senate.gov and only has an 'archive_stream' variable, output "url". For the Committee on House Administration, output the HREF link.
3. subcommittee: exactly one of [{names}], spelled exactly as listed. Use "Full Committee" for full committee meetings, executive sessions, or when no subcommittee is explicitly named. Do not infer a subcommittee from the title or topic of the hearing.
4. subcommittee_id: the id of that subcommittee according to {mapping}, or an empty string for the full committee.
5. location: where the hearing takes place, or an empty string.
6. witnesses: a list of strings, each with the witness's name, title and organization when available.
7. date_time: the date and time of the hearing formatted as MM/DD/YY HH:MMAM, for example "07/31/24 10:00AM".

Example output:
{{
    "title": "Long-Term Economic Benefits and Impacts from Federal Infrastructure and Public Transportation Investment",
    "video_link": "https://www.senate.gov/isvp/?comm=banking&type=live&filename=banking073124",
    "subcommittee": "Economic Policy",
    "subcommittee_id": "12",
    "location": "Dirksen Senate Office Building 538",
    "witnesses": [
        "The Honorable Christopher Coes, Acting Under Secretary of Transportation for Policy, United States Department of Transportation"
    ],
    "date_time": "07/31/24 10:00AM"
}}

A wrongly named subcommittee is worse than answering "Full Committee".

HTML Content:
{html}"#
    )
}

pub fn witness_prompt(html: &str) -> String {
    format!(
        r#"Extract the witnesses from this congressional hearing HTML as a JSON list of strings, each with the witness's name, title and organization when available.

Example output:
["The Honorable Christopher Coes, Acting Under Secretary of Transportation for Policy, United States Department of Transportation", "Mr. Michael Knisley, Executive Secretary-Treasurer, Ohio State Building and Construction Trades Council"]

HTML Content:
{html}"#
    )
}

/// Eastern wall-clock time as printed on hearing pages, converted to UTC.
/// Fall-back ambiguities resolve to standard time.
pub fn eastern_to_utc(date_time: &str) -> Result<String> {
    let naive = NaiveDateTime::parse_from_str(date_time.trim(), PAGE_DATE_FORMAT)?;
    let local = Eastern
        .from_local_datetime(&naive)
        .latest()
        .ok_or_else(|| anyhow!("{} does not exist in US/Eastern", naive))?;
    Ok(local.with_timezone(&Utc).format(UTC_FORMAT).to_string())
}

/// Fill every field from the model's object, apply committee context and
/// normalise subcommittee and date. `video_link` is only tidied here; resolving
/// redirects needs the network.
pub fn build_hearing(data: &Map<String, Value>, info: &CommitteeInfo, url: &str) -> ExtractedHearing {
    let mut hearing = ExtractedHearing {
        title: string_field(data, "title"),
        video_link: string_field(data, "video_link"),
        subcommittee: string_field(data, "subcommittee"),
        subcommittee_id: string_field(data, "subcommittee_id"),
        location: string_field(data, "location"),
        witnesses: data.get("witnesses").map(witness_list).unwrap_or_default(),
        date_time: string_field(data, "date_time"),
        committee: data
            .get("committee")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| info.committee.clone())
            .unwrap_or_default(),
        committee_id: data
            .get("committee_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| info.committee_id.clone())
            .unwrap_or_default(),
        url: url.to_string(),
        thomas_id: String::new(),
    };

    if hearing.subcommittee == FULL_COMMITTEE {
        hearing.subcommittee.clear();
        hearing.subcommittee_id.clear();
    } else if !hearing.subcommittee.is_empty() {
        hearing.subcommittee_id = info.subcommittee_id(&hearing.subcommittee);
    }

    if !hearing.date_time.is_empty() {
        match eastern_to_utc(&hearing.date_time) {
            Ok(utc) => hearing.date_time = utc,
            Err(e) => error!("Error converting date {:?}: {}", hearing.date_time, e),
        }
    }

    hearing.thomas_id = format!("{}{}", hearing.committee_id, hearing.subcommittee_id);
    hearing.video_link = tidy_video_link(&hearing.video_link);
    hearing
}

/// Leading slashes trimmed and `https://` added when there is no scheme.
/// The placeholder and empty links pass through.
pub fn tidy_video_link(link: &str) -> String {
    let link = link.trim_start_matches('/');
    if link == PLACEHOLDER_VIDEO_LINK || link.is_empty() {
        return link.to_string();
    }
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{}", link)
    }
}

/// Non-string entries become empty strings; a non-list yields no witnesses.
pub fn witness_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|w| w.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Absolute target of the first link whose text is exactly "here".
pub fn find_here_link(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .find(|a| a.text().collect::<String>().trim() == "here")
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(|u| u.to_string())
}

fn string_field(data: &Map<String, Value>, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hearings::committee::lookup_committee;
    use crate::testing::{banking_committee, StubRegistry};
    use serde_json::json;

    fn banking_info() -> CommitteeInfo {
        let registry = StubRegistry::new(vec![banking_committee()]);
        lookup_committee(&registry, "https://www.banking.senate.gov/hearings/x").unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn eastern_summer_time_is_four_hours_behind() {
        assert_eq!(eastern_to_utc("07/31/24 10:00AM").unwrap(), "2024-07-31 14:00:00+00:00");
    }

    #[test]
    fn eastern_winter_time_is_five_hours_behind() {
        assert_eq!(eastern_to_utc("01/15/24 02:30PM").unwrap(), "2024-01-15 19:30:00+00:00");
    }

    #[test]
    fn ambiguous_fall_back_hour_is_standard_time() {
        assert_eq!(eastern_to_utc("11/03/24 01:30AM").unwrap(), "2024-11-03 06:30:00+00:00");
    }

    #[test]
    fn unparseable_date_is_kept() {
        let hearing = build_hearing(
            &object(json!({"date_time": "July 31st, morning"})),
            &CommitteeInfo::unresolved(),
            "https://x.gov/h",
        );
        assert_eq!(hearing.date_time, "July 31st, morning");
    }

    #[test]
    fn strips_svg_shapes_and_keeps_content() {
        let html = r#"<html><body><svg><path d="M0 0L10 10"/><polygon points="0,0 1,1"/></svg><h1>Hearing</h1></body></html>"#;
        let out = strip_decorative_markup(html);
        assert!(!out.contains("<path"));
        assert!(!out.contains("<polygon"));
        assert!(out.contains("<h1>Hearing</h1>"));
    }

    #[test]
    fn full_committee_clears_both_subcommittee_fields() {
        let hearing = build_hearing(
            &object(json!({"subcommittee": "Full Committee", "subcommittee_id": "99"})),
            &banking_info(),
            "https://www.banking.senate.gov/hearings/x",
        );
        assert_eq!(hearing.subcommittee, "");
        assert_eq!(hearing.subcommittee_id, "");
        assert_eq!(hearing.thomas_id, "SSBK");
    }

    #[test]
    fn subcommittee_name_is_remapped_to_registry_id() {
        let hearing = build_hearing(
            &object(json!({"subcommittee": "Economic Policy", "subcommittee_id": "made-up"})),
            &banking_info(),
            "https://www.banking.senate.gov/hearings/x",
        );
        assert_eq!(hearing.subcommittee_id, "12");
        assert_eq!(hearing.thomas_id, "SSBK12");
        assert_eq!(hearing.committee, "Committee on Banking, Housing, and Urban Affairs");

        let unknown = build_hearing(
            &object(json!({"subcommittee": "Invented"})),
            &banking_info(),
            "https://www.banking.senate.gov/hearings/x",
        );
        assert_eq!(unknown.subcommittee_id, "");
    }

    #[test]
    fn missing_fields_get_empty_defaults() {
        let hearing = build_hearing(&Map::new(), &CommitteeInfo::unresolved(), "https://x.gov/h");
        assert_eq!(
            hearing,
            ExtractedHearing {
                url: "https://x.gov/h".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn non_string_witnesses_become_empty() {
        assert_eq!(
            witness_list(&json!(["Ms. A", {"name": "B"}, null])),
            vec!["Ms. A".to_string(), String::new(), String::new()]
        );
        assert!(witness_list(&json!("Ms. A")).is_empty());
    }

    #[test]
    fn video_link_tidying() {
        assert_eq!(tidy_video_link("//www.youtube.com/embed/x"), "https://www.youtube.com/embed/x");
        assert_eq!(tidy_video_link("http://example.gov/v"), "http://example.gov/v");
        assert_eq!(tidy_video_link("url"), "url");
        assert_eq!(tidy_video_link("/url"), "url");
        assert_eq!(tidy_video_link(""), "");
    }

    #[test]
    fn prompt_lists_only_registry_subcommittees() {
        let prompt = consolidated_prompt("<p>x</p>", &banking_info());
        assert!(prompt.contains(r#""Economic Policy""#));
        assert!(prompt.contains(r#""Full Committee""#));
        assert!(prompt.ends_with("<p>x</p>"));
    }

    #[test]
    fn here_link_is_resolved_against_the_page() {
        let html = r#"<p>Witness list <a href="/calendar/witnesses?id=7">here</a>, or <a href="/other">there</a>.</p>"#;
        assert_eq!(
            find_here_link(html, "https://veterans.house.gov/calendar/eventsingle.aspx?EventID=7").as_deref(),
            Some("https://veterans.house.gov/calendar/witnesses?id=7")
        );
        assert_eq!(find_here_link("<a href='/x'>click</a>", "https://veterans.house.gov/"), None);
    }
}
