//! Shared fixtures for the unit tests of this crate.

use crate::config::FormEntryConfig;
use crate::context::{FormEntryContext, Mode};
use crate::memory::InMemoryRecordStore;
use crate::record::Encounter;
use crate::sample_form::sample_entities;
use crate::services::{FixedClock, FormServices, StaticPreferences};
use crate::submission::Submission;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use vpr_types::PatientId;

pub(crate) const PATIENT: PatientId = PatientId(7);

/// 2024-03-01 10:00:00 UTC.
pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

pub(crate) fn services(now: DateTime<Utc>) -> FormServices {
    services_with_timezone(now, None)
}

pub(crate) fn services_with_timezone(
    now: DateTime<Utc>,
    timezone: Option<FixedOffset>,
) -> FormServices {
    services_with_store(now, timezone, Arc::new(InMemoryRecordStore::new()))
}

pub(crate) fn services_with_store(
    now: DateTime<Utc>,
    timezone: Option<FixedOffset>,
    store: Arc<InMemoryRecordStore>,
) -> FormServices {
    FormServices::new(
        store,
        Arc::new(sample_entities()),
        Arc::new(StaticPreferences::new(timezone)),
        Arc::new(FixedClock(now)),
    )
}

pub(crate) fn context(mode: Mode, existing: Option<Encounter>) -> FormEntryContext {
    FormEntryContext::new(
        mode,
        Arc::new(FormEntryConfig::default()),
        &services(fixed_now()),
        PATIENT,
        existing,
    )
    .expect("valid context")
}

pub(crate) fn enter_context() -> FormEntryContext {
    context(Mode::Enter, None)
}

pub(crate) fn view_context() -> FormEntryContext {
    context(Mode::View, Some(Encounter::new(PATIENT, "Vitals")))
}

pub(crate) fn context_with_timezone(timezone: Option<FixedOffset>) -> FormEntryContext {
    FormEntryContext::new(
        Mode::Enter,
        Arc::new(FormEntryConfig::default()),
        &services_with_timezone(fixed_now(), timezone),
        PATIENT,
        None,
    )
    .expect("valid context")
}

/// The submission a browser would post for `html` without user interaction.
///
/// Text and hidden inputs send their value, radios and checkboxes only when checked, selects
/// their selected option (or the first one), textareas their content. Buttons send nothing.
pub(crate) fn submitted_from_html(html: &str) -> Submission {
    let mut submission = Submission::new();
    let mut select: Option<(String, bool)> = None;
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let (name, attrs) = parse_tag(&after[..end]);
        rest = &after[end + 1..];

        match name.as_str() {
            "input" => {
                let Some(field) = attrs.get("name") else {
                    continue;
                };
                let kind = attrs.get("type").map(String::as_str).unwrap_or("text");
                if kind == "button" {
                    continue;
                }
                if matches!(kind, "radio" | "checkbox") && !attrs.contains_key("checked") {
                    continue;
                }
                let default = if kind == "checkbox" { "on" } else { "" };
                let value = attrs.get("value").cloned().unwrap_or_else(|| default.to_owned());
                submission.add(field.clone(), value);
            }
            "select" => select = attrs.get("name").map(|field| (field.clone(), false)),
            "option" => {
                if let Some((field, chosen)) = select.as_mut() {
                    if attrs.contains_key("selected") && !*chosen {
                        submission.add(field.clone(), attrs.get("value").cloned().unwrap_or_default());
                        *chosen = true;
                    }
                }
            }
            "/select" => {
                if let Some((field, false)) = select.take() {
                    submission.add(field, "");
                }
            }
            "textarea" => {
                if let Some(field) = attrs.get("name") {
                    let close = rest.find("</textarea>").unwrap_or(rest.len());
                    submission.add(
                        field.clone(),
                        html_escape::decode_html_entities(&rest[..close]).into_owned(),
                    );
                    rest = &rest[close..];
                }
            }
            _ => {}
        }
    }
    submission
}

fn parse_tag(tag: &str) -> (String, HashMap<String, String>) {
    let tag = tag.trim_end_matches('/');
    let name_end = tag.find(char::is_whitespace).unwrap_or(tag.len());
    let name = tag[..name_end].to_ascii_lowercase();

    let mut attrs = HashMap::new();
    let mut rest = &tag[name_end..];
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_owned();
        let Some(quoted) = rest[eq + 1..].strip_prefix('"') else {
            break;
        };
        let Some(close) = quoted.find('"') else {
            break;
        };
        attrs.insert(
            key,
            html_escape::decode_html_entities(&quoted[..close]).into_owned(),
        );
        rest = &quoted[close + 1..];
    }
    (name, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_what_a_browser_would_post() {
        let html = "<input type=\"text\" name=\"w1\" value=\"a &amp; b\"/>\
            <input type=\"radio\" name=\"w2\" value=\"x\"/><input type=\"radio\" name=\"w2\" value=\"y\" checked=\"true\"/>\
            <input type=\"checkbox\" name=\"w3\" value=\"true\"/>\
            <select name=\"w4\"><option value=\"\"></option><option value=\"5\" selected=\"true\">Five</option></select>\
            <select name=\"w5\"><option value=\"\"></option><option value=\"6\">Six</option></select>\
            <textarea name=\"w6\" rows=\"2\" cols=\"20\">note</textarea>\
            <button type=\"button\" onclick=\"submitHtmlForm()\">Save</button>";
        let submission = submitted_from_html(html);

        assert_eq!(submission.get("w1"), Some("a & b"));
        assert_eq!(submission.get("w2"), Some("y"));
        assert!(!submission.contains("w3"));
        assert_eq!(submission.get("w4"), Some("5"));
        assert_eq!(submission.get("w5"), Some(""));
        assert_eq!(submission.get("w6"), Some("note"));
        assert_eq!(submission.len(), 5);
    }
}
