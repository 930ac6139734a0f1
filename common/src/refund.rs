//! Refund requests and their rejections travel as tagged lines appended to a
//! transaction's `notes`:
//!
//! ```text
//! REFUND_REQUEST|bank_name=BCA;account_number=123;account_holder=Budi;reason=...;requested_by=7;requested_at=2025-01-01T10:00:00
//! REFUND_REJECTED|reason=...;rejected_by=1;rejected_at=2025-01-02T08:00:00
//! ```

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const REQUEST_TAG: &str = "REFUND_REQUEST|";
pub const REJECTED_TAG: &str = "REFUND_REJECTED|";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub reason: String,
    pub requested_by: Option<i64>,
    pub requested_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRejection {
    pub reason: String,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefundEntry {
    Request(RefundRequest),
    Rejected(RefundRejection),
}

/// Separators inside a value would corrupt the tag.
fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            ';' | '=' | '|' => ',',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

fn encode_pairs(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, sanitize(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn decode_pairs(payload: &str) -> HashMap<String, String> {
    payload
        .split(';')
        .filter_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let key = it.next()?.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), it.next().unwrap_or("").to_string()))
        })
        .collect()
}

fn format_ts(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_ts(value: Option<&String>) -> Option<NaiveDateTime> {
    value.and_then(|v| NaiveDateTime::parse_from_str(v, TIMESTAMP_FORMAT).ok())
}

impl RefundRequest {
    pub fn to_tag(&self) -> String {
        let pairs = [
            ("bank_name", self.bank_name.clone()),
            ("account_number", self.account_number.clone()),
            ("account_holder", self.account_holder.clone()),
            ("reason", self.reason.clone()),
            (
                "requested_by",
                self.requested_by.map(|id| id.to_string()).unwrap_or_default(),
            ),
            ("requested_at", format_ts(self.requested_at)),
        ];
        format!("{}{}", REQUEST_TAG, encode_pairs(&pairs))
    }

    fn from_payload(payload: &str) -> Self {
        let map = decode_pairs(payload);
        let get = |k: &str| map.get(k).cloned().unwrap_or_default();
        RefundRequest {
            bank_name: get("bank_name"),
            account_number: get("account_number"),
            account_holder: get("account_holder"),
            reason: get("reason"),
            requested_by: map.get("requested_by").and_then(|v| v.parse().ok()),
            requested_at: parse_ts(map.get("requested_at")),
        }
    }
}

impl RefundRejection {
    pub fn to_tag(&self) -> String {
        let pairs = [
            ("reason", self.reason.clone()),
            (
                "rejected_by",
                self.rejected_by.map(|id| id.to_string()).unwrap_or_default(),
            ),
            ("rejected_at", format_ts(self.rejected_at)),
        ];
        format!("{}{}", REJECTED_TAG, encode_pairs(&pairs))
    }

    fn from_payload(payload: &str) -> Self {
        let map = decode_pairs(payload);
        RefundRejection {
            reason: map.get("reason").cloned().unwrap_or_default(),
            rejected_by: map.get("rejected_by").and_then(|v| v.parse().ok()),
            rejected_at: parse_ts(map.get("rejected_at")),
        }
    }
}

/// All refund entries in the order they were appended.
pub fn entries(notes: Option<&str>) -> Vec<RefundEntry> {
    let Some(notes) = notes else {
        return Vec::new();
    };
    notes
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(payload) = line.strip_prefix(REQUEST_TAG) {
                Some(RefundEntry::Request(RefundRequest::from_payload(payload)))
            } else {
                line.strip_prefix(REJECTED_TAG)
                    .map(|payload| RefundEntry::Rejected(RefundRejection::from_payload(payload)))
            }
        })
        .collect()
}

/// The latest request, unless a rejection came after it.
pub fn open_request(notes: Option<&str>) -> Option<RefundRequest> {
    match entries(notes).pop() {
        Some(RefundEntry::Request(req)) => Some(req),
        _ => None,
    }
}

pub fn has_request(notes: Option<&str>) -> bool {
    entries(notes)
        .iter()
        .any(|e| matches!(e, RefundEntry::Request(_)))
}

/// Free text kept in the same field as the tags. A line that would read back
/// as a tag loses its separator.
pub fn plain_text(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with(REQUEST_TAG) || trimmed.starts_with(REJECTED_TAG) {
                line.replacen('|', ":", 1)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Appends `tag` as a new line.
pub fn append_tag(notes: Option<&str>, tag: &str) -> String {
    match notes {
        Some(existing) if !existing.trim().is_empty() => format!("{}\n{}", existing, tag),
        _ => tag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 14)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    fn request() -> RefundRequest {
        RefundRequest {
            bank_name: "BCA".into(),
            account_number: "1234567890".into(),
            account_holder: "Budi Santoso".into(),
            reason: "Batal beli".into(),
            requested_by: Some(7),
            requested_at: Some(ts()),
        }
    }

    #[test]
    fn request_tag_parses_back() {
        let notes = append_tag(Some("Customer asked for morning pickup"), &request().to_tag());
        assert_eq!(open_request(Some(&notes)), Some(request()));
        assert!(has_request(Some(&notes)));
    }

    #[test]
    fn separators_in_values_are_neutralised() {
        let mut req = request();
        req.reason = "a=b; c|d\nnext".into();
        let tag = req.to_tag();
        assert_eq!(tag.lines().count(), 1);
        let parsed = open_request(Some(&tag)).unwrap();
        assert_eq!(parsed.reason, "a,b, c,d next");
        assert_eq!(parsed.account_holder, "Budi Santoso");
    }

    #[test]
    fn rejection_closes_request() {
        let rejection = RefundRejection {
            reason: "Outside policy".into(),
            rejected_by: Some(1),
            rejected_at: Some(ts()),
        };
        let notes = append_tag(Some(&request().to_tag()), &rejection.to_tag());
        assert_eq!(open_request(Some(&notes)), None);
        assert!(has_request(Some(&notes)));
        assert_eq!(
            entries(Some(&notes)),
            vec![RefundEntry::Request(request()), RefundEntry::Rejected(rejection)]
        );
    }

    #[test]
    fn a_new_request_reopens() {
        let rejection = RefundRejection::default().to_tag();
        let notes = append_tag(Some(&request().to_tag()), &rejection);
        let notes = append_tag(Some(&notes), &request().to_tag());
        assert!(open_request(Some(&notes)).is_some());
    }

    #[test]
    fn free_text_never_reads_as_a_tag() {
        let text = format!("jemput pagi\n  {}\n{}", request().to_tag(), RefundRejection::default().to_tag());
        let cleaned = plain_text(&text);
        assert!(entries(Some(&cleaned)).is_empty());
        assert!(cleaned.starts_with("jemput pagi\n  REFUND_REQUEST:bank_name=BCA"));
        assert_eq!(plain_text("biasa saja"), "biasa saja");
    }

    #[test]
    fn plain_notes_have_no_entries() {
        assert!(entries(Some("just a note\nanother")).is_empty());
        assert!(entries(None).is_empty());
        assert_eq!(append_tag(None, "X"), "X");
        assert_eq!(append_tag(Some("  "), "X"), "X");
    }
}
