//! Masking for meeting identifiers before they reach a log line.

use std::fmt;

use url::Url;

use crate::meetings::Meeting;

/// Keeps the last four characters: `abc-defg-hij` -> `****-hij`.
pub fn mask_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len <= 4 {
        return "****".to_string();
    }
    format!("****{}", tail_chars(trimmed, 4))
}

/// Length plus the last six characters, enough to tell titles apart.
pub fn redact_title(raw: &str) -> String {
    format!("[redacted:{}…{}]", raw.chars().count(), tail_chars(raw, 6))
}

/// Scheme and host survive; the path collapses to a tail of its last segment.
pub fn mask_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return "[redacted]".to_string();
    };
    let origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));

    match url.path_segments().and_then(|segments| segments.filter(|s| !s.is_empty()).last()) {
        Some(last) => format!("{origin}/…{}", tail_chars(last, 6)),
        None => origin,
    }
}

fn tail_chars(raw: &str, count: usize) -> String {
    let len = raw.chars().count();
    raw.chars().skip(len.saturating_sub(count)).collect()
}

/// Log-safe rendering of a meeting: masked call id and redacted title.
pub struct MeetingLabel<'a>(pub &'a Meeting);

impl fmt::Display for MeetingLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", mask_id(&self.0.call_id), redact_title(&self.0.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meetings::meeting::fixtures::{base_time, meeting_at};

    #[test]
    fn ids_keep_only_a_short_tail() {
        assert_eq!(mask_id("abc-defg-hij"), "****-hij");
        assert_eq!(mask_id(" abcd "), "****");
        assert_eq!(mask_id(""), "****");
    }

    #[test]
    fn titles_keep_length_and_tail() {
        assert_eq!(redact_title("Weekly planning"), "[redacted:15…anning]");
        assert_eq!(redact_title("1:1"), "[redacted:3…1:1]");
    }

    #[test]
    fn urls_keep_origin_only() {
        assert_eq!(
            mask_url("https://meet.google.com/abc-defg-hij?authuser=1"),
            "https://meet.google.com/…fg-hij"
        );
        assert_eq!(mask_url("https://meet.google.com/"), "https://meet.google.com");
        assert_eq!(mask_url("not a url"), "[redacted]");
    }

    #[test]
    fn meeting_label_hides_raw_fields() {
        let meeting = meeting_at("abc-defg-hij", "Board review", base_time(), 5);
        let label = MeetingLabel(&meeting).to_string();
        assert_eq!(label, "****-hij [redacted:12…review]");
        assert!(!label.contains("Board"));
    }
}
