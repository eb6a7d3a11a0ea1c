//! Classifies Google Meet URLs so hosts can tell the meetings homepage (the
//! surface the watchdog guards) apart from an in-call page.

use url::Url;

pub const MEET_HOST: &str = "meet.google.com";
pub const MEET_HOME_URL: &str = "https://meet.google.com/";

/// `/abc-defg-hij` style meeting codes and `/lookup/...` redirects.
pub fn is_meeting_path(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with("/lookup/") {
        return true;
    }

    let code = trimmed.trim_start_matches('/');
    if code.len() != 12 {
        return false;
    }

    code.bytes().enumerate().all(|(idx, byte)| match idx {
        3 | 8 => byte == b'-',
        _ => byte.is_ascii_alphanumeric(),
    })
}

pub fn is_meet_url(url: &Url) -> bool {
    url.host_str() == Some(MEET_HOST)
}

pub fn is_meeting_url(url: &Url) -> bool {
    is_meet_url(url) && is_meeting_path(url.path())
}

/// The meetings list itself: the Meet host at its root path (query and
/// fragment ignored, e.g. `?authuser=1`).
pub fn is_homepage_url(url: &Url) -> bool {
    is_meet_url(url) && url.path().trim_end_matches('/').is_empty()
}

/// Parses `raw` and reports whether it is the homepage; unparseable input is not.
pub fn is_homepage(raw: &str) -> bool {
    Url::parse(raw).map(|url| is_homepage_url(&url)).unwrap_or(false)
}

/// Links leaving Meet from inside a call open externally instead of replacing the call.
pub fn should_open_external(current_url: &Url, target_url: &Url) -> bool {
    if is_meeting_url(current_url) {
        return !is_meet_url(target_url);
    }
    false
}
