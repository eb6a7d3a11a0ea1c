use std::hash::Hasher;

use super::Meeting;

/// Fingerprint of an empty meeting list. Hashed fingerprints always start with
/// a non-zero count, so this can never collide with one.
pub const EMPTY_FINGERPRINT: &str = "0:empty";

/// Summarizes the identity-relevant state of a meeting set as `"<count>:<hex>"`.
///
/// Order-independent, and blind to fields that move with the clock
/// (`display_time`, `starts_in_minutes`) or to whitespace in titles.
pub fn fingerprint(meetings: &[Meeting]) -> String {
    if meetings.is_empty() {
        return EMPTY_FINGERPRINT.to_string();
    }

    let mut keys: Vec<String> = meetings.iter().map(composite_key).collect();
    keys.sort_unstable();

    let mut hasher = Fnv1a32::new();
    for (idx, key) in keys.iter().enumerate() {
        if idx > 0 {
            hasher.write(b"\n");
        }
        hasher.write(key.as_bytes());
    }

    format!("{}:{:08x}", meetings.len(), hasher.finish_u32())
}

fn composite_key(meeting: &Meeting) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        meeting.call_id,
        meeting.begin_time.timestamp_millis(),
        meeting.end_time.timestamp_millis(),
        meeting.event_id.as_deref().unwrap_or(""),
        normalize_title(&meeting.title),
    )
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 32-bit FNV-1a. Fixed algorithm, so fingerprints stay comparable across
/// restarts and builds, unlike `DefaultHasher`.
struct Fnv1a32(u32);

impl Fnv1a32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    fn finish_u32(&self) -> u32 {
        self.0
    }
}

impl Hasher for Fnv1a32 {
    fn finish(&self) -> u64 {
        u64::from(self.0)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u32::from(b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meetings::meeting::fixtures::{base_time, meeting_at};
    use chrono::Duration;

    fn sample() -> Vec<Meeting> {
        let now = base_time();
        vec![
            meeting_at("abc-defg-hij", "Standup", now, 5),
            meeting_at("klm-nopq-rst", "Design review", now, 60),
            meeting_at("uvw-xyza-bcd", "1:1", now, 120),
        ]
    }

    #[test]
    fn empty_list_uses_sentinel() {
        assert_eq!(fingerprint(&[]), "0:empty");
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        let mut empty = Fnv1a32::new();
        empty.write(b"");
        assert_eq!(empty.finish_u32(), 0x811c9dc5);

        let mut a = Fnv1a32::new();
        a.write(b"a");
        assert_eq!(a.finish_u32(), 0xe40c292c);
    }

    #[test]
    fn format_is_count_and_hex() {
        let fp = fingerprint(&sample());
        let (count, hash) = fp.split_once(':').unwrap();
        assert_eq!(count, "3");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stable_and_order_independent() {
        let meetings = sample();
        let mut shuffled = meetings.clone();
        shuffled.reverse();
        shuffled.swap(0, 1);

        assert_eq!(fingerprint(&meetings), fingerprint(&meetings));
        assert_eq!(fingerprint(&meetings), fingerprint(&shuffled));
    }

    #[test]
    fn ignores_time_relative_fields_and_title_whitespace() {
        let meetings = sample();
        let mut drifted = meetings.clone();
        drifted[0].display_time = "in 4 minutes".to_string();
        drifted[0].starts_in_minutes = 4;
        drifted[1].title = "  Design \t  review\n".to_string();

        assert_eq!(fingerprint(&meetings), fingerprint(&drifted));
    }

    #[test]
    fn sensitive_to_identity_fields() {
        let meetings = sample();
        let base = fingerprint(&meetings);

        let mut changed = meetings.clone();
        changed[0].call_id = "zzz-zzzz-zzz".to_string();
        assert_ne!(base, fingerprint(&changed));

        let mut changed = meetings.clone();
        changed[1].begin_time += Duration::minutes(15);
        assert_ne!(base, fingerprint(&changed));

        let mut changed = meetings.clone();
        changed[1].end_time += Duration::minutes(15);
        assert_ne!(base, fingerprint(&changed));

        let mut changed = meetings.clone();
        changed[2].title = "1:1 (moved)".to_string();
        assert_ne!(base, fingerprint(&changed));

        let mut changed = meetings.clone();
        changed[2].event_id = Some("evt-42".to_string());
        assert_ne!(base, fingerprint(&changed));
    }

    #[test]
    fn sensitive_to_set_size() {
        let meetings = sample();
        assert_ne!(fingerprint(&meetings), fingerprint(&meetings[..2]));
    }
}
