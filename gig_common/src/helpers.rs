use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp the way every wire frame and on-disk record in the gateway does: ISO-8601 UTC with
/// millisecond precision and a `Z` suffix.
pub fn iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncates long opaque payloads (base64 blobs, mostly) for log lines.
pub fn elide(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}… ({} bytes)", &s[..idx], s.len()),
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn iso8601_is_utc_with_millis() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 45).unwrap();
        assert_eq!(iso8601(dt), "2024-05-04T12:30:45.000Z");
    }

    #[test]
    fn elide_leaves_short_strings_alone() {
        assert_eq!(elide("short", 32), "short");
        let long = "a".repeat(100);
        let elided = elide(&long, 8);
        assert!(elided.starts_with("aaaaaaaa"));
        assert!(elided.contains("100 bytes"));
    }
}
