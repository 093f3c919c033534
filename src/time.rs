//! All wall-clock reads in the core go through here so every component
//! agrees on one timezone (spec.md §6: "a single fixed timezone
//! (Europe/Madrid)").

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Madrid;
use chrono_tz::Tz;

pub type LocalTime = DateTime<Tz>;

/// Single `now` sample for the configured timezone. spec.md §4.3's tie-break
/// rule ("any derived field that depends on `now` uses a single `now`
/// sampled once at the entry of the operation") means callers must capture
/// this once per operation and thread it through, never call it twice.
pub fn now() -> LocalTime {
    Utc::now().with_timezone(&Madrid)
}

/// Minutes between two instants, floating point, matching spec.md §4.5's
/// `minutes(a - b)` notation. Negative when `later` precedes `earlier`.
pub fn minutes_between(earlier: LocalTime, later: LocalTime) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

pub fn to_rfc3339(t: LocalTime) -> String {
    t.to_rfc3339()
}

pub fn from_rfc3339(s: &str) -> Result<LocalTime, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Madrid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minutes_between_is_symmetric_negated() {
        let a = Madrid.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let b = Madrid.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        assert_eq!(minutes_between(a, b), 60.0);
        assert_eq!(minutes_between(b, a), -60.0);
    }

    #[test]
    fn rfc3339_roundtrip() {
        let a = Madrid.with_ymd_and_hms(2026, 7, 26, 8, 30, 15).unwrap();
        let s = to_rfc3339(a);
        let b = from_rfc3339(&s).unwrap();
        assert_eq!(a, b);
    }
}
