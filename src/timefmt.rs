//! Wall-clock formatting shared by the persistence files and the JSON API.
//!
//! Everything on disk and on the wire uses the second-precision
//! `%Y-%m-%d %H:%M:%S` form in local time. Permanent bans are written as the
//! distinguished [`SENTINEL`] value, which no real clock reading ever takes.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// On-disk representation of "never": the unban time of a permanent ban.
pub const SENTINEL: &str = "0000-00-00 00:00:00";

const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp in the shared second-precision form.
pub fn format(at: DateTime<Local>) -> String {
    at.format(FORMAT).to_string()
}

/// Parses the shared form back into a local timestamp.
///
/// Returns `None` for the sentinel and for anything malformed; callers decide
/// what a missing time means for their record.
pub fn parse(s: &str) -> Option<DateTime<Local>> {
    if s == SENTINEL {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(s, FORMAT).ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Serde helper: serialise a timestamp as the shared string form.
pub fn serialize<S>(at: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format(*at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn round_trips_to_second_precision() {
        let now = Local::now().with_nanosecond(0).unwrap();
        let parsed = parse(&format(now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn sentinel_parses_as_never() {
        assert!(parse(SENTINEL).is_none());
    }

    #[test]
    fn garbage_parses_as_none() {
        assert!(parse("not a time").is_none());
        assert!(parse("2024-13-40 99:00:00").is_none());
    }
}
