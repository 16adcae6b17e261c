use chrono::NaiveDateTime;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Mouse and session time recovered from a recording's file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParsedName {
    pub mouse_id: i64,
    pub session_time: NaiveDateTime,
}

// {prefix}{mouseId}-{ddmmYYYY}-{HHMMSS}, optionally followed by _anything or .anything
// e.g., T12-15012023-143000_labels.csv, M3-01022023-090000.predictions.analysis.h5
static SESSION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<prefix>[A-Za-z])
        (?P<mouse>\d+)
        -(?P<date>\d{8})
        -(?P<time>\d{6})
        (?:[_.]|$)"
    )
    .unwrap()
});

/// Parse `{prefix}{mouseId}-{ddmmYYYY}-{HHMMSS}_*` from a file name.
/// Returns `None` when the name does not follow the pattern or the date is invalid.
pub fn parse_session_name(path: &Path) -> Option<ParsedName> {
    let stem = path.file_stem().and_then(|s| s.to_str())?;
    let caps = SESSION_NAME_RE.captures(stem)?;

    let mouse_id: i64 = caps.name("mouse")?.as_str().parse().ok()?;
    let stamp = format!("{}-{}", &caps["date"], &caps["time"]);
    let session_time = NaiveDateTime::parse_from_str(&stamp, "%d%m%Y-%H%M%S").ok()?;

    Some(ParsedName { mouse_id, session_time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    #[test]
    fn test_label_file() {
        let p = PathBuf::from("/data/labels/T12-15012023-143000_labels.csv");
        let r = parse_session_name(&p).unwrap();
        assert_eq!(r.mouse_id, 12);
        assert_eq!(r.session_time, at(2023, 1, 15, 14, 30, 0));
    }

    #[test]
    fn test_pose_file_no_suffix() {
        let p = PathBuf::from("M3-01022023-090005.h5");
        let r = parse_session_name(&p).unwrap();
        assert_eq!(r.mouse_id, 3);
        assert_eq!(r.session_time, at(2023, 2, 1, 9, 0, 5));
    }

    #[test]
    fn test_dlc_style_suffix() {
        let p = PathBuf::from("T7-31122022-235959_DLC_resnet50_openfieldOct20shuffle1_10000.csv");
        let r = parse_session_name(&p).unwrap();
        assert_eq!(r.mouse_id, 7);
        assert_eq!(r.session_time, at(2022, 12, 31, 23, 59, 59));
    }

    #[test]
    fn test_leading_zeros_in_mouse_id() {
        let r = parse_session_name(Path::new("T007-01012023-000000_x.csv")).unwrap();
        assert_eq!(r.mouse_id, 7);
    }

    #[test]
    fn test_invalid_date_rejected() {
        // day 32
        assert!(parse_session_name(Path::new("T1-32012023-120000_x.csv")).is_none());
        // hour 25
        assert!(parse_session_name(Path::new("T1-01012023-250000_x.csv")).is_none());
    }

    #[test]
    fn test_pattern_mismatch() {
        assert!(parse_session_name(Path::new("session1.csv")).is_none());
        assert!(parse_session_name(Path::new("12-15012023-143000.csv")).is_none());
        assert!(parse_session_name(Path::new("T12-1501202-143000.csv")).is_none());
        assert!(parse_session_name(Path::new("T12-15012023-1430001.csv")).is_none());
    }

    #[test]
    fn test_same_session_from_label_and_pose() {
        let a = parse_session_name(Path::new("T12-15012023-143000_labels.csv")).unwrap();
        let b = parse_session_name(Path::new("T12-15012023-143000.predictions.analysis.h5")).unwrap();
        assert_eq!(a, b);
    }
}
