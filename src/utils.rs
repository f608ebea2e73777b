use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    pub fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "notia-dev",
            Profile::Prod => "notia",
        }
    }
}

/// Get the configuration directory path for Notia
/// If profile is Dev, uses "notia-dev" instead of "notia"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "notia", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path for Notia
/// If profile is Dev, uses "notia-dev" instead of "notia"
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "notia", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Current local wall-clock time, the default parse base
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parse a base date given on the command line (`YYYY-MM-DD HH:MM` or `YYYY-MM-DD`)
pub fn parse_base_date(input: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let input = input.trim();
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M").or_else(|e| {
        chrono::NaiveDate::parse_from_str(input, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or(e)
    })
}

/// Attach the local offset to a wall-clock time and format it as RFC 3339.
/// Returns `None` for times that fall in a DST gap.
pub fn local_to_rfc3339(naive: NaiveDateTime) -> Option<String> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.to_rfc3339())
}

/// Read an RFC 3339 timestamp back as local wall-clock time
pub fn rfc3339_to_local(stamp: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    DateTime::parse_from_rfc3339(stamp).map(|dt| dt.with_timezone(&Local).naive_local())
}

/// Format a stored RFC 3339 timestamp for display, falling back to the raw text
pub fn format_reminder_time(stamp: &str) -> String {
    rfc3339_to_local(stamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| stamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_base_date_forms() {
        let with_time = parse_base_date("2025-01-01 20:00").unwrap();
        assert_eq!(
            with_time,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(20, 0, 0).unwrap()
        );
        let date_only = parse_base_date("2025-01-01").unwrap();
        assert_eq!(date_only.format("%H:%M").to_string(), "00:00");
        assert!(parse_base_date("tomorrow").is_err());
    }

    #[test]
    fn test_local_round_trip() {
        let naive = NaiveDate::from_ymd_opt(2025, 5, 25).unwrap().and_hms_opt(15, 30, 0).unwrap();
        let stamp = local_to_rfc3339(naive).unwrap();
        assert_eq!(rfc3339_to_local(&stamp).unwrap(), naive);
        assert_eq!(format_reminder_time(&stamp), "2025-05-25 15:30");
        assert_eq!(format_reminder_time("garbage"), "garbage");
    }

    #[test]
    fn test_expand_path_leaves_plain_paths() {
        assert_eq!(expand_path("/tmp/notia.db"), PathBuf::from("/tmp/notia.db"));
    }
}
