use chrono::{Datelike, NaiveDate};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "tasktimer-dev",
            Profile::Prod => "tasktimer",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "tasktimer-dev" instead of "tasktimer"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tasktimer", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path
/// If profile is Dev, uses "tasktimer-dev" instead of "tasktimer"
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tasktimer", profile.app_name())
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

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
}

/// Today's date in local time
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Split a comma-separated tag list, dropping blanks
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Human label for a due date relative to `today`: "Today", "Tomorrow",
/// "Yesterday", the weekday within a week either side, else "3 Mar 2025".
pub fn due_label(due: NaiveDate, today: NaiveDate) -> String {
    let days = (due - today).num_days();
    match days {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        -6..=6 => due.format("%A").to_string(),
        _ => format!("{} {}", due.day(), due.format("%b %Y")),
    }
}

pub fn is_overdue(due: NaiveDate, today: NaiveDate) -> bool {
    due < today
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn labels_near_dates() {
        let today = date(2025, 3, 12); // a Wednesday
        assert_eq!(due_label(today, today), "Today");
        assert_eq!(due_label(date(2025, 3, 13), today), "Tomorrow");
        assert_eq!(due_label(date(2025, 3, 11), today), "Yesterday");
        assert_eq!(due_label(date(2025, 3, 15), today), "Saturday");
        assert_eq!(due_label(date(2025, 4, 3), today), "3 Apr 2025");
    }

    #[test]
    fn overdue_is_strictly_before_today() {
        let today = date(2025, 3, 12);
        assert!(is_overdue(date(2025, 3, 11), today));
        assert!(!is_overdue(today, today));
    }

    #[test]
    fn tags_are_trimmed() {
        assert_eq!(parse_tags(" work, ,urgent ,"), ["work", "urgent"]);
    }

    #[test]
    fn dates_must_be_iso() {
        assert!(parse_date("2025-02-30").is_err());
        assert_eq!(parse_date(" 2025-02-28 ").unwrap(), date(2025, 2, 28));
    }
}
