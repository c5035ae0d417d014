use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

/// Jiraの日時文字列を`DateTime<Utc>`にパース
///
/// RFC 3339 と、Jiraが返す `+0000` 形式のオフセットの両方を受け付ける。
pub fn parse_jira_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
}

/// その月の1日
pub fn month_start(dt: DateTime<Utc>) -> NaiveDate {
    NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1).unwrap_or(dt.date_naive())
}

/// 翌月の1日
pub fn next_month(month: NaiveDate) -> NaiveDate {
    let (year, month_num) = if month.month() == 12 {
        (month.year() + 1, 1)
    } else {
        (month.year(), month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month_num, 1).unwrap_or(month)
}

/// 成果物ファイル名（例: `backlog-2024-01-02T03-04-05Z.json`）
pub fn artifact_file_name(prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(':', "-");
    format!("{}-{}.{}", prefix, stamp, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_jira_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();

        assert_eq!(parse_jira_datetime("2024-01-15T10:30:00.000+0000").unwrap(), expected);
        assert_eq!(parse_jira_datetime("2024-01-15T10:30:00.000Z").unwrap(), expected);
        assert_eq!(parse_jira_datetime("2024-01-15T19:30:00+09:00").unwrap(), expected);

        let offset = parse_jira_datetime("2024-01-15T05:30:00.000-0500").unwrap();
        assert_eq!(offset.hour(), 10);

        assert!(parse_jira_datetime("15/01/2024").is_err());
    }

    #[test]
    fn test_month_helpers() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let month = month_start(dt);

        assert_eq!(month, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(next_month(month), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_artifact_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            artifact_file_name("backlog", "json", at),
            "backlog-2024-01-02T03-04-05Z.json"
        );
    }
}
