use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::stages::StatusConfig;

pub const DEFAULT_WORKING_HOURS_PER_DAY: f64 = 8.0;
pub const DEFAULT_WORKING_DAYS_PER_WEEK: f64 = 5.0;

static DURATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([a-z]+)").expect("duration pattern is valid")
});

/// 課題集合に付随する設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    /// Jiraサーバーのルート URL（リンク生成用、空なら生成しない）
    #[serde(default)]
    pub server_url: String,
    pub working_hours_per_day: f64,
    pub working_days_per_week: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_config: Option<StatusConfig>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            working_hours_per_day: DEFAULT_WORKING_HOURS_PER_DAY,
            working_days_per_week: DEFAULT_WORKING_DAYS_PER_WEEK,
            status_config: None,
        }
    }
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn working_hours_per_day(mut self, hours: f64) -> Self {
        self.working_hours_per_day = hours;
        self
    }

    pub fn working_days_per_week(mut self, days: f64) -> Self {
        self.working_days_per_week = days;
        self
    }

    pub fn status_config(mut self, status_config: StatusConfig) -> Self {
        self.status_config = Some(status_config);
        self
    }

    fn hours_per_day(&self) -> f64 {
        if self.working_hours_per_day > 0.0 {
            self.working_hours_per_day
        } else {
            DEFAULT_WORKING_HOURS_PER_DAY
        }
    }

    fn days_per_week(&self) -> f64 {
        if self.working_days_per_week > 0.0 {
            self.working_days_per_week
        } else {
            DEFAULT_WORKING_DAYS_PER_WEEK
        }
    }

    /// 人数×日数で使える工数（時間）
    pub fn capacity_for_days_people(&self, days: f64, people: f64) -> f64 {
        days * people * self.hours_per_day()
    }

    /// 秒を稼働日数に換算（負の値は0とみなす）
    pub fn seconds_to_days(&self, seconds: i64) -> f64 {
        seconds.max(0) as f64 / 3600.0 / self.hours_per_day()
    }

    /// 秒を稼働週数に換算
    pub fn seconds_to_weeks(&self, seconds: i64) -> f64 {
        self.seconds_to_days(seconds) / self.days_per_week()
    }

    /// `"1w 2d 3h 30m"` や `"2 days, 4 hours"` 形式の期間を秒に変換
    ///
    /// 週は `working_days_per_week`、日は `working_hours_per_day` で換算する。
    pub fn parse_duration(&self, s: &str) -> Result<i64> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("duration is empty".to_string()));
        }

        let mut seconds = 0.0;
        let mut matched = 0;
        let mut last_end = 0;
        for caps in DURATION_TOKEN.captures_iter(trimmed) {
            let Some(token) = caps.get(0) else { continue };
            if !is_separator(&trimmed[last_end..token.start()]) {
                return Err(Error::InvalidInput(format!("invalid duration '{}'", s)));
            }
            last_end = token.end();
            let amount: f64 = caps[1]
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid duration amount in '{}'", s)))?;
            let unit_seconds = match caps[2].to_lowercase().as_str() {
                "w" | "week" | "weeks" => self.days_per_week() * self.hours_per_day() * 3600.0,
                "d" | "day" | "days" => self.hours_per_day() * 3600.0,
                "h" | "hour" | "hours" => 3600.0,
                "m" | "minute" | "minutes" => 60.0,
                "s" | "second" | "seconds" => 1.0,
                unit => {
                    return Err(Error::InvalidInput(format!(
                        "unknown duration unit '{}' in '{}'",
                        unit, s
                    )));
                }
            };
            seconds += amount * unit_seconds;
            matched += 1;
        }

        if matched == 0 || !is_separator(&trimmed[last_end..]) {
            return Err(Error::InvalidInput(format!("invalid duration '{}'", s)));
        }
        Ok(seconds.round() as i64)
    }

    /// 課題のブラウザURL（サーバーURL未設定なら `None`）
    pub fn issue_url(&self, key: &str) -> Option<String> {
        if self.server_url.is_empty() {
            None
        } else {
            Some(format!("{}/browse/{}", self.server_url, key))
        }
    }
}

/// 期間トークンの間に置けるのは空白とカンマだけ
fn is_separator(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == ',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_for_days_people() {
        let config = GraphConfig::new()
            .working_hours_per_day(8.0)
            .working_days_per_week(5.0);

        assert_eq!(config.capacity_for_days_people(1.0, 1.0), 8.0);
        assert_eq!(config.capacity_for_days_people(5.0, 3.0), 120.0);
    }

    #[test]
    fn test_seconds_to_days_clamps_negative() {
        let config = GraphConfig::default();

        assert_eq!(config.seconds_to_days(8 * 3600), 1.0);
        assert_eq!(config.seconds_to_days(4 * 3600), 0.5);
        assert_eq!(config.seconds_to_days(-3600), 0.0);
        assert_eq!(config.seconds_to_weeks(40 * 3600), 1.0);
    }

    #[test]
    fn test_parse_duration_weeks_and_days_are_distinct() {
        let config = GraphConfig::default();

        assert_eq!(config.parse_duration("1d").unwrap(), 8 * 3600);
        assert_eq!(config.parse_duration("1w").unwrap(), 5 * 8 * 3600);
        assert_eq!(
            config.parse_duration("1w 2d 3h 30m").unwrap(),
            (40 + 16 + 3) * 3600 + 30 * 60
        );
        assert_eq!(
            config.parse_duration("2 days, 4 hours").unwrap(),
            20 * 3600
        );
        assert_eq!(config.parse_duration("1.5h").unwrap(), 5400);

        let short_week = GraphConfig::default().working_days_per_week(4.0);
        assert_eq!(short_week.parse_duration("1 week").unwrap(), 4 * 8 * 3600);
    }

    #[test]
    fn test_parse_duration_errors() {
        let config = GraphConfig::default();

        assert!(matches!(config.parse_duration(""), Err(Error::InvalidInput(_))));
        assert!(matches!(config.parse_duration("soon"), Err(Error::InvalidInput(_))));
        assert!(matches!(config.parse_duration("3 fortnights"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_parse_duration_rejects_unparsed_text() {
        let config = GraphConfig::new();

        // 符号や余分な語は読み飛ばさない
        assert!(matches!(config.parse_duration("-2h"), Err(Error::InvalidInput(_))));
        assert!(matches!(config.parse_duration("1d junk"), Err(Error::InvalidInput(_))));
        assert!(matches!(config.parse_duration("about 3h"), Err(Error::InvalidInput(_))));
        assert!(matches!(config.parse_duration("2h;30m"), Err(Error::InvalidInput(_))));
        assert_eq!(config.parse_duration(" 1h, 30m ").unwrap(), 5400);
    }

    #[test]
    fn test_issue_url() {
        let config = GraphConfig::new().server_url("https://example.atlassian.net/");
        assert_eq!(
            config.issue_url("ABC-1").as_deref(),
            Some("https://example.atlassian.net/browse/ABC-1")
        );
        assert!(GraphConfig::default().issue_url("ABC-1").is_none());
    }
}
