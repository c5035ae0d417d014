//! 課題レコードへの一様なアクセサ
//!
//! 入れ子の任意フィールドをたどる処理をここに集約する。途中が欠けていれば
//! 空文字列・0・`None` を返し、エラーにはしない。

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::customfield;
use crate::error::{Error, Result};
use crate::models::{Issue, User};
use crate::pager::RANK_FIELD;
use crate::time_util;

#[derive(Debug, Clone, Copy)]
pub struct IssueAccessor<'a> {
    issue: &'a Issue,
}

impl<'a> IssueAccessor<'a> {
    pub fn new(issue: &'a Issue) -> Self {
        Self { issue }
    }

    pub fn issue(&self) -> &'a Issue {
        self.issue
    }

    pub fn key(&self) -> &'a str {
        &self.issue.key
    }

    pub fn summary(&self) -> &'a str {
        &self.issue.fields.summary
    }

    pub fn type_name(&self) -> &'a str {
        self.issue
            .fields
            .issue_type
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or("")
    }

    pub fn status_name(&self) -> &'a str {
        self.issue
            .fields
            .status
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("")
    }

    pub fn status_category_key(&self) -> &'a str {
        self.issue
            .fields
            .status
            .as_ref()
            .and_then(|s| s.status_category.as_ref())
            .map(|c| c.key.as_str())
            .unwrap_or("")
    }

    pub fn status_category_name(&self) -> &'a str {
        self.issue
            .fields
            .status
            .as_ref()
            .and_then(|s| s.status_category.as_ref())
            .map(|c| c.name.as_str())
            .unwrap_or("")
    }

    /// プロジェクトキー。未取得ならキーの接頭辞から推定
    pub fn project_key(&self) -> &'a str {
        match self.issue.fields.project.as_ref().map(|p| p.key.as_str()) {
            Some(key) if !key.is_empty() => key,
            _ => self
                .issue
                .key
                .rsplit_once('-')
                .map(|(prefix, _)| prefix)
                .unwrap_or(""),
        }
    }

    pub fn project_name(&self) -> &'a str {
        self.issue
            .fields
            .project
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("")
    }

    pub fn assignee_name(&self) -> &'a str {
        user_name(self.issue.fields.assignee.as_ref())
    }

    pub fn reporter_name(&self) -> &'a str {
        user_name(self.issue.fields.reporter.as_ref())
    }

    pub fn creator_name(&self) -> &'a str {
        user_name(self.issue.fields.creator.as_ref())
    }

    pub fn parent_key(&self) -> &'a str {
        self.issue
            .fields
            .parent
            .as_ref()
            .map(|p| p.key.trim())
            .unwrap_or("")
    }

    pub fn epic_key(&self) -> &'a str {
        self.issue
            .fields
            .epic
            .as_ref()
            .map(|e| e.key.trim())
            .unwrap_or("")
    }

    pub fn epic_name(&self) -> &'a str {
        self.issue
            .fields
            .epic
            .as_ref()
            .map(|e| e.name.as_str())
            .unwrap_or("")
    }

    pub fn resolution_name(&self) -> &'a str {
        self.issue
            .fields
            .resolution
            .as_ref()
            .map(|r| r.name.as_str())
            .unwrap_or("")
    }

    pub fn labels(&self) -> &'a [String] {
        &self.issue.fields.labels
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.issue
            .fields
            .created
            .as_deref()
            .and_then(|s| time_util::parse_jira_datetime(s).ok())
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.issue
            .fields
            .updated
            .as_deref()
            .and_then(|s| time_util::parse_jira_datetime(s).ok())
    }

    /// 作成月の1日
    pub fn created_month(&self) -> Option<NaiveDate> {
        self.created().map(time_util::month_start)
    }

    /// ステータスが closed / done（大文字小文字は無視）
    pub fn is_done(&self) -> bool {
        status_is_done(self.status_name())
    }

    // 工数（秒、負の値は0）

    pub fn time_estimate(&self) -> i64 {
        clamp(self.issue.fields.time_estimate)
    }

    pub fn time_original_estimate(&self) -> i64 {
        clamp(self.issue.fields.time_original_estimate)
    }

    pub fn time_spent(&self) -> i64 {
        clamp(self.issue.fields.time_spent)
    }

    pub fn aggregate_time_estimate(&self) -> i64 {
        clamp(self.issue.fields.aggregate_time_estimate)
    }

    pub fn aggregate_time_original_estimate(&self) -> i64 {
        clamp(self.issue.fields.aggregate_time_original_estimate)
    }

    pub fn aggregate_time_spent(&self) -> i64 {
        clamp(self.issue.fields.aggregate_time_spent)
    }

    /// `(残り見積, 残り当初見積)`
    pub fn time_remaining(&self) -> (i64, i64) {
        time_remaining(
            self.status_name(),
            self.time_original_estimate(),
            self.time_estimate(),
            self.time_spent(),
        )
    }

    /// カスタムフィールドの生の値。識別子はどの表記でもよい
    pub fn custom_value(&self, ident: &str) -> Option<&'a Value> {
        let (canonical, _) = customfield::is_custom(ident);
        self.issue
            .fields
            .custom_fields
            .get(&canonical)
            .filter(|v| !v.is_null())
    }

    /// カスタムフィールドの値を文字列で取得（トリム済み）
    pub fn custom_string(&self, ident: &str) -> String {
        self.custom_value(ident)
            .map(value_to_string)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// バックログ順位（書き込まれていなければ `None`）
    pub fn rank(&self) -> Option<u64> {
        self.issue
            .fields
            .custom_fields
            .get(RANK_FIELD)
            .and_then(Value::as_u64)
    }

    /// 説明文のプレーンテキスト（ADFは可能な範囲で平文化）
    pub fn description_text(&self) -> String {
        match &self.issue.fields.description {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(doc) => {
                let mut blocks = Vec::new();
                adf_blocks(doc, &mut blocks);
                blocks.join("\n")
            }
        }
    }
}

/// 集計やピボットの軸に使う課題の項目
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IssueField {
    Key,
    Project,
    Type,
    Status,
    StatusCategory,
    Resolution,
    Assignee,
    Epic,
    Parent,
    /// 正規化済みのカスタムフィールドID（`customfield_N`）
    Custom(String),
}

impl IssueField {
    /// 課題からこの項目の値を文字列で取り出す
    pub fn value(&self, accessor: &IssueAccessor<'_>) -> String {
        match self {
            IssueField::Key => accessor.key().to_string(),
            IssueField::Project => accessor.project_key().to_string(),
            IssueField::Type => accessor.type_name().to_string(),
            IssueField::Status => accessor.status_name().to_string(),
            IssueField::StatusCategory => accessor.status_category_name().to_string(),
            IssueField::Resolution => accessor.resolution_name().to_string(),
            IssueField::Assignee => accessor.assignee_name().to_string(),
            IssueField::Epic => accessor.epic_key().to_string(),
            IssueField::Parent => accessor.parent_key().to_string(),
            IssueField::Custom(id) => accessor.custom_string(id),
        }
    }
}

impl fmt::Display for IssueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueField::Key => "Key",
            IssueField::Project => "Project",
            IssueField::Type => "Type",
            IssueField::Status => "Status",
            IssueField::StatusCategory => "Status Category",
            IssueField::Resolution => "Resolution",
            IssueField::Assignee => "Assignee",
            IssueField::Epic => "Epic",
            IssueField::Parent => "Parent",
            IssueField::Custom(id) => id,
        };
        f.write_str(name)
    }
}

impl FromStr for IssueField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '_', '-'], "");
        let field = match normalized.as_str() {
            "key" => IssueField::Key,
            "project" => IssueField::Project,
            "type" | "issuetype" => IssueField::Type,
            "status" => IssueField::Status,
            "statuscategory" => IssueField::StatusCategory,
            "resolution" => IssueField::Resolution,
            "assignee" => IssueField::Assignee,
            "epic" | "epiclink" => IssueField::Epic,
            "parent" => IssueField::Parent,
            _ => match customfield::is_custom(s) {
                (canonical, true) => IssueField::Custom(canonical),
                _ => {
                    return Err(Error::InvalidInput(format!("unknown issue field '{}'", s)));
                }
            },
        };
        Ok(field)
    }
}

fn clamp(value: Option<i64>) -> i64 {
    value.unwrap_or(0).max(0)
}

fn user_name(user: Option<&User>) -> &str {
    match user {
        Some(u) if !u.display_name.is_empty() => &u.display_name,
        Some(u) => u.name.as_deref().unwrap_or(""),
        None => "",
    }
}

pub fn status_is_done(status: &str) -> bool {
    let status = status.trim().to_lowercase();
    status == "closed" || status == "done"
}

/// 残り工数の計算
///
/// 入力は負なら0に丸める。closed / done の課題は `(0, 0)`。
pub fn time_remaining(status: &str, original_estimate: i64, estimate: i64, spent: i64) -> (i64, i64) {
    if status_is_done(status) {
        return (0, 0);
    }
    let (original_estimate, estimate, spent) =
        (original_estimate.max(0), estimate.max(0), spent.max(0));
    ((estimate - spent).max(0), (original_estimate - spent).max(0))
}

/// JSON値を表示用文字列に変換
///
/// オブジェクトは `value` / `name` / `key` / `displayName` の順で探す。
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => ["value", "name", "key", "displayName"]
            .iter()
            .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
            .map(value_to_string)
            .unwrap_or_default(),
    }
}

fn adf_blocks(node: &Value, blocks: &mut Vec<String>) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
    match node_type {
        "paragraph" | "heading" | "codeBlock" | "blockquote" => {
            let mut text = String::new();
            adf_inline(node, &mut text);
            if !text.trim().is_empty() {
                blocks.push(text);
            }
        }
        _ => {
            if let Some(children) = node.get("content").and_then(Value::as_array) {
                for child in children {
                    adf_blocks(child, blocks);
                }
            }
        }
    }
}

fn adf_inline(node: &Value, out: &mut String) {
    match node.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("hardBreak") => out.push('\n'),
        Some("mention") | Some("emoji") => {
            if let Some(text) = node.pointer("/attrs/text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        _ => {
            if let Some(children) = node.get("content").and_then(Value::as_array) {
                for child in children {
                    adf_inline(child, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Issue {
        serde_json::from_value(json!({
            "id": "1",
            "key": "ABC-12",
            "fields": {
                "summary": "Do the thing",
                "issuetype": {"name": "Story"},
                "status": {"name": "In Progress", "statusCategory": {"key": "indeterminate", "name": "In Progress"}},
                "assignee": {"displayName": "Alex Doe"},
                "reporter": {"name": "jdoe"},
                "parent": {"key": " ABC-1 "},
                "created": "2024-03-15T09:00:00.000+0000",
                "timeestimate": 7200,
                "timeoriginalestimate": 10800,
                "timespent": 3600,
                "aggregatetimespent": -50,
                "customfield_10014": " ABC-1 ",
                "customfield_10100": {"value": "Platform"},
                "customfield_10101": [{"name": "a"}, {"name": "b"}],
                "customfield_10102": 5,
                "customfield_10103": null,
                "description": {
                    "type": "doc",
                    "version": 1,
                    "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "Hello "}, {"type": "text", "text": "world"}]},
                        {"type": "bulletList", "content": [
                            {"type": "listItem", "content": [{"type": "paragraph", "content": [{"type": "text", "text": "item"}]}]}
                        ]}
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_nested_accessors() {
        let issue = sample();
        let a = IssueAccessor::new(&issue);

        assert_eq!(a.key(), "ABC-12");
        assert_eq!(a.type_name(), "Story");
        assert_eq!(a.status_name(), "In Progress");
        assert_eq!(a.status_category_key(), "indeterminate");
        assert_eq!(a.project_key(), "ABC");
        assert_eq!(a.project_name(), "");
        assert_eq!(a.assignee_name(), "Alex Doe");
        assert_eq!(a.reporter_name(), "jdoe");
        assert_eq!(a.creator_name(), "");
        assert_eq!(a.parent_key(), "ABC-1");
        assert_eq!(a.epic_key(), "");
        assert_eq!(a.resolution_name(), "");
        assert_eq!(a.created_month(), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(a.updated().is_none());
        assert!(!a.is_done());
    }

    #[test]
    fn test_missing_intermediates_return_zero_values() {
        let issue = Issue {
            key: "X-1".to_string(),
            ..Issue::default()
        };
        let a = IssueAccessor::new(&issue);

        assert_eq!(a.type_name(), "");
        assert_eq!(a.status_category_name(), "");
        assert_eq!(a.parent_key(), "");
        assert_eq!(a.time_spent(), 0);
        assert_eq!(a.custom_string("cf[1]"), "");
        assert!(a.rank().is_none());
        assert_eq!(a.description_text(), "");
    }

    #[test]
    fn test_custom_field_reads() {
        let issue = sample();
        let a = IssueAccessor::new(&issue);

        assert_eq!(a.custom_string("cf[10014]"), "ABC-1");
        assert_eq!(a.custom_string("customfield_10100"), "Platform");
        assert_eq!(a.custom_string("10101"), "a, b");
        assert_eq!(a.custom_string("CF[10102]"), "5");
        assert!(a.custom_value("cf[10103]").is_none());
    }

    #[test]
    fn test_time_fields_and_remaining() {
        let issue = sample();
        let a = IssueAccessor::new(&issue);

        assert_eq!(a.aggregate_time_spent(), 0);
        assert_eq!(a.time_remaining(), (3600, 7200));
    }

    #[test]
    fn test_time_remaining_rules() {
        assert_eq!(time_remaining("Done", 100, 100, 0), (0, 0));
        assert_eq!(time_remaining("CLOSED", 100, 100, 0), (0, 0));
        assert_eq!(time_remaining("Open", 100, 50, 80), (0, 20));
        assert_eq!(time_remaining("Open", -10, -5, -1), (0, 0));
        assert_eq!(time_remaining("Open", 100, 50, -30), (50, 100));

        for (toe, te, ts) in [(0, 0, 0), (10, 20, 5), (5, 100, 200), (300, 1, 2)] {
            let (remaining, remaining_original) = time_remaining("In Progress", toe, te, ts);
            assert!(remaining >= 0 && remaining <= te.max(0));
            assert!(remaining_original >= 0 && remaining_original <= toe.max(0));
        }
    }

    #[test]
    fn test_issue_field_parse_and_value() {
        let issue = sample();
        let a = IssueAccessor::new(&issue);

        assert_eq!("Issue Type".parse::<IssueField>().unwrap(), IssueField::Type);
        assert_eq!("status_category".parse::<IssueField>().unwrap(), IssueField::StatusCategory);
        assert_eq!(
            "cf[10100]".parse::<IssueField>().unwrap(),
            IssueField::Custom("customfield_10100".to_string())
        );
        assert!("nonsense".parse::<IssueField>().is_err());

        assert_eq!(IssueField::Project.value(&a), "ABC");
        assert_eq!(IssueField::Parent.value(&a), "ABC-1");
        assert_eq!(IssueField::Custom("customfield_10100".to_string()).value(&a), "Platform");
    }

    #[test]
    fn test_description_text_from_adf() {
        let issue = sample();
        assert_eq!(IssueAccessor::new(&issue).description_text(), "Hello world\nitem");
    }
}
