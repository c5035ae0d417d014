use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{IssueType, Project, Status, User};

/// 課題レコード
///
/// 検索・バックログ・XMLなど取得経路に関係なく、この型に正規化して扱う。
/// 必須なのは `key` のみで、他のフィールドは欠けていてもデシリアライズできる。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub id: String,
    pub key: String,
    #[serde(rename = "self")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_url: Option<String>,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<serde_json::Value>, // 文字列またはADF形式のオブジェクト
    #[serde(rename = "issuetype")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<EpicRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,

    // 工数（秒）
    #[serde(rename = "timeestimate")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<i64>,
    #[serde(rename = "timeoriginalestimate")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_original_estimate: Option<i64>,
    #[serde(rename = "timespent")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i64>,
    #[serde(rename = "aggregatetimeestimate")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_time_estimate: Option<i64>,
    #[serde(rename = "aggregatetimeoriginalestimate")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_time_original_estimate: Option<i64>,
    #[serde(rename = "aggregatetimespent")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_time_spent: Option<i64>,

    // カスタムフィールドは動的に追加
    #[serde(flatten)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

/// 親課題への参照（未取得の課題を指していてもよい）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

/// Agile APIの `expand=epic` で返されるエピック情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpicRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl EpicRef {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
