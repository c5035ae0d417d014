use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{FieldSchema, StatusCategory};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionsResponse {
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<TransitionTarget>,
    #[serde(rename = "hasScreen")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_screen: Option<bool>,
    /// `expand=transitions.fields` 指定時のみ返る
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, TransitionField>,
}

/// 遷移先ステータス
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionTarget {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "statusCategory")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_category: Option<StatusCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionField {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<FieldSchema>,
    #[serde(rename = "allowedValues")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<serde_json::Value>>,
}

/// ラベル更新操作（`add` と `remove` のどちらか一方のみ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<String>,
}

impl LabelUpdate {
    pub fn add(label: impl Into<String>) -> Self {
        Self {
            add: Some(label.into()),
            remove: None,
        }
    }

    pub fn remove(label: impl Into<String>) -> Self {
        Self {
            add: None,
            remove: Some(label.into()),
        }
    }
}

/// 作業ログの追加
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorklogAdd {
    #[serde(rename = "timeSpent")]
    pub time_spent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// 遷移・フィールド更新時に送るペイロード
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePayload {
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub labels: Vec<LabelUpdate>,
    pub worklogs: Vec<WorklogAdd>,
}

impl IssuePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn label(mut self, update: LabelUpdate) -> Self {
        self.labels.push(update);
        self
    }

    pub fn worklog(mut self, worklog: WorklogAdd) -> Self {
        self.worklogs.push(worklog);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.labels.is_empty() && self.worklogs.is_empty()
    }
}
