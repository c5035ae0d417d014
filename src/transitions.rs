//! ワークフロー遷移とフィールド更新（書き込み系の操作）

use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::info;

use crate::accessor::IssueAccessor;
use crate::client::{ApiRequest, JiraClient};
use crate::error::{Error, Result};
use crate::models::{IssuePayload, Transition, TransitionsResponse};

static ISSUE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*-[0-9]+$").expect("issue key pattern is valid"));

/// 課題キーの形式を検査し、前後の空白を除いて返す
pub fn validate_issue_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if ISSUE_KEY.is_match(key) {
        Ok(key)
    } else {
        Err(Error::InvalidInput(format!("invalid issue key '{}'", key)))
    }
}

/// 課題キーまたは数値IDを受け付ける
fn validate_key_or_id(key_or_id: &str) -> Result<&str> {
    let trimmed = key_or_id.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(trimmed);
    }
    validate_issue_key(trimmed)
}

impl IssuePayload {
    /// ラベル更新は `add` と `remove` のどちらか一方だけを持つこと
    pub fn validate(&self) -> Result<()> {
        for (index, label) in self.labels.iter().enumerate() {
            match (&label.add, &label.remove) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidInput(format!(
                        "label update {} sets both add and remove",
                        index
                    )));
                }
                (None, None) => {
                    return Err(Error::InvalidInput(format!(
                        "label update {} sets neither add nor remove",
                        index
                    )));
                }
            }
        }
        Ok(())
    }

    fn update_section(&self) -> Result<Map<String, Value>> {
        let mut update = Map::new();
        if !self.worklogs.is_empty() {
            let adds = self
                .worklogs
                .iter()
                .map(|w| -> Result<Value> { Ok(json!({ "add": serde_json::to_value(w)? })) })
                .collect::<Result<Vec<Value>>>()?;
            update.insert("worklog".to_string(), Value::Array(adds));
        }
        if !self.labels.is_empty() {
            update.insert("labels".to_string(), serde_json::to_value(&self.labels)?);
        }
        Ok(update)
    }

    /// フィールド更新（PUT）のリクエストボディ
    pub fn edit_body(&self) -> Result<Value> {
        self.validate()?;
        let mut body = Map::new();
        if !self.fields.is_empty() {
            body.insert("fields".to_string(), Value::Object(self.fields.clone()));
        }
        let update = self.update_section()?;
        if !update.is_empty() {
            body.insert("update".to_string(), Value::Object(update));
        }
        Ok(Value::Object(body))
    }

    /// 遷移実行（POST）のリクエストボディ
    pub fn transition_body(&self, transition_id: &str) -> Result<Value> {
        let mut body = match self.edit_body()? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.insert("transition".to_string(), json!({ "id": transition_id }));
        Ok(Value::Object(body))
    }
}

/// 遷移操作の結果
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// 既に目的のステータスだった（何も送っていない）
    AlreadyInStatus,
    Transitioned(Transition),
}

impl JiraClient {
    /// 課題で実行できる遷移の一覧
    pub async fn get_transitions(&self, issue_key: &str, expand_fields: bool) -> Result<Vec<Transition>> {
        let key = validate_issue_key(issue_key)?;
        let mut request = ApiRequest::get(format!("/rest/api/2/issue/{}/transitions", key));
        if expand_fields {
            request = request.query("expand", "transitions.fields");
        }
        let response: TransitionsResponse = self.get(request).await?;
        Ok(response.transitions)
    }

    /// 名前で遷移を探す（大文字小文字は無視）
    pub async fn transition_by_name(&self, issue_key: &str, name: &str) -> Result<Transition> {
        let transitions = self.get_transitions(issue_key, true).await?;
        let wanted = name.trim();
        transitions
            .into_iter()
            .find(|t| t.name.trim().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::TransitionNotAvailable {
                key: issue_key.trim().to_string(),
                name: wanted.to_string(),
            })
    }

    /// 遷移IDを指定して実行
    pub async fn do_transition(
        &self,
        issue_key: &str,
        transition_id: &str,
        payload: Option<&IssuePayload>,
    ) -> Result<()> {
        let key = validate_issue_key(issue_key)?;
        let body = payload
            .cloned()
            .unwrap_or_default()
            .transition_body(transition_id)?;
        self.execute(ApiRequest::post(format!("/rest/api/2/issue/{}/transitions", key), body))
            .await?;
        Ok(())
    }

    /// 名前を指定して遷移する
    ///
    /// 課題が既にそのステータスなら何もせず成功とする。
    pub async fn do_transition_by_name(
        &self,
        issue_key: &str,
        name: &str,
        payload: Option<&IssuePayload>,
    ) -> Result<TransitionOutcome> {
        let key = validate_issue_key(issue_key)?;
        if let Some(payload) = payload {
            payload.validate()?;
        }

        let issue = self.get_issue(key).await?;
        let current = IssueAccessor::new(&issue).status_name();
        if current.trim().eq_ignore_ascii_case(name.trim()) {
            info!(key, status = current, "issue already in requested status");
            return Ok(TransitionOutcome::AlreadyInStatus);
        }

        let transition = self.transition_by_name(key, name).await?;
        self.do_transition(key, &transition.id, payload).await?;
        info!(key, from = current, transition = %transition.name, "issue transitioned");
        Ok(TransitionOutcome::Transitioned(transition))
    }

    /// フィールド・ラベル・作業ログを更新する
    pub async fn patch_issue(&self, key_or_id: &str, payload: &IssuePayload) -> Result<()> {
        let key_or_id = validate_key_or_id(key_or_id)?;
        if payload.is_empty() {
            return Err(Error::InvalidInput("issue update is empty".to_string()));
        }
        let body = payload.edit_body()?;
        self.execute(ApiRequest::put(format!("/rest/api/3/issue/{}", key_or_id), body))
            .await?;
        Ok(())
    }
}
