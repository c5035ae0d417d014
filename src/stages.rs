//! ワークフローのメタステージ定義と、ステータス名からメタステージへの対応表

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{Error, Result};

pub const STAGE_PLANNING: &str = "Planning";
pub const STAGE_DESIGN: &str = "Design";
pub const STAGE_DEVELOPMENT: &str = "Development";
pub const STAGE_TESTING: &str = "Testing";
pub const STAGE_DEPLOYMENT: &str = "Deployment";
pub const STAGE_REVIEW: &str = "Review";
pub const STAGE_DONE: &str = "Done";

pub const DEFAULT_READY_PREFIX: &str = "Ready for ";
pub const DEFAULT_IN_PREFIX: &str = "In ";

/// ステージの並びとメタステージ名の組み立て方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    /// `Done` を除くステージ（この順で並ぶ）
    pub stages: Vec<String>,
    pub ready_prefix: String,
    pub in_prefix: String,
    /// 終端ステージ名
    pub done: String,
    /// 組み立てた既定名 → 上書き後の名前
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            stages: [
                STAGE_PLANNING,
                STAGE_DESIGN,
                STAGE_DEVELOPMENT,
                STAGE_TESTING,
                STAGE_DEPLOYMENT,
                STAGE_REVIEW,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ready_prefix: DEFAULT_READY_PREFIX.to_string(),
            in_prefix: DEFAULT_IN_PREFIX.to_string(),
            done: STAGE_DONE.to_string(),
            overrides: HashMap::new(),
        }
    }
}

impl StageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefixes(mut self, ready_prefix: impl Into<String>, in_prefix: impl Into<String>) -> Self {
        self.ready_prefix = ready_prefix.into();
        self.in_prefix = in_prefix.into();
        self
    }

    /// 既定のメタステージ名を別名に置き換える
    pub fn rename(mut self, default_name: impl Into<String>, name: impl Into<String>) -> Self {
        self.overrides.insert(default_name.into(), name.into());
        self
    }

    fn resolve(&self, default_name: String) -> String {
        self.overrides
            .get(&default_name)
            .cloned()
            .unwrap_or(default_name)
    }

    pub fn ready_for(&self, stage: &str) -> String {
        self.resolve(format!("{}{}", self.ready_prefix, stage))
    }

    pub fn in_stage(&self, stage: &str) -> String {
        self.resolve(format!("{}{}", self.in_prefix, stage))
    }

    /// 全メタステージを順序どおりに返す（重複は先勝ちで除去、`Done` が最後）
    pub fn meta_stages(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let names = self
            .stages
            .iter()
            .flat_map(|stage| [self.ready_for(stage), self.in_stage(stage)])
            .chain(std::iter::once(self.resolve(self.done.clone())));
        for name in names {
            if seen.insert(name.clone()) {
                ordered.push(name);
            }
        }
        ordered
    }

    /// メタステージの並び順（0始まり）
    pub fn order_index(&self, meta_stage: &str) -> Option<usize> {
        self.meta_stages().iter().position(|m| m == meta_stage)
    }

    pub fn contains(&self, meta_stage: &str) -> bool {
        self.order_index(meta_stage).is_some()
    }
}

/// ステータス名 → メタステージ名の対応表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusConfig {
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub status_to_meta_stage: HashMap<String, String>,
}

impl StatusConfig {
    pub fn new(stages: StageConfig) -> Self {
        Self {
            stages,
            status_to_meta_stage: HashMap::new(),
        }
    }

    /// 対応表を一括指定して作成。値はすべてメタステージでなければならない
    pub fn with_map(stages: StageConfig, map: HashMap<String, String>) -> Result<Self> {
        let config = Self {
            stages,
            status_to_meta_stage: map,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn map_status(mut self, status: impl Into<String>, meta_stage: impl Into<String>) -> Result<Self> {
        let meta_stage = meta_stage.into();
        if !self.stages.contains(&meta_stage) {
            return Err(Error::InvalidInput(format!(
                "unknown meta stage '{}'",
                meta_stage
            )));
        }
        self.status_to_meta_stage.insert(status.into(), meta_stage);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let known: HashSet<String> = self.stages.meta_stages().into_iter().collect();
        let mut unknown: Vec<&String> = self
            .status_to_meta_stage
            .values()
            .filter(|m| !known.contains(*m))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        unknown.dedup();
        Err(Error::InvalidInput(format!(
            "status map refers to unknown meta stages: {:?}",
            unknown
        )))
    }

    /// JSONファイルから読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// 未登録のステータスは空文字列
    ///
    /// ステータス名は大文字小文字を区別しない。完全一致があればそれを優先する。
    pub fn meta_stage(&self, status: &str) -> &str {
        self.status_to_meta_stage
            .get(status)
            .or_else(|| {
                self.status_to_meta_stage
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(status))
                    .map(|(_, meta)| meta)
            })
            .map(String::as_str)
            .unwrap_or("")
    }

    /// ステータスのメタステージ順位（未登録は `None`）
    pub fn meta_stage_index(&self, status: &str) -> Option<usize> {
        match self.meta_stage(status) {
            "" => None,
            meta => self.stages.order_index(meta),
        }
    }

    /// 指定メタステージに対応するステータス（名前順）
    pub fn statuses_for(&self, meta_stage: &str) -> Vec<String> {
        let mut statuses: Vec<String> = self
            .status_to_meta_stage
            .iter()
            .filter(|(_, m)| m.as_str() == meta_stage)
            .map(|(s, _)| s.clone())
            .collect();
        statuses.sort();
        statuses
    }
}
