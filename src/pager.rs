use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::client::JiraClient;
use crate::error::{Error, Result};
use crate::jql::{self, JqlField};
use crate::models::{Issue, SearchParams, SearchResult};

/// バックログ順位を書き込むカスタムフィールド上のキー
pub const RANK_FIELD: &str = "_rank";

const DEFAULT_PAGE_SIZE: u32 = 100;

/// 呼び出し側から渡すキャンセル・期限の指定
///
/// クローンしたトークン同士はキャンセル状態を共有する。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }
}

/// ページング設定
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub start_at: u32,
    /// 1ページあたりの要求件数（サーバー側で切り詰められることがある）
    pub max_results: u32,
    pub fields: Vec<String>,
    pub expand: Vec<String>,
    /// ページ取得回数の上限（`None` なら無制限）
    pub max_pages: Option<usize>,
    pub validate_query: Option<bool>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            start_at: 0,
            max_results: DEFAULT_PAGE_SIZE,
            fields: Vec::new(),
            expand: Vec::new(),
            max_pages: None,
            validate_query: None,
        }
    }
}

impl PageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(mut self, start_at: u32) -> Self {
        self.start_at = start_at;
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn expand(mut self, expand: Vec<String>) -> Self {
        self.expand = expand;
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn validate_query(mut self, validate: bool) -> Self {
        self.validate_query = Some(validate);
        self
    }

    fn params(&self, start_at: u32) -> SearchParams {
        let mut params = SearchParams::new()
            .start_at(start_at)
            .max_results(self.max_results);
        if !self.fields.is_empty() {
            params = params.fields(self.fields.clone());
        }
        if !self.expand.is_empty() {
            params = params.expand(self.expand.clone());
        }
        if let Some(validate) = self.validate_query {
            params = params.validate_query(validate);
        }
        params
    }
}

/// ページング結果の要約
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub pages: usize,
    pub retrieved: usize,
    /// 最後に受け取ったレスポンスの `total`
    pub total: u32,
    /// ページ上限で打ち切った場合は `true`
    pub truncated: bool,
}

#[derive(Debug, Clone)]
enum Endpoint<'a> {
    Search { jql: &'a str },
    Backlog { board_id: u64, jql: Option<&'a str> },
}

impl JiraClient {
    async fn fetch_page(&self, endpoint: &Endpoint<'_>, params: &SearchParams) -> Result<SearchResult> {
        match endpoint {
            Endpoint::Search { jql } => self.search_issues(jql, params).await,
            Endpoint::Backlog { board_id, jql } => self.backlog_issues(*board_id, *jql, params).await,
        }
    }

    /// 結果が尽きるまでページを取得し、`acc` に追記する
    ///
    /// 次の `startAt` は要求件数ではなく実際に返された件数だけ進める。
    /// キャンセル時は `Cancelled` を返すが、それまでの結果は `acc` に残る。
    async fn paginate_into(
        &self,
        endpoint: Endpoint<'_>,
        acc: &mut Vec<Issue>,
        options: &PageOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<PageReport> {
        if options.max_results == 0 {
            return Err(Error::InvalidInput("maxResults must be positive".to_string()));
        }

        let mut report = PageReport::default();
        let mut start_at = options.start_at;

        loop {
            if let Some(max_pages) = options.max_pages {
                if report.pages >= max_pages {
                    warn!(max_pages, retrieved = report.retrieved, "page limit reached");
                    report.truncated = true;
                    break;
                }
            }
            if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                return Err(Error::Cancelled {
                    retrieved: report.retrieved,
                });
            }

            let params = options.params(start_at);
            let page = match cancel.and_then(|c| c.deadline()) {
                Some(deadline) => tokio::time::timeout_at(deadline, self.fetch_page(&endpoint, &params))
                    .await
                    .map_err(|_| Error::Cancelled {
                        retrieved: report.retrieved,
                    })??,
                None => self.fetch_page(&endpoint, &params).await?,
            };

            let batch = page.issues.len();
            report.pages += 1;
            report.retrieved += batch;
            report.total = page.total;
            acc.extend(page.issues);
            debug!(start_at, batch, total = page.total, "page retrieved");

            if batch == 0 || start_at as usize + batch >= page.total as usize {
                break;
            }
            start_at += batch as u32;
        }

        Ok(report)
    }

    /// JQL検索の全ページを `acc` に追記
    pub async fn search_into(
        &self,
        jql: &str,
        acc: &mut Vec<Issue>,
        options: &PageOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<PageReport> {
        self.paginate_into(Endpoint::Search { jql }, acc, options, cancel)
            .await
    }

    /// JQL検索の全ページを取得
    pub async fn search_all(
        &self,
        jql: &str,
        options: &PageOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        self.search_into(jql, &mut issues, options, cancel).await?;
        Ok(issues)
    }

    /// ボードのバックログ全体を `acc` に追記し、順位を書き込む
    ///
    /// 順位は今回追記した課題の中での0始まりの位置。既存の要素には触れない。
    pub async fn backlog_into(
        &self,
        board_id: u64,
        jql: Option<&str>,
        acc: &mut Vec<Issue>,
        options: &PageOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<PageReport> {
        let before = acc.len();
        let result = self
            .paginate_into(Endpoint::Backlog { board_id, jql }, acc, options, cancel)
            .await;
        annotate_rank(&mut acc[before..]);
        result
    }

    pub async fn backlog_all(
        &self,
        board_id: u64,
        jql: Option<&str>,
        options: &PageOptions,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        self.backlog_into(board_id, jql, &mut issues, options, cancel)
            .await?;
        Ok(issues)
    }

    /// キーを指定して課題を1件取得
    pub async fn get_issue(&self, key: &str) -> Result<Issue> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput("issue key is empty".to_string()));
        }
        let jql = jql::values_clause(JqlField::Key.name(), &[key.to_string()], true)
            .unwrap_or_default();
        let mut issues = self.search_all(&jql, &PageOptions::default(), None).await?;
        match issues.len() {
            0 => Err(Error::NotFound(format!("issue {}", key))),
            1 => Ok(issues.remove(0)),
            count => Err(Error::Ambiguous {
                key: key.to_string(),
                count,
            }),
        }
    }
}

/// 並び順どおりに0始まりの順位を書き込む
pub fn annotate_rank(issues: &mut [Issue]) {
    for (index, issue) in issues.iter_mut().enumerate() {
        issue
            .fields
            .custom_fields
            .insert(RANK_FIELD.to_string(), serde_json::Value::from(index as u64));
    }
}

/// JQLで課題を取得する供給元
///
/// 親課題の遡及取得はこのトレイト越しに行う。
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn issues_for_jql(&self, jql: &str) -> Result<Vec<Issue>>;
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn issues_for_jql(&self, jql: &str) -> Result<Vec<Issue>> {
        self.search_all(jql, &PageOptions::default(), None).await
    }
}
