//! 親課題の系譜解決と、未取得の祖先の遡及取得

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::accessor::IssueAccessor;
use crate::error::{Error, Result};
use crate::graph::IssuesSet;
use crate::jql;
use crate::models::Issue;
use crate::pager::IssueSource;

/// `retrieve_parents` の反復上限
pub const MAX_PARENT_ITERATIONS: usize = 10;
/// `retrieve_lineage_tops` の反復上限
pub const MAX_LINEAGE_TOP_ITERATIONS: usize = 1000;

/// 遡及取得の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackFetchReport {
    /// 未取得集合を計算した回数（最後の空集合の確認を含む）
    pub iterations: usize,
    /// parents に追加した件数
    pub fetched: usize,
    /// 各反復で見つかった未取得キー
    pub trace: Vec<Vec<String>>,
    /// サーバーからも得られなかったキー
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Frontier {
    AllParents,
    LineageTops,
}

impl IssuesSet {
    /// 課題から親をたどった系譜（先頭が `key` 自身）
    ///
    /// 途中の親が見つからなければ、そこまでの系譜を持つ `LineageNotFound` を返す。
    /// 親子関係が循環している場合も同様。
    pub fn lineage(&self, key: &str) -> Result<Vec<&Issue>> {
        let start = self
            .issue_or_parent(key)
            .ok_or_else(|| Error::NotFound(format!("issue {}", key)))?;
        match self.walk(start) {
            (chain, true) => Ok(chain),
            (chain, false) => Err(Error::LineageNotFound {
                key: key.to_string(),
                chain: chain.iter().map(|i| i.key.clone()).collect(),
            }),
        }
    }

    /// 親をたどれるところまでたどる。最上位まで届いたかどうかも返す
    fn walk<'a>(&'a self, start: &'a Issue) -> (Vec<&'a Issue>, bool) {
        let mut chain = vec![start];
        let mut seen: HashSet<&str> = HashSet::from([start.key.as_str()]);
        let mut current = start;
        loop {
            let parent_key = IssueAccessor::new(current).parent_key();
            if parent_key.is_empty() {
                return (chain, true);
            }
            match self.issue_or_parent(parent_key) {
                Some(parent) if seen.insert(parent.key.as_str()) => {
                    chain.push(parent);
                    current = parent;
                }
                _ => return (chain, false),
            }
        }
    }

    /// 系譜上もっとも上位にある指定タイプの課題（大文字小文字は無視）
    pub fn highest_type(&self, key: &str, type_name: &str) -> Result<Option<&Issue>> {
        let lineage = self.lineage(key)?;
        Ok(lineage
            .into_iter()
            .rev()
            .find(|issue| IssueAccessor::new(issue).type_name().eq_ignore_ascii_case(type_name)))
    }

    /// 系譜が途切れていても、たどれた範囲で最上位の指定タイプの課題を探す
    pub fn highest_type_known(&self, key: &str, type_name: &str) -> Option<&Issue> {
        let start = self.issue_or_parent(key)?;
        self.walk(start)
            .0
            .into_iter()
            .rev()
            .find(|issue| IssueAccessor::new(issue).type_name().eq_ignore_ascii_case(type_name))
    }

    /// primary と parents のどちらにもない親キー
    pub fn keys_parents_unpopulated(&self) -> BTreeSet<String> {
        self.items
            .values()
            .chain(self.parents.values())
            .map(|issue| IssueAccessor::new(issue).parent_key())
            .filter(|parent| !parent.is_empty() && !self.key_exists(parent, true))
            .map(str::to_string)
            .collect()
    }

    /// primary の各課題の系譜をたどり、途切れた先の親キーを集める
    pub fn lineage_tops_unpopulated(&self) -> BTreeSet<String> {
        let mut tops = BTreeSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        for issue in self.items.values() {
            let mut current = issue;
            while visited.insert(current.key.as_str()) {
                let parent_key = IssueAccessor::new(current).parent_key();
                if parent_key.is_empty() {
                    break;
                }
                match self.issue_or_parent(parent_key) {
                    Some(parent) => current = parent,
                    None => {
                        tops.insert(parent_key.to_string());
                        break;
                    }
                }
            }
        }
        tops
    }

    /// 未取得の親を繰り返し取得して parents に追加する（上限10回）
    pub async fn retrieve_parents(&mut self, source: &dyn IssueSource) -> Result<BackFetchReport> {
        self.back_fetch(source, Frontier::AllParents, MAX_PARENT_ITERATIONS)
            .await
    }

    /// 系譜の途切れた先を繰り返し取得して parents に追加する（上限1000回）
    pub async fn retrieve_lineage_tops(&mut self, source: &dyn IssueSource) -> Result<BackFetchReport> {
        self.back_fetch(source, Frontier::LineageTops, MAX_LINEAGE_TOP_ITERATIONS)
            .await
    }

    fn frontier(&self, frontier: Frontier) -> BTreeSet<String> {
        match frontier {
            Frontier::AllParents => self.keys_parents_unpopulated(),
            Frontier::LineageTops => self.lineage_tops_unpopulated(),
        }
    }

    async fn back_fetch(
        &mut self,
        source: &dyn IssueSource,
        frontier: Frontier,
        max_iterations: usize,
    ) -> Result<BackFetchReport> {
        let mut report = BackFetchReport::default();
        let mut previous: Option<Vec<String>> = None;
        loop {
            let unpopulated: Vec<String> = self.frontier(frontier).into_iter().collect();
            report.iterations += 1;
            report.trace.push(unpopulated.clone());
            if unpopulated.is_empty() {
                info!(iterations = report.iterations, fetched = report.fetched, "lineage closed");
                return Ok(report);
            }
            // 前回と同じ未取得集合なら、取得しても進まない
            if previous.as_ref() == Some(&unpopulated) {
                warn!(keys = ?unpopulated, "parents did not resolve under their own keys");
                report.unresolved = unpopulated;
                return Ok(report);
            }
            if report.iterations > max_iterations {
                return Err(Error::RecursionExhausted {
                    iterations: max_iterations,
                });
            }

            debug!(iteration = report.iterations, missing = unpopulated.len(), "fetching parents");
            let mut added = 0;
            for query in jql::keys_to_jqls(&unpopulated, jql::DEFAULT_MAX_RESULTS) {
                let fetched = source.issues_for_jql(&query).await?;
                added += self.add_parents(fetched)?;
            }
            report.fetched += added;

            if added == 0 {
                warn!(keys = ?unpopulated, "parents not returned by the server");
                report.unresolved = unpopulated;
                return Ok(report);
            }
            previous = Some(unpopulated);
        }
    }
}
