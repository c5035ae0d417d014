//! 課題グラフ（IssuesSet）
//!
//! 取得対象の課題（primary）と、その祖先のうち対象外のもの（parents）の
//! 2つのマップを持つ。どちらもキー順に並ぶ。

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::accessor::{IssueAccessor, status_is_done};
use crate::config::GraphConfig;
use crate::customfield;
use crate::error::{Error, Result};
use crate::jql;
use crate::models::{EpicRef, Issue};
use crate::pager::IssueSource;

pub type IssuesMap = BTreeMap<String, Issue>;

#[derive(Debug, Clone, Default)]
pub struct IssuesSet {
    pub(crate) config: Arc<GraphConfig>,
    pub(crate) items: IssuesMap,
    // フィルタ結果のビューと共有する。lifetime ≥ longest holder。
    // 書き込みは Arc::make_mut 経由のみで、他の保持者からは見えない。
    pub(crate) parents: Arc<IssuesMap>,
}

impl PartialEq for IssuesSet {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config && self.items == other.items && self.parents == other.parents
    }
}

impl IssuesSet {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config: Arc::new(config),
            items: IssuesMap::new(),
            parents: Arc::new(IssuesMap::new()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// 同じ設定・親マップを共有する空の集合
    fn view(&self, items: IssuesMap) -> Self {
        Self {
            config: Arc::clone(&self.config),
            items,
            parents: Arc::clone(&self.parents),
        }
    }

    /// 課題を追加する（同じキーは後勝ち）
    ///
    /// キーが空の課題が1件でもあれば何も追加せず `InvalidInput` を返す。
    /// parents 側に同じキーがあっても取り除かない（[`IssuesSet::reconcile_parents`] を参照）。
    pub fn add<I>(&mut self, issues: I) -> Result<()>
    where
        I: IntoIterator<Item = Issue>,
    {
        let issues = validate_keys(issues)?;
        for issue in issues {
            self.items.insert(issue.key.clone(), issue);
        }
        Ok(())
    }

    /// 祖先の課題を parents に追加する。primary にあるキーは無視する
    ///
    /// parents に既にあるキーは上書きするが、返す件数には含めない（新規キーの数）。
    pub fn add_parents<I>(&mut self, issues: I) -> Result<usize>
    where
        I: IntoIterator<Item = Issue>,
    {
        let issues: Vec<Issue> = validate_keys(issues)?
            .into_iter()
            .filter(|issue| !self.items.contains_key(&issue.key))
            .collect();
        if issues.is_empty() {
            return Ok(0);
        }
        let parents = Arc::make_mut(&mut self.parents);
        let mut added = 0;
        for issue in issues {
            if parents.insert(issue.key.clone(), issue).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// primary に存在するキーを parents から取り除く
    pub fn reconcile_parents(&mut self) -> usize {
        let duplicates: Vec<String> = self
            .parents
            .keys()
            .filter(|k| self.items.contains_key(*k))
            .cloned()
            .collect();
        if duplicates.is_empty() {
            return 0;
        }
        let parents = Arc::make_mut(&mut self.parents);
        for key in &duplicates {
            parents.remove(key);
        }
        debug!(removed = duplicates.len(), "reconciled parents");
        duplicates.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn parents_len(&self) -> usize {
        self.parents.len()
    }

    pub fn key_exists(&self, key: &str, include_parents: bool) -> bool {
        self.items.contains_key(key) || (include_parents && self.parents.contains_key(key))
    }

    pub fn issue(&self, key: &str) -> Result<&Issue> {
        self.items
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("issue {}", key)))
    }

    /// primary、次に parents を探す
    pub fn issue_or_parent(&self, key: &str) -> Option<&Issue> {
        self.items.get(key).or_else(|| self.parents.get(key))
    }

    /// キー（昇順）
    pub fn keys(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    /// primary の課題（キー順）
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.items.values()
    }

    pub fn parents(&self) -> &IssuesMap {
        &self.parents
    }

    pub fn accessors(&self) -> impl Iterator<Item = IssueAccessor<'_>> {
        self.items.values().map(IssueAccessor::new)
    }

    /// 条件に合う課題だけを持つ新しい集合（parents は共有）
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(IssueAccessor<'_>) -> bool,
    {
        let items = self
            .items
            .iter()
            .filter(|(_, issue)| predicate(IssueAccessor::new(issue)))
            .map(|(k, issue)| (k.clone(), issue.clone()))
            .collect();
        self.view(items)
    }

    /// ステータスで絞り込む
    ///
    /// `include` が空なら全ステータスを対象とし、その後 `exclude` を除く。
    pub fn filter_by_status<S: AsRef<str>>(&self, include: &[S], exclude: &[S]) -> Self {
        let include = name_set(include);
        let exclude = name_set(exclude);
        self.filter(|a| {
            let status = a.status_name().to_lowercase();
            (include.is_empty() || include.contains(&status)) && !exclude.contains(&status)
        })
    }

    /// 課題タイプで絞り込む（空なら全件）
    pub fn filter_by_type<S: AsRef<str>>(&self, include: &[S]) -> Self {
        let include = name_set(include);
        self.filter(|a| include.is_empty() || include.contains(&a.type_name().to_lowercase()))
    }

    /// 各課題を、系譜上もっとも上位にある指定タイプの祖先に置き換えた集合
    ///
    /// 該当する祖先がない課題は含まれない。祖先が parents 側にあれば primary に昇格する。
    pub fn issues_set_highest_type(&self, type_name: &str) -> Result<Self> {
        let mut items = IssuesMap::new();
        for key in self.items.keys() {
            if let Some(top) = self.highest_type(key, type_name)? {
                items.insert(top.key.clone(), top.clone());
            }
        }
        Ok(self.view(items))
    }

    /// 出現する課題タイプ名（昇順、重複なし）
    pub fn types(&self, include_base: bool, include_parents: bool) -> Vec<String> {
        let mut types = BTreeSet::new();
        if include_base {
            types.extend(self.accessors().map(|a| a.type_name().to_string()));
        }
        if include_parents {
            types.extend(
                self.parents
                    .values()
                    .map(|issue| IssueAccessor::new(issue).type_name().to_string()),
            );
        }
        types.remove("");
        types.into_iter().collect()
    }

    /// 指定タイプの課題キー（昇順）
    pub fn keys_for_types<S: AsRef<str>>(&self, types: &[S], include_parents: bool) -> Vec<String> {
        let wanted = name_set(types);
        let matches = |issue: &Issue| wanted.contains(&IssueAccessor::new(issue).type_name().to_lowercase());

        let mut keys: BTreeSet<String> = self
            .items
            .values()
            .filter(|issue| matches(*issue))
            .map(|issue| issue.key.clone())
            .collect();
        if include_parents {
            keys.extend(
                self.parents
                    .values()
                    .filter(|issue| matches(*issue))
                    .map(|issue| issue.key.clone()),
            );
        }
        keys.into_iter().collect()
    }

    /// エピックリンクのカスタムフィールドからエピック情報を補完する
    ///
    /// エピック情報がないかキーが空の課題だけを対象にする。補完した件数を返す。
    pub fn inflate_epics_from_custom_field(&mut self, epic_link_field: &str) -> Result<usize> {
        let field = customfield::canonicalize(epic_link_field)?;
        let mut inflated = 0;
        for issue in self.items.values_mut() {
            if issue
                .fields
                .epic
                .as_ref()
                .map(|e| !e.key.trim().is_empty())
                .unwrap_or(false)
            {
                continue;
            }
            let epic_key = IssueAccessor::new(issue).custom_string(&field);
            if epic_key.is_empty() {
                continue;
            }
            match issue.fields.epic.as_mut() {
                Some(epic) => epic.key = epic_key,
                None => issue.fields.epic = Some(EpicRef::with_key(epic_key)),
            }
            inflated += 1;
        }
        debug!(field = %field, inflated, "inflated epics from custom field");
        Ok(inflated)
    }

    /// 名前が欠けているエピック情報を、エピック課題を参照して埋める
    ///
    /// 手元にないエピックは `source` から取得して parents に追加する。
    /// 名前を埋めた件数を返す。
    pub async fn inflate_epics_with(&mut self, source: &dyn IssueSource) -> Result<usize> {
        let wanted: BTreeSet<String> = self
            .items
            .values()
            .filter_map(|issue| issue.fields.epic.as_ref())
            .filter(|epic| !epic.key.is_empty() && epic.name.is_empty())
            .map(|epic| epic.key.clone())
            .collect();

        let missing: Vec<String> = wanted
            .iter()
            .filter(|k| !self.key_exists(k, true))
            .cloned()
            .collect();
        if !missing.is_empty() {
            info!(count = missing.len(), "fetching epics");
            for query in jql::keys_to_jqls(&missing, jql::DEFAULT_MAX_RESULTS) {
                let fetched = source.issues_for_jql(&query).await?;
                self.add_parents(fetched)?;
            }
        }

        let epics: BTreeMap<String, EpicRef> = wanted
            .iter()
            .filter_map(|key| self.issue_or_parent(key))
            .map(|issue| (issue.key.clone(), epic_ref_from(issue)))
            .collect();

        let mut named = 0;
        for issue in self.items.values_mut() {
            let Some(epic) = issue.fields.epic.as_mut() else {
                continue;
            };
            if !epic.name.is_empty() {
                continue;
            }
            if let Some(full) = epics.get(&epic.key) {
                *epic = full.clone();
                named += 1;
            }
        }
        Ok(named)
    }

    /// スナップショットをJSONで書き出す（`.gz` なら gzip 圧縮）
    pub async fn write_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let snapshot = SnapshotRef {
            config: &self.config,
            issues_map: &self.items,
            parents: ParentsRef {
                issues_map: &self.parents,
            },
        };
        let json_data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| Error::SerializationError(format!("JSON serialization failed: {}", e)))?;

        let final_data = if is_gzip(path) {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json_data)?;
            encoder.finish()?
        } else {
            json_data
        };

        let mut file = File::create(path).await?;
        file.write_all(&final_data).await?;
        file.sync_all().await?;
        info!(path = %path.display(), issues = self.items.len(), parents = self.parents.len(), "snapshot written");
        Ok(())
    }

    /// スナップショットを読み込む
    pub async fn read_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let mut raw_data = Vec::new();
        file.read_to_end(&mut raw_data).await?;

        let json_data = if is_gzip(path) {
            let mut decoder = GzDecoder::new(&raw_data[..]);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            raw_data
        };

        let snapshot: Snapshot = serde_json::from_slice(&json_data)
            .map_err(|e| Error::SerializationError(format!("JSON deserialization failed: {}", e)))?;
        for (key, issue) in snapshot.issues_map.iter().chain(snapshot.parents.issues_map.iter()) {
            if key.is_empty() || *key != issue.key {
                return Err(Error::SerializationError(format!(
                    "snapshot entry '{}' holds issue '{}'",
                    key, issue.key
                )));
            }
        }

        Ok(Self {
            config: Arc::new(snapshot.config),
            items: snapshot.issues_map,
            parents: Arc::new(snapshot.parents.issues_map),
        })
    }
}

fn validate_keys<I>(issues: I) -> Result<Vec<Issue>>
where
    I: IntoIterator<Item = Issue>,
{
    let issues: Vec<Issue> = issues.into_iter().collect();
    if let Some(position) = issues.iter().position(|issue| issue.key.trim().is_empty()) {
        return Err(Error::InvalidInput(format!(
            "issue at position {} has an empty key",
            position
        )));
    }
    Ok(issues)
}

fn name_set<S: AsRef<str>>(names: &[S]) -> HashSet<String> {
    names
        .iter()
        .map(|n| n.as_ref().trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect()
}

fn epic_ref_from(issue: &Issue) -> EpicRef {
    let accessor = IssueAccessor::new(issue);
    EpicRef {
        id: issue.id.parse().ok(),
        key: issue.key.clone(),
        name: accessor.summary().to_string(),
        summary: accessor.summary().to_string(),
        done: Some(status_is_done(accessor.status_name())),
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(rename = "Config")]
    config: &'a GraphConfig,
    #[serde(rename = "IssuesMap")]
    issues_map: &'a IssuesMap,
    #[serde(rename = "Parents")]
    parents: ParentsRef<'a>,
}

#[derive(Serialize)]
struct ParentsRef<'a> {
    #[serde(rename = "IssuesMap")]
    issues_map: &'a IssuesMap,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(rename = "Config", default)]
    config: GraphConfig,
    #[serde(rename = "IssuesMap", default)]
    issues_map: IssuesMap,
    #[serde(rename = "Parents", default)]
    parents: ParentsSnapshot,
}

#[derive(Deserialize, Default)]
struct ParentsSnapshot {
    #[serde(rename = "IssuesMap", default)]
    issues_map: IssuesMap,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{IssueRef, IssueType, Status};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    pub(crate) fn issue(key: &str, issue_type: &str, status: &str, parent: Option<&str>) -> Issue {
        let mut issue = Issue {
            id: key.rsplit('-').next().unwrap_or("0").to_string(),
            key: key.to_string(),
            ..Issue::default()
        };
        issue.fields.summary = format!("summary of {}", key);
        issue.fields.issue_type = Some(IssueType::named(issue_type));
        issue.fields.status = Some(Status::named(status));
        issue.fields.parent = parent.map(|p| IssueRef {
            key: p.to_string(),
            ..IssueRef::default()
        });
        issue
    }

    struct RecordingSource {
        issues: Vec<Issue>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IssueSource for RecordingSource {
        async fn issues_for_jql(&self, jql: &str) -> Result<Vec<Issue>> {
            self.queries.lock().unwrap().push(jql.to_string());
            Ok(self
                .issues
                .iter()
                .filter(|i| jql.contains(&format!("'{}'", i.key)))
                .cloned()
                .collect())
        }
    }

    fn sample_set() -> IssuesSet {
        let mut set = IssuesSet::new(GraphConfig::default());
        set.add(vec![
            issue("ABC-3", "Story", "Done", Some("ABC-1")),
            issue("ABC-2", "Bug", "Open", Some("ABC-1")),
            issue("ABC-4", "Story", "In Progress", None),
        ])
        .unwrap();
        set.add_parents(vec![issue("ABC-1", "Epic", "Open", None)]).unwrap();
        set
    }

    #[test]
    fn test_add_rejects_empty_key() {
        // Given
        let mut set = IssuesSet::new(GraphConfig::default());

        // When: 2件目のキーが空
        let result = set.add(vec![issue("A-1", "Story", "Open", None), issue(" ", "Story", "Open", None)]);

        // Then: 何も追加されない
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(set.is_empty());
    }

    #[test]
    fn test_add_last_write_wins_and_keys_sorted() {
        let mut set = IssuesSet::new(GraphConfig::default());
        set.add(vec![
            issue("B-2", "Story", "Open", None),
            issue("A-1", "Story", "Open", None),
            issue("B-2", "Story", "Done", None),
        ])
        .unwrap();

        assert_eq!(set.keys(), vec!["A-1", "B-2"]);
        assert_eq!(IssueAccessor::new(set.issue("B-2").unwrap()).status_name(), "Done");
        assert!(matches!(set.issue("C-3"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_parents_lookup_and_reconcile() {
        let mut set = sample_set();

        assert!(set.key_exists("ABC-1", true));
        assert!(!set.key_exists("ABC-1", false));
        assert_eq!(set.issue_or_parent("ABC-1").unwrap().key, "ABC-1");
        assert!(set.issue_or_parent("ABC-9").is_none());

        // primary に既にあるキーは parents に入らない
        assert_eq!(set.add_parents(vec![issue("ABC-2", "Bug", "Open", None)]).unwrap(), 0);

        // 既存の親の上書きは新規件数に数えない
        assert_eq!(set.add_parents(vec![issue("ABC-1", "Epic", "Done", None)]).unwrap(), 0);
        assert_eq!(set.issue_or_parent("ABC-1").unwrap().fields.status.as_ref().unwrap().name, "Done");

        // primary へ追加しても parents 側は残り、reconcile で消える
        set.add(vec![issue("ABC-1", "Epic", "Open", None)]).unwrap();
        assert_eq!(set.parents_len(), 1);
        assert_eq!(set.reconcile_parents(), 1);
        assert_eq!(set.parents_len(), 0);
    }

    #[test]
    fn test_filter_views_share_parents() {
        let set = sample_set();

        let done = set.filter_by_status(&["done"], &[]);
        assert_eq!(done.keys(), vec!["ABC-3"]);
        assert!(Arc::ptr_eq(&done.parents, &set.parents));
        assert_eq!(done.issue_or_parent("ABC-1").unwrap().key, "ABC-1");

        let not_done = set.filter_by_status::<&str>(&[], &["Done"]);
        assert_eq!(not_done.keys(), vec!["ABC-2", "ABC-4"]);

        let stories = set.filter_by_type(&["Story"]);
        assert_eq!(stories.keys(), vec!["ABC-3", "ABC-4"]);
    }

    #[test]
    fn test_view_writes_do_not_leak_into_source() {
        let set = sample_set();
        let mut view = set.filter_by_type(&["Story"]);

        view.add_parents(vec![issue("ABC-0", "Initiative", "Open", None)]).unwrap();

        assert!(view.key_exists("ABC-0", true));
        assert!(!set.key_exists("ABC-0", true));
    }

    #[test]
    fn test_types_and_keys_for_types() {
        let set = sample_set();

        assert_eq!(set.types(true, false), vec!["Bug", "Story"]);
        assert_eq!(set.types(true, true), vec!["Bug", "Epic", "Story"]);
        assert_eq!(set.keys_for_types(&["story"], false), vec!["ABC-3", "ABC-4"]);
        assert_eq!(set.keys_for_types(&["Epic"], true), vec!["ABC-1"]);
    }

    #[test]
    fn test_highest_type_projection() {
        let set = sample_set();

        let epics = set.issues_set_highest_type("Epic").unwrap();

        assert_eq!(epics.keys(), vec!["ABC-1"]);
    }

    #[test]
    fn test_inflate_epics_from_custom_field() {
        let mut set = IssuesSet::new(GraphConfig::default());
        let mut linked = issue("ABC-5", "Story", "Open", None);
        linked
            .fields
            .custom_fields
            .insert("customfield_10014".to_string(), json!(" ABC-1 "));
        let mut already = issue("ABC-6", "Story", "Open", None);
        already.fields.epic = Some(EpicRef::with_key("ABC-9"));
        already
            .fields
            .custom_fields
            .insert("customfield_10014".to_string(), json!("ABC-1"));
        set.add(vec![linked, already, issue("ABC-7", "Story", "Open", None)]).unwrap();

        let inflated = set.inflate_epics_from_custom_field("cf[10014]").unwrap();

        assert_eq!(inflated, 1);
        assert_eq!(IssueAccessor::new(set.issue("ABC-5").unwrap()).epic_key(), "ABC-1");
        assert_eq!(IssueAccessor::new(set.issue("ABC-6").unwrap()).epic_key(), "ABC-9");
        assert!(set.issue("ABC-7").unwrap().fields.epic.is_none());
        assert!(matches!(
            set.inflate_epics_from_custom_field("epic link"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_inflate_epics_with_source() {
        // Given: エピックキーだけを持つ課題
        let mut set = IssuesSet::new(GraphConfig::default());
        let mut story = issue("ABC-5", "Story", "Open", None);
        story.fields.epic = Some(EpicRef::with_key("ABC-1"));
        set.add(vec![story]).unwrap();
        let source = RecordingSource {
            issues: vec![issue("ABC-1", "Epic", "Done", None)],
            queries: Mutex::new(Vec::new()),
        };

        // When
        let named = set.inflate_epics_with(&source).await.unwrap();

        // Then: 取得したエピックは parents に入り、名前が埋まる
        assert_eq!(named, 1);
        assert!(set.key_exists("ABC-1", true));
        let epic = set.issue("ABC-5").unwrap().fields.epic.clone().unwrap();
        assert_eq!(epic.name, "summary of ABC-1");
        assert_eq!(epic.done, Some(true));
        assert_eq!(source.queries.lock().unwrap().as_slice(), ["key = 'ABC-1'"]);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let set = sample_set();

        for name in ["snapshot.json", "snapshot.json.gz"] {
            let path = dir.path().join(name);
            set.write_snapshot(&path).await.unwrap();
            let loaded = IssuesSet::read_snapshot(&path).await.unwrap();
            assert_eq!(loaded, set);
        }

        // 非圧縮ファイルは2スペースインデントで、トップレベルの名前が固定
        let text = std::fs::read_to_string(dir.path().join("snapshot.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["Config"].is_object());
        assert!(value["IssuesMap"]["ABC-2"].is_object());
        assert!(value["Parents"]["IssuesMap"]["ABC-1"].is_object());
        assert!(text.contains("\n  \"Config\""));
    }

    #[tokio::test]
    async fn test_snapshot_rejects_mismatched_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"IssuesMap": {"A-1": {"key": "A-2"}}}"#,
        )
        .unwrap();

        let result = IssuesSet::read_snapshot(&path).await;

        assert!(matches!(result, Err(Error::SerializationError(_))));
    }
}
