//! 件数・ヒストグラム・時系列・ピボットなどの集計

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::accessor::{IssueAccessor, IssueField};
use crate::error::{Error, Result};
use crate::graph::IssuesSet;
use crate::models::Issue;
use crate::table::{Cell, Column, Format, Table};
use crate::time_util;

pub type Counts = BTreeMap<String, usize>;

/// 工数の有無による件数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeCounts {
    #[serde(rename = "TimeEstimateLTEZ")]
    pub time_estimate_ltez: usize,
    #[serde(rename = "TimeEstimateGTZ")]
    pub time_estimate_gtz: usize,
    #[serde(rename = "TimeOriginalEstimateLTEZ")]
    pub time_original_estimate_ltez: usize,
    #[serde(rename = "TimeOriginalEstimateGTZ")]
    pub time_original_estimate_gtz: usize,
}

/// メタステージ別の件数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaStageCounts {
    /// メタステージの並び順どおり（0件のステージも含む）
    pub counts: Vec<(String, usize)>,
    /// 対応表にないステータスの件数
    pub unknown: usize,
    /// 対象になった課題数
    pub total: usize,
}

impl MetaStageCounts {
    pub fn get(&self, meta_stage: &str) -> usize {
        self.counts
            .iter()
            .find(|(m, _)| m == meta_stage)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// プロジェクト・タイプ・ステータスの3軸キー
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectTypeStatus {
    pub project: String,
    pub issue_type: String,
    pub status: String,
}

/// 工数の合計（秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStats {
    pub issues: usize,
    pub time_spent: i64,
    pub time_estimate: i64,
    pub time_original_estimate: i64,
    pub aggregate_time_spent: i64,
    pub aggregate_time_estimate: i64,
    pub aggregate_time_original_estimate: i64,
    pub time_remaining: i64,
    pub time_remaining_original: i64,
}

impl TimeStats {
    pub fn add(&mut self, accessor: &IssueAccessor<'_>) {
        let (remaining, remaining_original) = accessor.time_remaining();
        self.issues += 1;
        self.time_spent += accessor.time_spent();
        self.time_estimate += accessor.time_estimate();
        self.time_original_estimate += accessor.time_original_estimate();
        self.aggregate_time_spent += accessor.aggregate_time_spent();
        self.aggregate_time_estimate += accessor.aggregate_time_estimate();
        self.aggregate_time_original_estimate += accessor.aggregate_time_original_estimate();
        self.time_remaining += remaining;
        self.time_remaining_original += remaining_original;
    }
}

/// 作成月の時系列のオプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeriesOptions {
    /// 累積値にする
    pub cumulative: bool,
    /// 課題のない月も0件で埋める
    pub inflate: bool,
    /// 最後の月（集計途中のことが多い）を落とす
    pub trim_last: bool,
    /// 指定した月だけを残す（空なら全月）
    pub months: Vec<NaiveDate>,
}

impl TimeSeriesOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cumulative(mut self, cumulative: bool) -> Self {
        self.cumulative = cumulative;
        self
    }

    pub fn inflate(mut self, inflate: bool) -> Self {
        self.inflate = inflate;
        self
    }

    pub fn trim_last(mut self, trim_last: bool) -> Self {
        self.trim_last = trim_last;
        self
    }

    pub fn months(mut self, months: Vec<NaiveDate>) -> Self {
        self.months = months;
        self
    }
}

/// 作成月 × キーの件数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries {
    pub months: Vec<NaiveDate>,
    /// キー → 月ごとの件数（`months` と同じ長さ）
    pub series: BTreeMap<String, Vec<usize>>,
}

impl TimeSeries {
    pub fn to_table(&self, name: &str) -> Result<Table> {
        let mut columns = vec![Column::new("month", "Month", Format::Date)];
        columns.extend(
            self.series
                .keys()
                .map(|k| Column::new(k.clone(), k.clone(), Format::Int)),
        );
        let mut table = Table::new(name, columns);
        for (index, month) in self.months.iter().enumerate() {
            let mut row = vec![Cell::Text(month.format("%Y-%m").to_string())];
            row.extend(self.series.values().map(|counts| Cell::Int(counts[index] as i64)));
            table.push_row(row)?;
        }
        Ok(table)
    }
}

fn count_by<'a, F>(issues: impl Iterator<Item = &'a Issue>, key_fn: F) -> Counts
where
    F: Fn(&IssueAccessor<'_>) -> String,
{
    let mut counts = Counts::new();
    for issue in issues {
        *counts.entry(key_fn(&IssueAccessor::new(issue))).or_insert(0) += 1;
    }
    counts
}

impl IssuesSet {
    pub fn counts_by_status(&self) -> Counts {
        count_by(self.items.values(), |a| a.status_name().to_string())
    }

    pub fn counts_by_project(&self) -> Counts {
        count_by(self.items.values(), |a| a.project_key().to_string())
    }

    /// タイプ別件数。`include_leaves` は primary、`include_parents` は parents を対象にする
    pub fn counts_by_type(&self, include_leaves: bool, include_parents: bool) -> Counts {
        let leaves = self.items.values().filter(|_| include_leaves);
        let parents = self.parents.values().filter(|_| include_parents);
        count_by(leaves.chain(parents), |a| a.type_name().to_string())
    }

    pub fn counts_by_time(&self) -> TimeCounts {
        let mut counts = TimeCounts::default();
        for a in self.accessors() {
            if a.time_estimate() > 0 {
                counts.time_estimate_gtz += 1;
            } else {
                counts.time_estimate_ltez += 1;
            }
            if a.time_original_estimate() > 0 {
                counts.time_original_estimate_gtz += 1;
            } else {
                counts.time_original_estimate_ltez += 1;
            }
        }
        counts
    }

    /// タイプで絞り込んだ件数（空なら全件）
    pub fn count_with_type_filter<S: AsRef<str>>(&self, types: &[S]) -> usize {
        let wanted = type_filter(types);
        self.accessors()
            .filter(|a| type_matches(&wanted, a))
            .count()
    }

    /// メタステージ別の件数
    ///
    /// ステータス対応表が設定されていなければ空の結果を返す。
    /// 件数の合計が対象課題数と一致しなければ `Bug`。
    pub fn counts_by_meta_stage<S: AsRef<str>>(&self, types: &[S]) -> Result<MetaStageCounts> {
        let Some(status_config) = self.config.status_config.as_ref() else {
            return Ok(MetaStageCounts::default());
        };
        let wanted = type_filter(types);

        let mut result = MetaStageCounts {
            counts: status_config
                .stages
                .meta_stages()
                .into_iter()
                .map(|m| (m, 0))
                .collect(),
            ..MetaStageCounts::default()
        };
        let positions: HashMap<String, usize> = result
            .counts
            .iter()
            .enumerate()
            .map(|(i, (m, _))| (m.clone(), i))
            .collect();

        for a in self.accessors().filter(|a| type_matches(&wanted, a)) {
            result.total += 1;
            match positions.get(status_config.meta_stage(a.status_name())) {
                Some(&index) => result.counts[index].1 += 1,
                None => result.unknown += 1,
            }
        }

        let sum: usize = result.counts.iter().map(|(_, n)| n).sum::<usize>() + result.unknown;
        let expected = self.count_with_type_filter(types);
        if sum != expected || result.total != expected {
            return Err(Error::Bug(format!(
                "meta stage buckets sum to {} but {} issues match the type filter",
                sum, expected
            )));
        }
        Ok(result)
    }

    pub fn histogram_project_type_status(&self) -> HashMap<ProjectTypeStatus, usize> {
        let mut histogram = HashMap::new();
        for a in self.accessors() {
            let key = ProjectTypeStatus {
                project: a.project_key().to_string(),
                issue_type: a.type_name().to_string(),
                status: a.status_name().to_string(),
            };
            *histogram.entry(key).or_insert(0) += 1;
        }
        histogram
    }

    /// プロジェクトごとに、行 = タイプ・列 = ステータスの表にしたヒストグラム
    ///
    /// ステータス列は、対応表があればメタステージ順、残りは名前順。
    pub fn histogram_pivot_by_project(&self) -> Result<BTreeMap<String, Table>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, Counts>> = BTreeMap::new();
        for (key, count) in self.histogram_project_type_status() {
            *grouped
                .entry(key.project)
                .or_default()
                .entry(key.issue_type)
                .or_default()
                .entry(key.status)
                .or_insert(0) += count;
        }

        let mut tables = BTreeMap::new();
        for (project, by_type) in grouped {
            let statuses: BTreeSet<&str> = by_type
                .values()
                .flat_map(|c| c.keys().map(String::as_str))
                .collect();
            let statuses = self.order_statuses(statuses);

            let mut columns = vec![Column::new("type", "Type", Format::String)];
            columns.extend(statuses.iter().map(|s| Column::new(s.clone(), s.clone(), Format::Int)));
            columns.push(Column::new("total", "Total", Format::Int));
            let mut table = Table::new(project.clone(), columns);

            for (issue_type, counts) in &by_type {
                let mut row = vec![Cell::text(issue_type.clone())];
                row.extend(
                    statuses
                        .iter()
                        .map(|s| Cell::Int(counts.get(s).copied().unwrap_or(0) as i64)),
                );
                row.push(Cell::Int(counts.values().sum::<usize>() as i64));
                table.push_row(row)?;
            }
            tables.insert(project, table);
        }
        Ok(tables)
    }

    fn order_statuses(&self, statuses: BTreeSet<&str>) -> Vec<String> {
        let index = |status: &str| {
            self.config
                .status_config
                .as_ref()
                .and_then(|c| c.meta_stage_index(status))
                .unwrap_or(usize::MAX)
        };
        let mut ordered: Vec<String> = statuses.into_iter().map(str::to_string).collect();
        ordered.sort_by(|a, b| index(a).cmp(&index(b)).then_with(|| a.cmp(b)));
        ordered
    }

    /// 作成月ごとに `key_fn` の値別の件数を数える
    ///
    /// 作成日時のない課題は数えない。
    pub fn time_series_created_month_by_key<F>(&self, key_fn: F, options: &TimeSeriesOptions) -> TimeSeries
    where
        F: Fn(&IssueAccessor<'_>) -> String,
    {
        let mut raw: BTreeMap<String, BTreeMap<NaiveDate, usize>> = BTreeMap::new();
        let mut seen_months = BTreeSet::new();
        for a in self.accessors() {
            let Some(month) = a.created_month() else {
                continue;
            };
            seen_months.insert(month);
            *raw.entry(key_fn(&a)).or_default().entry(month).or_insert(0) += 1;
        }

        let mut months: Vec<NaiveDate> = seen_months.iter().copied().collect();
        if options.inflate {
            if let (Some(first), Some(last)) = (seen_months.first(), seen_months.last()) {
                months.clear();
                let mut month = *first;
                while month <= *last {
                    months.push(month);
                    month = time_util::next_month(month);
                }
            }
        }

        let mut series: BTreeMap<String, Vec<usize>> = raw
            .into_iter()
            .map(|(key, by_month)| {
                let mut running = 0;
                let counts = months
                    .iter()
                    .map(|m| {
                        let n = by_month.get(m).copied().unwrap_or(0);
                        if options.cumulative {
                            running += n;
                            running
                        } else {
                            n
                        }
                    })
                    .collect();
                (key, counts)
            })
            .collect();

        let mut keep: Vec<bool> = if options.months.is_empty() {
            vec![true; months.len()]
        } else {
            let wanted: HashSet<NaiveDate> = options.months.iter().map(|m| month_of(*m)).collect();
            months.iter().map(|m| wanted.contains(m)).collect()
        };
        if options.trim_last {
            if let Some(last) = keep.iter().rposition(|k| *k) {
                keep[last] = false;
            }
        }

        let months = retain_by(&months, &keep);
        for counts in series.values_mut() {
            *counts = retain_by(counts, &keep);
        }
        TimeSeries { months, series }
    }

    /// ワークストリーム × 軸 × ステータスのピボット表
    ///
    /// 列は「ワークストリーム, 軸, 各ビンの件数, 合計, 各ビンの割合(%)」。
    /// ビンはステータス対応表のメタステージ順、続いて対応のないステータスを名前順。
    /// `use_status_category` ならステータスではなくステータスカテゴリ名で分ける。
    pub fn export_workstream_pivot<W, I>(
        &self,
        workstream_fn: W,
        include_fn: I,
        x_field: &IssueField,
        use_status_category: bool,
    ) -> Result<Table>
    where
        W: Fn(&IssueAccessor<'_>) -> String,
        I: Fn(&IssueAccessor<'_>) -> bool,
    {
        let status_config = self.config.status_config.as_ref();
        let bin_of = |a: &IssueAccessor<'_>| -> String {
            if use_status_category {
                return a.status_category_name().to_string();
            }
            match status_config.map(|c| c.meta_stage(a.status_name())) {
                Some(meta) if !meta.is_empty() => meta.to_string(),
                _ => a.status_name().to_string(),
            }
        };

        let mut grouped: BTreeMap<(String, String), Counts> = BTreeMap::new();
        let mut bins_seen = BTreeSet::new();
        for a in self.accessors().filter(|a| include_fn(a)) {
            let bin = bin_of(&a);
            bins_seen.insert(bin.clone());
            *grouped
                .entry((workstream_fn(&a), x_field.value(&a)))
                .or_default()
                .entry(bin)
                .or_insert(0) += 1;
        }

        let mut bins: Vec<String> = Vec::new();
        let ordered_stages: Vec<String> = if use_status_category {
            ["To Do", "In Progress", "Done"].iter().map(|s| s.to_string()).collect()
        } else {
            status_config
                .map(|c| c.stages.meta_stages())
                .unwrap_or_default()
        };
        for stage in ordered_stages {
            if !bins.contains(&stage) {
                bins.push(stage);
            }
        }
        for extra in bins_seen {
            if !bins.contains(&extra) {
                bins.push(extra);
            }
        }

        let mut columns = vec![
            Column::new("workstream", "Workstream", Format::String),
            Column::new("x", x_field.to_string(), Format::String),
        ];
        columns.extend(bins.iter().map(|b| Column::new(b.clone(), b.clone(), Format::Int)));
        columns.push(Column::new("sum", "Sum", Format::Int));
        columns.extend(
            bins.iter()
                .map(|b| Column::new(format!("{} %", b), format!("{} %", b), Format::Float)),
        );

        let mut table = Table::new("Workstreams", columns);
        for ((workstream, x), counts) in grouped {
            let sum: usize = counts.values().sum();
            let mut row = vec![Cell::text(workstream), Cell::text(x)];
            row.extend(bins.iter().map(|b| Cell::Int(counts.get(b).copied().unwrap_or(0) as i64)));
            row.push(Cell::Int(sum as i64));
            row.extend(bins.iter().map(|b| {
                let n = counts.get(b).copied().unwrap_or(0);
                Cell::Float(if sum == 0 { 0.0 } else { n as f64 * 100.0 / sum as f64 })
            }));
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// primary 全体の工数合計
    pub fn time_stats(&self) -> TimeStats {
        let mut stats = TimeStats::default();
        for a in self.accessors() {
            stats.add(&a);
        }
        stats
    }
}

fn type_filter<S: AsRef<str>>(types: &[S]) -> HashSet<String> {
    types
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn type_matches(wanted: &HashSet<String>, accessor: &IssueAccessor<'_>) -> bool {
    wanted.is_empty() || wanted.contains(&accessor.type_name().to_lowercase())
}

fn month_of(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn retain_by<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v.clone())
        .collect()
}
