use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 1回の検索で取得できる件数の上限（キー一覧をJQLに分割するときの既定値）
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// JQLで絞り込み可能なフィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JqlField {
    Key,
    Project,
    Type,
    Status,
    Parent,
}

impl JqlField {
    pub fn name(&self) -> &'static str {
        match self {
            JqlField::Key => "key",
            JqlField::Project => "project",
            JqlField::Type => "type",
            JqlField::Status => "status",
            JqlField::Parent => "parent",
        }
    }
}

/// 含める値・除外する値の組
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeExclude {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl IncludeExclude {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// 型付きのJQLフィルター
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JqlFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub issues: IncludeExclude,
    #[serde(default)]
    pub projects: IncludeExclude,
    #[serde(default)]
    pub statuses: IncludeExclude,
    #[serde(default)]
    pub types: IncludeExclude,
    #[serde(default)]
    pub parents: IncludeExclude,

    #[serde(rename = "createdGTE")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_gte: Option<NaiveDate>,
    #[serde(rename = "createdLT")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_lt: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_query_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_total_count: Option<u32>,
}

impl JqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_mut(&mut self, field: JqlField) -> &mut IncludeExclude {
        match field {
            JqlField::Key => &mut self.issues,
            JqlField::Project => &mut self.projects,
            JqlField::Type => &mut self.types,
            JqlField::Status => &mut self.statuses,
            JqlField::Parent => &mut self.parents,
        }
    }

    fn group(&self, field: JqlField) -> &IncludeExclude {
        match field {
            JqlField::Key => &self.issues,
            JqlField::Project => &self.projects,
            JqlField::Type => &self.types,
            JqlField::Status => &self.statuses,
            JqlField::Parent => &self.parents,
        }
    }

    /// 含める値を追加
    pub fn include<I, S>(mut self, field: JqlField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_mut(field)
            .include
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// 除外する値を追加
    pub fn exclude<I, S>(mut self, field: JqlField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_mut(field)
            .exclude
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn created_gte(mut self, date: NaiveDate) -> Self {
        self.created_gte = Some(date);
        self
    }

    pub fn created_lt(mut self, date: NaiveDate) -> Self {
        self.created_lt = Some(date);
        self
    }

    /// 直近の実行結果を記録
    pub fn record_query(&mut self, at: DateTime<Utc>, total: u32) {
        self.last_query_time = Some(at);
        self.last_total_count = Some(total);
    }

    /// JQL文字列を生成（条件がなければ空文字列）
    ///
    /// 句の順序は key, project, type, status, parent, 作成日の範囲で固定。
    pub fn build(&self) -> String {
        let mut clauses = Vec::new();

        for field in [
            JqlField::Key,
            JqlField::Project,
            JqlField::Type,
            JqlField::Status,
            JqlField::Parent,
        ] {
            let group = self.group(field);
            if let Some(clause) = values_clause(field.name(), &group.include, true) {
                clauses.push(clause);
            }
            if let Some(clause) = values_clause(field.name(), &group.exclude, false) {
                clauses.push(clause);
            }
        }

        if let Some(date) = self.created_gte {
            clauses.push(format!("created >= \"{}\"", date.format("%Y-%m-%d")));
        }
        if let Some(date) = self.created_lt {
            clauses.push(format!("created < \"{}\"", date.format("%Y-%m-%d")));
        }

        clauses.join(" AND ")
    }
}

/// 1フィールド分の句を生成
///
/// 値はトリムし、空文字は捨てる。重複はそのまま残す。
/// 値に含まれる単一引用符はエスケープしないため、呼び出し側で渡さないこと。
pub fn values_clause(field: &str, values: &[String], include: bool) -> Option<String> {
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    match values.as_slice() {
        [] => None,
        [single] => {
            let op = if include { "=" } else { "!=" };
            Some(format!("{} {} '{}'", field, op, single))
        }
        many => {
            let op = if include { "IN" } else { "NOT IN" };
            let quoted = many
                .iter()
                .map(|v| format!("'{}'", v))
                .collect::<Vec<_>>()
                .join(",");
            Some(format!("{} {} ({})", field, op, quoted))
        }
    }
}

/// キー一覧を、1本あたり `max_results` 件以内のJQLに分割
///
/// `max_results` が0の場合は `DEFAULT_MAX_RESULTS` を使う。
pub fn keys_to_jqls(keys: &[String], max_results: usize) -> Vec<String> {
    let max_results = if max_results == 0 {
        DEFAULT_MAX_RESULTS
    } else {
        max_results
    };

    let keys: Vec<String> = keys
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    keys.chunks(max_results)
        .filter_map(|chunk| values_clause(JqlField::Key.name(), chunk, true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_builds_empty_string() {
        assert_eq!(JqlFilter::new().build(), "");
    }

    #[test]
    fn test_single_and_multiple_values() {
        // Given: プロジェクトを1件だけ指定
        let single = JqlFilter::new().include(JqlField::Project, ["ABC"]);
        // Then: = 形式
        assert_eq!(single.build(), "project = 'ABC'");

        // Given: プロジェクトを2件指定
        let multiple = JqlFilter::new().include(JqlField::Project, ["ABC", "DEF"]);
        // Then: IN 形式
        assert_eq!(multiple.build(), "project IN ('ABC','DEF')");
    }

    #[test]
    fn test_exclusions_use_negated_operators() {
        let filter = JqlFilter::new()
            .exclude(JqlField::Status, ["Done"])
            .exclude(JqlField::Type, ["Bug", "Sub-task"]);

        assert_eq!(
            filter.build(),
            "type NOT IN ('Bug','Sub-task') AND status != 'Done'"
        );
    }

    #[test]
    fn test_values_are_trimmed_and_empties_dropped() {
        let filter = JqlFilter::new().include(JqlField::Key, [" ABC-1 ", "", "   ", "ABC-1"]);

        // 重複は残る
        assert_eq!(filter.build(), "key IN ('ABC-1','ABC-1')");

        let only_blank = JqlFilter::new().include(JqlField::Parent, ["  "]);
        assert_eq!(only_blank.build(), "");
    }

    #[test]
    fn test_clause_order_is_stable() {
        let filter = JqlFilter::new()
            .created_lt(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .include(JqlField::Parent, ["ABC-9"])
            .include(JqlField::Status, ["Open"])
            .include(JqlField::Type, ["Story"])
            .include(JqlField::Project, ["ABC"])
            .include(JqlField::Key, ["ABC-1"])
            .created_gte(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert_eq!(
            filter.build(),
            "key = 'ABC-1' AND project = 'ABC' AND type = 'Story' AND status = 'Open' \
             AND parent = 'ABC-9' AND created >= \"2024-01-01\" AND created < \"2024-02-01\""
        );
    }

    #[test]
    fn test_filter_serde_uses_wire_names() {
        let mut filter = JqlFilter::new()
            .include(JqlField::Project, ["ABC"])
            .created_gte(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        filter.name = "backlog".to_string();

        let value = serde_json::to_value(&filter).unwrap();
        assert_eq!(value["createdGTE"], "2024-01-01");
        assert_eq!(value["projects"]["include"][0], "ABC");

        let back: JqlFilter = serde_json::from_value(value).unwrap();
        assert_eq!(back, filter);
    }

    #[test]
    fn test_keys_to_jqls_chunks_by_limit() {
        let keys = strings(&["A-1", "A-2", "A-3", " ", "A-4", "A-5"]);

        let jqls = keys_to_jqls(&keys, 2);

        assert_eq!(
            jqls,
            vec![
                "key IN ('A-1','A-2')".to_string(),
                "key IN ('A-3','A-4')".to_string(),
                "key = 'A-5'".to_string(),
            ]
        );
        assert!(keys_to_jqls(&[], 2).is_empty());
        assert_eq!(keys_to_jqls(&keys, 0).len(), 1);
    }
}
