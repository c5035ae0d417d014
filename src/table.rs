//! 課題集合を表形式に射影する
//!
//! XLSX や CSV への書き出しは [`TableSink`] の実装側の責務とし、
//! このクレートにはテキスト（Markdown 表）の出力だけを置く。

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::accessor::IssueAccessor;
use crate::customfield;
use crate::error::{Error, Result};
use crate::graph::IssuesSet;

/// 列の書式ヒント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    String,
    Int,
    Float,
    Url,
    Date,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    /// Markdown リンクとして描画する
    Link { text: String, url: String },
    Date(DateTime<Utc>),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Float(x) => write!(f, "{:.2}", x),
            Cell::Link { text, url } => write!(f, "[{}]({})", text, url),
            Cell::Date(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub slug: String,
    pub name: String,
    pub format: Format,
}

impl Column {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, format: Format) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// 行を追加する。列数が合わなければ `Bug`
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Bug(format!(
                "row has {} cells but table '{}' has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, slug: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.slug == slug)
    }

    /// Markdown の表として描画
    pub fn to_markdown(&self) -> String {
        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string().replace('|', "\\|")).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.name.chars().count().max(3)).collect();
        for row in &rendered {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        push_line(&mut out, &header, &widths, &self.columns);
        let rule: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| match column.format {
                Format::Int | Format::Float => format!("{}:", "-".repeat(width - 1)),
                _ => "-".repeat(*width),
            })
            .collect();
        out.push_str(&format!("| {} |\n", rule.join(" | ")));
        for row in &rendered {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            push_line(&mut out, &cells, &widths, &self.columns);
        }
        out
    }
}

fn push_line(out: &mut String, cells: &[&str], widths: &[usize], columns: &[Column]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .zip(columns)
        .map(|((cell, width), column)| {
            let pad = width.saturating_sub(cell.chars().count());
            match column.format {
                Format::Int | Format::Float => format!("{}{}", " ".repeat(pad), cell),
                _ => format!("{}{}", cell, " ".repeat(pad)),
            }
        })
        .collect();
    out.push_str(&format!("| {} |\n", padded.join(" | ")));
}

/// 表の書き出し先（XLSX・CSV などの外部実装を差し込む継ぎ目）
pub trait TableSink {
    fn write_table(&mut self, table: &Table) -> Result<()>;
}

/// Markdown の表として書き出すシンク
pub struct MarkdownSink<W: Write> {
    writer: W,
}

impl<W: Write> MarkdownSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TableSink for MarkdownSink<W> {
    fn write_table(&mut self, table: &Table) -> Result<()> {
        if !table.name.is_empty() {
            writeln!(self.writer, "## {}\n", table.name)?;
        }
        self.writer.write_all(table.to_markdown().as_bytes())?;
        writeln!(self.writer)?;
        Ok(())
    }
}

pub type Extractor = Arc<dyn Fn(&IssueAccessor<'_>, &IssuesSet) -> Cell + Send + Sync>;

/// 列の定義
#[derive(Clone)]
pub struct ColumnDef {
    pub column: Column,
    pub extractor: Option<Extractor>,
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("column", &self.column)
            .field("extractor", &self.extractor.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

pub const STANDARD_COLUMNS: [&str; 11] = [
    "key",
    "type",
    "project",
    "summary",
    "status",
    "resolution",
    "time_original_estimate_days",
    "time_estimate_days",
    "time_spent_days",
    "time_remaining_days",
    "created",
];

fn standard_column(slug: &str) -> Option<Column> {
    let (name, format) = match slug {
        "key" => ("Key", Format::Url),
        "type" => ("Type", Format::String),
        "project" => ("Project", Format::String),
        "summary" => ("Summary", Format::String),
        "status" => ("Status", Format::String),
        "resolution" => ("Resolution", Format::String),
        "time_original_estimate_days" => ("Original Estimate (days)", Format::Float),
        "time_estimate_days" => ("Estimate (days)", Format::Float),
        "time_spent_days" => ("Time Spent (days)", Format::Float),
        "time_remaining_days" => ("Remaining (days)", Format::Float),
        "created" => ("Created", Format::Date),
        _ => return None,
    };
    Some(Column::new(slug, name, format))
}

/// 課題集合から表を組み立てる
#[derive(Debug, Clone, Default)]
pub struct TableProjector {
    /// 先頭に置く「最上位の○○」列のタイプ名
    highest_types: Vec<String>,
    columns: Vec<ColumnDef>,
}

impl TableProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 標準列をすべて持つ射影
    pub fn standard() -> Self {
        STANDARD_COLUMNS
            .iter()
            .fold(Self::new(), |projector, slug| projector.standard_column(slug))
    }

    /// 系譜上もっとも上位にある指定タイプの課題を先頭列に加える（例: Epic, Initiative）
    pub fn highest(mut self, type_name: impl Into<String>) -> Self {
        self.highest_types.push(type_name.into());
        self
    }

    pub fn standard_column(mut self, slug: &str) -> Self {
        if let Some(column) = standard_column(slug) {
            self.columns.push(ColumnDef {
                column,
                extractor: None,
            });
        }
        self
    }

    /// 独自の列を加える
    ///
    /// `extractor` がなければ、`slug` をカスタムフィールドIDとして値を読む。
    pub fn column(
        mut self,
        slug: impl Into<String>,
        name: impl Into<String>,
        format: Format,
        extractor: Option<Extractor>,
    ) -> Self {
        self.columns.push(ColumnDef {
            column: Column::new(slug, name, format),
            extractor,
        });
        self
    }

    pub fn columns(&self) -> Vec<Column> {
        self.highest_types
            .iter()
            .map(|t| Column::new(format!("highest_{}", t.to_lowercase()), format!("Highest {}", t), Format::Url))
            .chain(self.columns.iter().map(|def| def.column.clone()))
            .collect()
    }

    /// 表を組み立てる。値の取り出し方が決まらない列があれば `InvalidInput`
    pub fn project(&self, set: &IssuesSet) -> Result<Table> {
        for def in &self.columns {
            if def.extractor.is_none()
                && standard_column(&def.column.slug).is_none()
                && !customfield::is_custom(&def.column.slug).1
            {
                return Err(Error::InvalidInput(format!(
                    "column '{}' has no extractor and is not a custom field",
                    def.column.slug
                )));
            }
        }

        let mut table = Table::new("Issues", self.columns());
        for accessor in set.accessors() {
            let mut row = Vec::with_capacity(table.columns.len());
            for type_name in &self.highest_types {
                row.push(
                    set.highest_type_known(accessor.key(), type_name)
                        .map(|top| key_cell(set, &top.key))
                        .unwrap_or(Cell::Empty),
                );
            }
            for def in &self.columns {
                row.push(self.cell(set, &accessor, def));
            }
            table.push_row(row)?;
        }
        Ok(table)
    }

    fn cell(&self, set: &IssuesSet, accessor: &IssueAccessor<'_>, def: &ColumnDef) -> Cell {
        if let Some(extractor) = &def.extractor {
            return extractor(accessor, set);
        }
        let config = set.config();
        let days = |seconds: i64| Cell::Float(config.seconds_to_days(seconds));
        match def.column.slug.as_str() {
            "key" => key_cell(set, accessor.key()),
            "type" => Cell::text(accessor.type_name()),
            "project" => Cell::text(accessor.project_key()),
            "summary" => Cell::text(accessor.summary()),
            "status" => Cell::text(accessor.status_name()),
            "resolution" => Cell::text(accessor.resolution_name()),
            "time_original_estimate_days" => days(accessor.time_original_estimate()),
            "time_estimate_days" => days(accessor.time_estimate()),
            "time_spent_days" => days(accessor.time_spent()),
            "time_remaining_days" => days(accessor.time_remaining().0),
            "created" => accessor.created().map(Cell::Date).unwrap_or(Cell::Empty),
            slug => typed_cell(accessor.custom_string(slug), def.column.format),
        }
    }
}

fn key_cell(set: &IssuesSet, key: &str) -> Cell {
    match set.config().issue_url(key) {
        Some(url) => Cell::Link {
            text: key.to_string(),
            url,
        },
        None => Cell::text(key),
    }
}

fn typed_cell(value: String, format: Format) -> Cell {
    match format {
        Format::Int => value.parse().map(Cell::Int).unwrap_or_else(|_| Cell::text(value)),
        Format::Float => value.parse().map(Cell::Float).unwrap_or_else(|_| Cell::text(value)),
        Format::Date => crate::time_util::parse_jira_datetime(&value)
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::text(value)),
        Format::Url if !value.is_empty() => Cell::Link {
            text: value.clone(),
            url: value,
        },
        _ => Cell::text(value),
    }
}
