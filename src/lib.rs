pub mod accessor;
pub mod aggregate;
pub mod client;
pub mod config;
pub mod customfield;
pub mod error;
pub mod graph;
pub mod jql;
pub mod lineage;
pub mod models;
pub mod pager;
pub mod stages;
pub mod table;
pub mod time_util;
pub mod transitions;

pub use client::{ApiRequest, ApiResponse, Auth, JiraClient, JiraConfig, Method, ReqwestTransport, Transport};
pub use error::{Error, Result};
pub use models::*;

// Issue access re-exports
pub use accessor::{IssueAccessor, IssueField, status_is_done, time_remaining, value_to_string};

// Graph re-exports
pub use config::GraphConfig;
pub use graph::{IssuesMap, IssuesSet};
pub use lineage::{BackFetchReport, MAX_LINEAGE_TOP_ITERATIONS, MAX_PARENT_ITERATIONS};
pub use stages::{StageConfig, StatusConfig};

// Query and paging re-exports
pub use customfield::{CustomFieldId, CustomFieldSet};
pub use jql::{IncludeExclude, JqlField, JqlFilter, keys_to_jqls};
pub use pager::{CancelToken, IssueSource, PageOptions, PageReport, RANK_FIELD};

// Reporting re-exports
pub use aggregate::{
    Counts, MetaStageCounts, ProjectTypeStatus, TimeCounts, TimeSeries, TimeSeriesOptions,
    TimeStats,
};
pub use table::{Cell, Column, Format, MarkdownSink, Table, TableProjector, TableSink};

pub use time_util::{artifact_file_name, parse_jira_datetime};
pub use transitions::{TransitionOutcome, validate_issue_key};
