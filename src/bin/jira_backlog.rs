use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info};

use jira_graph::{
    Auth, Cell, Column, CustomFieldSet, Error, Format, GraphConfig, IssueAccessor, IssuesSet, JiraClient,
    JiraConfig, MarkdownSink, PageOptions, Result, StatusConfig, Table, TableProjector, TableSink,
    TransitionOutcome, artifact_file_name,
};

#[derive(Parser, Debug)]
#[command(name = "jira-backlog")]
#[command(about = "Fetch a Jira backlog or JQL result and print it as a table")]
#[command(version)]
struct Cli {
    /// Credentials file (JSON object keyed by authkey)
    #[arg(long, env = "JIRA_AUTHFILE")]
    authfile: Option<PathBuf>,

    /// Entry to use from the credentials file
    #[arg(long, default_value = "default")]
    authkey: String,

    /// Agile board whose backlog is fetched
    #[arg(long)]
    board_id: Option<u64>,

    /// JQL query (narrows the backlog when combined with --board-id)
    #[arg(long)]
    jql: Option<String>,

    /// Epic Link custom field (customfield_N, cf[N] or N)
    #[arg(long)]
    customfield: Option<String>,

    /// Epic Link custom field looked up by display name
    #[arg(long)]
    customfield_name: Option<String>,

    /// Single issue to show or transition
    #[arg(long)]
    issue_key: Option<String>,

    /// Transition name to apply to --issue-key
    #[arg(long, requires = "issue_key")]
    transition: Option<String>,

    /// Walk parent links until every lineage is closed
    #[arg(long)]
    parents: bool,

    /// Status to meta-stage mapping (JSON)
    #[arg(long)]
    status_config: Option<PathBuf>,

    /// Directory for the snapshot artifact
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Stop paging after this many pages
    #[arg(long)]
    max_pages: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    server_url: String,
    username: String,
    api_token: String,
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_authfile() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jira-graph").join("auth.json"))
}

/// 認証情報ファイルから接続設定を作る。ファイルがなければ環境変数を使う
fn load_config(authfile: Option<&Path>, authkey: &str) -> Result<JiraConfig> {
    let path = match authfile {
        Some(path) => Some(path.to_path_buf()),
        None => default_authfile().filter(|p| p.exists()),
    };
    let Some(path) = path else {
        return JiraConfig::from_env();
    };

    let content = std::fs::read_to_string(&path)?;
    let mut entries: HashMap<String, Credentials> = serde_json::from_str(&content)?;
    let credentials = entries.remove(authkey).ok_or_else(|| {
        Error::ConfigurationMissing(format!(
            "authkey '{}' not found in {}",
            authkey,
            path.display()
        ))
    })?;

    JiraConfig::new(
        credentials.server_url,
        Auth::Basic {
            username: credentials.username,
            api_token: credentials.api_token,
        },
    )
}

async fn epic_link_field(client: &JiraClient, cli: &Cli) -> Result<Option<String>> {
    if let Some(field) = &cli.customfield {
        return Ok(Some(field.clone()));
    }
    let Some(name) = &cli.customfield_name else {
        return Ok(None);
    };
    let fields = CustomFieldSet::new(client.get_fields().await?);
    Ok(Some(fields.id_for_name(name)?.prefixed()))
}

fn rank_column(projector: TableProjector) -> TableProjector {
    projector.column(
        "rank",
        "Rank",
        Format::Int,
        Some(Arc::new(|a: &IssueAccessor<'_>, _: &IssuesSet| {
            a.rank().map(|r| Cell::Int(r as i64)).unwrap_or(Cell::Empty)
        })),
    )
}

/// バックログ順位の列があればその順に並べ替える
fn sort_by_rank(table: &mut Table) {
    if let Some(index) = table.column_index("rank") {
        table.rows.sort_by_key(|row| match row[index] {
            Cell::Int(n) => n,
            _ => i64::MAX,
        });
    }
}

fn meta_stage_table(set: &IssuesSet) -> Result<Option<Table>> {
    let counts = set.counts_by_meta_stage::<&str>(&[])?;
    if counts.counts.is_empty() {
        return Ok(None);
    }
    let mut table = Table::new(
        "Meta stages",
        vec![
            Column::new("meta_stage", "Meta Stage", Format::String),
            Column::new("count", "Count", Format::Int),
        ],
    );
    for (stage, count) in &counts.counts {
        table.push_row(vec![Cell::text(stage.as_str()), Cell::Int(*count as i64)])?;
    }
    if counts.unknown > 0 {
        table.push_row(vec![Cell::text("(unmapped)"), Cell::Int(counts.unknown as i64)])?;
    }
    Ok(Some(table))
}

async fn transition(client: &JiraClient, key: &str, name: &str) -> Result<()> {
    match client.do_transition_by_name(key, name, None).await? {
        TransitionOutcome::AlreadyInStatus => println!("{} is already in '{}'", key, name),
        TransitionOutcome::Transitioned(t) => println!("{} transitioned via '{}'", key, t.name),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.authfile.as_deref(), &cli.authkey)?;
    let server_url = config.base_url.clone();
    let client = JiraClient::new(config)?;

    if let (Some(key), Some(name)) = (&cli.issue_key, &cli.transition) {
        return transition(&client, key, name).await;
    }

    let mut options = PageOptions::new();
    if let Some(max_pages) = cli.max_pages {
        options = options.max_pages(max_pages);
    }

    let issues = match (&cli.issue_key, cli.board_id, &cli.jql) {
        (Some(key), _, _) => vec![client.get_issue(key).await?],
        (None, Some(board_id), jql) => {
            client
                .backlog_all(board_id, jql.as_deref(), &options, None)
                .await?
        }
        (None, None, Some(jql)) => client.search_all(jql, &options, None).await?,
        (None, None, None) => {
            return Err(Error::InvalidInput(
                "one of --board-id, --jql or --issue-key is required".to_string(),
            ));
        }
    };
    info!(count = issues.len(), "issues retrieved");

    let mut graph_config = GraphConfig::new().server_url(server_url);
    if let Some(path) = &cli.status_config {
        graph_config = graph_config.status_config(StatusConfig::from_file(path)?);
    }
    let mut set = IssuesSet::new(graph_config);
    set.add(issues)?;

    if let Some(field) = epic_link_field(&client, &cli).await? {
        let linked = set.inflate_epics_from_custom_field(&field)?;
        let fetched = set.inflate_epics_with(&client).await?;
        info!(field = %field, linked, fetched, "epic links resolved");
    }

    if cli.parents {
        let report = set.retrieve_parents(&client).await?;
        info!(
            iterations = report.iterations,
            fetched = report.fetched,
            unresolved = report.unresolved.len(),
            "parents retrieved"
        );
    }

    let mut projector = TableProjector::standard().highest("Epic");
    if cli.board_id.is_some() {
        projector = rank_column(projector);
    }
    let mut table = projector.project(&set)?;
    table.name = "Backlog".to_string();
    sort_by_rank(&mut table);

    let stdout = std::io::stdout();
    let mut sink = MarkdownSink::new(stdout.lock());
    sink.write_table(&table)?;
    if let Some(counts) = meta_stage_table(&set)? {
        sink.write_table(&counts)?;
    }
    sink.into_inner().flush()?;

    if let Some(dir) = &cli.out_dir {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(artifact_file_name("backlog", "json", Utc::now()));
        set.write_snapshot(&path).await?;
        info!(path = %path.display(), "snapshot written");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}
