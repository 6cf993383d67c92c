//! stratactl: build a resource hierarchy from a cluster anchor or a file and print
//! it as a laid-out graph, an expandable table, or the filter options.

#![forbid(unsafe_code)]

mod source;
mod view;

use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use strata_core::NodeId;
use strata_graph::{options, CollapseSet, ExpandState, FilterState};
use tracing::{info, warn};

use crate::source::SourceArgs;

#[derive(Parser, Debug)]
#[command(name = "stratactl", version, about = "Resource hierarchy graphs")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace of the anchor (cluster sources only)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lay out the hierarchy as a graph
    Graph {
        #[command(flatten)]
        src: SourceArgs,
        /// Collapse a node (repeatable); its descendants are hidden
        #[arg(long = "collapse")]
        collapse: Vec<String>,
        /// Highlight the ancestor/descendant path through a node
        #[arg(long = "hover")]
        hover: Option<String>,
        /// Filter clause attr=value (repeatable), e.g. kind=VPC or status="Not Ready"
        #[arg(long = "filter")]
        filter: Vec<String>,
    },
    /// Print the hierarchy as an indented table
    Tree {
        #[command(flatten)]
        src: SourceArgs,
        /// Filter clause attr=value (repeatable)
        #[arg(long = "filter")]
        filter: Vec<String>,
        /// Start with every row collapsed instead of the expand-all result
        #[arg(long = "collapsed", action = ArgAction::SetTrue)]
        collapsed: bool,
        /// Expand a row (repeatable)
        #[arg(long = "expand")]
        expand: Vec<String>,
    },
    /// List the distinct values each filter attribute can take
    Filters {
        #[command(flatten)]
        src: SourceArgs,
    },
}

fn init_tracing() {
    let env = std::env::var("STRATA_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("STRATA_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid STRATA_METRICS_ADDR; expected host:port");
        }
    }
}

fn parse_filters(clauses: &[String]) -> Result<FilterState> {
    let mut state = FilterState::new();
    for c in clauses {
        state.add_clause(c).with_context(|| format!("bad filter clause {:?}", c))?;
    }
    Ok(state)
}

fn emit<T: Serialize>(output: Output, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        Output::Human => human(value),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let ns = cli.namespace.as_deref();
    let now_ts = chrono::Utc::now().timestamp();

    let src = match &cli.command {
        Commands::Graph { src, .. } | Commands::Tree { src, .. } | Commands::Filters { src } => src,
    };
    let t0 = Instant::now();
    let (session, report) = source::open(src, ns).await?;
    metrics::histogram!("open_ms", t0.elapsed().as_secs_f64() * 1000.0);
    let snap = session.current();
    info!(
        nodes = snap.graph.len(),
        edges = snap.graph.edges().len(),
        waves = report.waves,
        truncated = report.truncated,
        took_ms = %t0.elapsed().as_millis(),
        "hierarchy ready"
    );
    for f in &snap.failures {
        warn!(kind = f.label(), error = %f, "fetch failure");
    }
    if report.truncated {
        warn!("depth guard reached; deeper levels were not fetched (raise STRATA_MAX_DEPTH)");
    }

    match cli.command {
        Commands::Graph { collapse, hover, filter, .. } => {
            let mut collapsed: CollapseSet = collapse.into_iter().map(NodeId::from).collect();
            collapsed.retain_known(&snap.graph);
            let hover = hover.map(NodeId::from);
            let filters = parse_filters(&filter)?;
            let v = view::graph_view(&snap.graph, &collapsed, hover.as_ref(), &filters, now_ts);
            emit(cli.output, &v, view::print_graph_human)?;
        }
        Commands::Tree { filter, collapsed, expand, .. } => {
            let filters = parse_filters(&filter)?;
            let mut state: ExpandState =
                if collapsed { ExpandState::new() } else { report.expanded.iter().cloned().collect() };
            for id in expand {
                state.expand(NodeId::from(id));
            }
            let rows = view::tree_view(&snap.graph, &state, &filters, now_ts);
            emit(cli.output, &rows, |r| view::print_tree_human(r))?;
        }
        Commands::Filters { .. } => {
            let opts = options(&snap.graph, now_ts);
            emit(cli.output, &opts, |o| {
                for (attr, values) in o {
                    println!("{:<10} {}", attr.as_str(), values.join(", "));
                }
            })?;
        }
    }
    Ok(())
}
