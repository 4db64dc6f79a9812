#![forbid(unsafe_code)]

//! Command-line interface: argument types and command execution.
//!
//! Each invocation builds a fresh in-process node, runs exactly one
//! command against the public library surface, and prints the result in
//! text or JSON. The interactive shell of a long-running deployment is an
//! external collaborator and stays out of this crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use nu_ansi_term::Color;
use serde::Serialize;

use crate::analytics;
use crate::error::{Result, TrellisError};
use crate::lifecycle::{Classification, Tier};
use crate::model::{props, PropMap, PropValue};
use crate::node::{ClusterNode, NodeOptions};
use crate::orchestrator::{ShutdownKind, StartupKind};
use crate::replication::{Payload, ReplicationPolicy};
use crate::rpc::InProcessNetwork;
use crate::traverse::Direction;

#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    about = "Embedded graph store with tiered lifecycle replication",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    pub format: OutputFormat,

    #[arg(long, global = true, help = "Member identifier for this process")]
    pub member: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query string (MATCH, CREATE, FIND, TRAVERSE, PATH, SHOW,
    /// VISUALIZE, or EXPLAIN-prefixed).
    Query {
        query: Vec<String>,
    },
    /// Seed a small demo graph and print its summary.
    Demo,
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },
    Edge {
        #[command(subcommand)]
        command: EdgeCommand,
    },
    Find {
        #[command(subcommand)]
        command: FindCommand,
    },
    Traverse {
        id: u64,
        #[arg(long, default_value_t = 1)]
        depth: u32,
        #[arg(long, value_enum, default_value_t = DirectionArg::Out)]
        direction: DirectionArg,
    },
    Path {
        from: u64,
        to: u64,
        #[arg(long, default_value_t = crate::traverse::MAX_DEPTH)]
        max_depth: u32,
    },
    Analytics {
        #[command(subcommand)]
        command: AnalyticsCommand,
    },
    Cluster {
        #[command(subcommand)]
        command: ClusterCommand,
    },
    Lifecycle {
        #[command(subcommand)]
        command: LifecycleCommand,
    },
    Replica {
        #[command(subcommand)]
        command: ReplicaCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Create a node; properties as KEY=VALUE pairs.
    Create { props: Vec<String> },
    Get { id: u64 },
    Delete { id: u64 },
}

#[derive(Subcommand, Debug)]
pub enum EdgeCommand {
    /// Create an edge; properties as KEY=VALUE pairs.
    Create {
        from: u64,
        to: u64,
        label: String,
        props: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FindCommand {
    Nodes { key: String, value: String },
    Edges { label: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    In,
    Out,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::In => Direction::In,
            DirectionArg::Out => Direction::Out,
            DirectionArg::Both => Direction::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AnalyticsCommand {
    Pagerank,
    Eigenvector,
    Betweenness,
    Closeness { id: u64 },
    Components,
    Louvain,
    Kcore,
    Triangles,
    Clustering,
    Density,
    Diameter,
    Degrees,
    Summary,
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    Status,
    Health,
    Join { member: String },
    Shutdown,
    Startup,
}

#[derive(Subcommand, Debug)]
pub enum LifecycleCommand {
    Classify { key: String, tag: String },
    Stats,
    Policies,
    Migrate { key: String, tier: String },
    Optimize,
}

#[derive(Subcommand, Debug)]
pub enum ReplicaCommand {
    Create { key: String, policy: String },
    Status { key: String },
}

/// Parses `KEY=VALUE` pairs into a property map. Values parse as int,
/// float, or bool when they look like one, otherwise as strings.
pub fn parse_props(pairs: &[String]) -> Result<PropMap> {
    let mut map = PropMap::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            TrellisError::Validation(format!("property '{pair}' must be KEY=VALUE"))
        })?;
        map.insert(key.to_owned(), parse_value(raw));
    }
    Ok(map)
}

fn parse_value(raw: &str) -> PropValue {
    if let Ok(int) = raw.parse::<i64>() {
        return PropValue::Int(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return PropValue::Float(float);
    }
    match raw {
        "true" => PropValue::Bool(true),
        "false" => PropValue::Bool(false),
        other => PropValue::Str(other.to_owned()),
    }
}

fn render<T: Serialize + std::fmt::Debug>(format: OutputFormat, value: &T) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|err| TrellisError::Serialization(err.to_string())),
        OutputFormat::Text => Ok(format!("{value:#?}")),
    }
}

fn ok_line(message: &str) -> String {
    format!("{} {message}", Color::Green.paint("ok:"))
}

/// Seeds the demo social graph (four people, four edges).
pub fn seed_demo(node: &ClusterNode) -> Result<()> {
    let store = node.store();
    let alice = store.create_node(props([("name", "Alice"), ("role", "Engineer")]))?;
    let bob = store.create_node(props([("name", "Bob"), ("role", "Manager")]))?;
    let carol = store.create_node(props([("name", "Carol"), ("role", "Engineer")]))?;
    let david = store.create_node(props([("name", "David"), ("role", "Director")]))?;
    store.create_edge(alice, bob, "reports_to", Default::default())?;
    store.create_edge(carol, bob, "reports_to", Default::default())?;
    store.create_edge(bob, david, "reports_to", Default::default())?;
    store.create_edge(alice, carol, "collaborates", Default::default())?;
    Ok(())
}

/// Executes one parsed command, returning the printable output.
pub async fn run(cli: Cli) -> Result<String> {
    let member = cli
        .member
        .clone()
        .unwrap_or_else(|| "local".to_string());
    let network = InProcessNetwork::new();
    let node = ClusterNode::new(NodeOptions::new(member), network)?;
    let format = cli.format;

    match cli.command {
        Command::Query { query } => {
            let text = query.join(" ");
            let result = node.query().execute(&text)?;
            render(format, &result)
        }
        Command::Demo => {
            seed_demo(&node)?;
            let summary = analytics::summary(node.store());
            render(format, &summary)
        }
        Command::Node { command } => match command {
            NodeCommand::Create { props } => {
                let id = node.store().create_node(parse_props(&props)?)?;
                Ok(ok_line(&format!("created node {id}")))
            }
            NodeCommand::Get { id } => {
                let found = node.store().get_node(id)?;
                render(format, &found)
            }
            NodeCommand::Delete { id } => {
                let removed = node.store().delete_node(id)?;
                Ok(ok_line(&format!("deleted: {removed}")))
            }
        },
        Command::Edge { command } => match command {
            EdgeCommand::Create {
                from,
                to,
                label,
                props,
            } => {
                let id = node
                    .store()
                    .create_edge(from, to, &label, parse_props(&props)?)?;
                Ok(ok_line(&format!("created edge {id}")))
            }
        },
        Command::Find { command } => match command {
            FindCommand::Nodes { key, value } => {
                let found = node
                    .store()
                    .find_nodes_by_property(&key, &parse_value(&value));
                render(format, &found)
            }
            FindCommand::Edges { label } => {
                let found = node.store().find_edges_by_label(&label);
                render(format, &found)
            }
        },
        Command::Traverse {
            id,
            depth,
            direction,
        } => {
            let reached = node.store().traverse(id, direction.into(), depth)?;
            render(format, &reached)
        }
        Command::Path {
            from,
            to,
            max_depth,
        } => {
            let path = node.store().find_path(from, to, max_depth)?;
            render(format, &path)
        }
        Command::Analytics { command } => run_analytics(&node, format, command),
        Command::Cluster { command } => run_cluster(&node, format, command).await,
        Command::Lifecycle { command } => run_lifecycle(&node, format, command),
        Command::Replica { command } => run_replica(&node, format, command).await,
    }
}

fn run_analytics(
    node: &Arc<ClusterNode>,
    format: OutputFormat,
    command: AnalyticsCommand,
) -> Result<String> {
    let store = node.store();
    match command {
        AnalyticsCommand::Pagerank => {
            let scores = analytics::pagerank(store, &Default::default());
            render(format, &sorted(scores))
        }
        AnalyticsCommand::Eigenvector => {
            let scores = analytics::eigenvector(store, &Default::default());
            render(format, &sorted(scores))
        }
        AnalyticsCommand::Betweenness => {
            let scores = analytics::betweenness(store);
            render(format, &sorted(scores))
        }
        AnalyticsCommand::Closeness { id } => {
            let score = analytics::closeness(store, id)?;
            render(format, &score)
        }
        AnalyticsCommand::Components => render(format, &analytics::connected_components(store)),
        AnalyticsCommand::Louvain => {
            let communities = analytics::louvain(store);
            render(format, &communities.into_iter().collect::<BTreeMap<_, _>>())
        }
        AnalyticsCommand::Kcore => {
            let cores = analytics::k_core(store);
            render(format, &cores.into_iter().collect::<BTreeMap<_, _>>())
        }
        AnalyticsCommand::Triangles => {
            let (per_node, total) = analytics::triangle_counts(store);
            let per_node: BTreeMap<_, _> = per_node.into_iter().collect();
            render(format, &(per_node, total))
        }
        AnalyticsCommand::Clustering => render(format, &analytics::global_clustering(store)),
        AnalyticsCommand::Density => render(format, &analytics::density(store)),
        AnalyticsCommand::Diameter => render(format, &analytics::diameter(store)),
        AnalyticsCommand::Degrees => render(format, &analytics::degree_distribution(store)),
        AnalyticsCommand::Summary => render(format, &analytics::summary(store)),
    }
}

fn sorted(scores: std::collections::HashMap<u64, f64>) -> BTreeMap<u64, f64> {
    scores.into_iter().collect()
}

async fn run_cluster(
    node: &Arc<ClusterNode>,
    format: OutputFormat,
    command: ClusterCommand,
) -> Result<String> {
    match command {
        ClusterCommand::Status => render(format, &node.cluster().info()),
        ClusterCommand::Health => render(format, &node.health().health()),
        ClusterCommand::Join { member } => {
            node.join_cluster(&member)?;
            Ok(ok_line(&format!("joined {member}")))
        }
        ClusterCommand::Shutdown => {
            let report = node.graceful_shutdown(ShutdownKind::Planned).await?;
            render(format, &report)
        }
        ClusterCommand::Startup => {
            let report = node.coordinate_startup(StartupKind::Standard).await?;
            render(format, &report)
        }
    }
}

fn run_lifecycle(
    node: &Arc<ClusterNode>,
    format: OutputFormat,
    command: LifecycleCommand,
) -> Result<String> {
    match command {
        LifecycleCommand::Classify { key, tag } => {
            let tag: Classification = tag.parse()?;
            let placement = node.classify_and_store(
                &key,
                tag,
                Payload::Map(BTreeMap::new()),
                BTreeMap::new(),
            )?;
            render(format, &placement)
        }
        LifecycleCommand::Stats => render(format, &node.lifecycle().stats()),
        LifecycleCommand::Policies => {
            let policies = crate::lifecycle::LifecycleManager::policies();
            render(format, &policies)
        }
        LifecycleCommand::Migrate { key, tier } => {
            let to: Tier = tier.parse()?;
            let from = node
                .tiers()
                .locate(&key)?
                .ok_or_else(|| TrellisError::ConstraintViolation(format!(
                    "record '{key}' is not stored in any tier"
                )))?;
            node.placement().migrate(&key, from, to)?;
            Ok(ok_line(&format!("migrated {key} from {from} to {to}")))
        }
        LifecycleCommand::Optimize => {
            let queued = node.optimize_placements();
            let drained = node.placement().drain();
            Ok(ok_line(&format!("queued {queued}, completed {drained}")))
        }
    }
}

async fn run_replica(
    node: &Arc<ClusterNode>,
    format: OutputFormat,
    command: ReplicaCommand,
) -> Result<String> {
    match command {
        ReplicaCommand::Create { key, policy } => {
            let policy: ReplicationPolicy = policy.parse()?;
            let members =
                node.replication()
                    .create(&key, policy, Payload::Map(BTreeMap::new()))?;
            node.replication().flush().await;
            render(format, &members)
        }
        ReplicaCommand::Status { key } => {
            let status = node
                .replication()
                .status(&key)
                .ok_or_else(|| TrellisError::ConstraintViolation(format!(
                    "key '{key}' is not replicated"
                )))?;
            render(format, &status)
        }
    }
}
