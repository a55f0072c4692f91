use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use herald::config::DiscoveryConfig;
use herald::coordinator::LoggingApplier;
use herald::node::Node;
use herald::shutdown::install_shutdown_handler;
use herald::transport::tcp::TcpTransport;
use herald::transport::{Request, Transport};
use herald::types::{ClusterView, NodeId};

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(version)]
#[command(about = "Leader election and fault detection for a cluster control plane")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a node
    Server(ServerArgs),

    /// Show what a node believes about the cluster
    Status {
        /// Node address
        #[arg(long, short = 'a', default_value = "127.0.0.1:9300")]
        addr: String,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Node ID. A fresh random id is generated when omitted.
    #[arg(long)]
    node_id: Option<String>,

    /// Cluster name; nodes only talk to nodes with the same name
    #[arg(long, default_value = "herald")]
    cluster_id: String,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9300")]
    listen: SocketAddr,

    /// Address peers use to reach this node (defaults to --listen)
    #[arg(long)]
    advertise: Option<String>,

    /// Elector addresses (comma-separated, format: "host:port")
    /// Example: "127.0.0.1:9301,127.0.0.1:9302"
    #[arg(long, default_value = "")]
    peers: String,

    /// Timeout of each vote request (ms)
    #[arg(long, default_value = "3000")]
    election_timeout_ms: u64,

    /// Deadline of one discovery ping round, also bounds each join request (ms)
    #[arg(long, default_value = "3000")]
    discovery_ping_timeout_ms: u64,

    /// Interval between liveness pings (ms)
    #[arg(long, default_value = "1000")]
    ping_interval_ms: u64,

    /// Timeout of each liveness ping (ms)
    #[arg(long, default_value = "30000")]
    ping_timeout_ms: u64,

    /// Consecutive missed pings before a peer is considered failed
    #[arg(long, default_value = "3")]
    ping_retries: u32,

    /// Declare a peer failed on disconnect instead of reconnecting once
    #[arg(long)]
    no_reconnect: bool,

    /// Upper bound of the random delay before the first election (ms)
    #[arg(long, default_value = "300")]
    initial_election_delay_ms: u64,

    /// Lower bound of the random delay between join attempts (ms)
    #[arg(long, default_value = "100")]
    join_backoff_min_ms: u64,

    /// Upper bound of the random delay between join attempts (ms)
    #[arg(long, default_value = "400")]
    join_backoff_max_ms: u64,

    /// Failed joins to an advised leader before running an election
    #[arg(long, default_value = "3")]
    join_attempts_before_election: u32,

    /// How long a publish waits for follower acks (ms)
    #[arg(long, default_value = "30000")]
    publish_timeout_ms: u64,

    /// Follower acks a publish needs (defaults to a quorum minus the leader)
    #[arg(long)]
    min_publish_acks: Option<usize>,

    /// Seed for randomized delays
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct NodeOutput {
    node_id: String,
    address: String,
}

#[derive(Serialize)]
struct StatusOutput {
    node_id: String,
    cluster_id: String,
    phase: String,
    role: String,
    term: u64,
    voted_for: Option<String>,
    leader: Option<NodeOutput>,
    applied_term: u64,
    applied_version: u64,
    members: Vec<NodeOutput>,
}

impl From<ClusterView> for StatusOutput {
    fn from(view: ClusterView) -> Self {
        let node = |n: herald::types::DiscoveryNode| NodeOutput {
            node_id: n.id.to_string(),
            address: n.address,
        };
        Self {
            node_id: view.node.id.to_string(),
            cluster_id: view.cluster_id,
            phase: view.phase.to_string(),
            role: view.role.to_string(),
            term: view.term,
            voted_for: view.voted_for.map(|id| id.to_string()),
            leader: view.leader.map(node),
            applied_term: view.applied_term,
            applied_version: view.applied_version,
            members: view.members.into_iter().map(node).collect(),
        }
    }
}

fn parse_peers(peers: &str) -> Vec<String> {
    peers
        .split(',')
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .filter(|peer| {
            let valid = peer.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok());
            if !valid {
                tracing::warn!(peer, "Invalid peer format, expected host:port");
            }
            valid
        })
        .map(str::to_string)
        .collect()
}

fn server_config(args: ServerArgs) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::new(
        args.node_id.map(NodeId::from).unwrap_or_else(NodeId::generate),
        args.listen,
    )
    .with_cluster_id(args.cluster_id);
    config.advertise_addr = args.advertise;
    config.peers = parse_peers(&args.peers);
    config.election_timeout_ms = args.election_timeout_ms;
    config.discovery_ping_timeout_ms = args.discovery_ping_timeout_ms;
    config.ping_interval_ms = args.ping_interval_ms;
    config.ping_timeout_ms = args.ping_timeout_ms;
    config.ping_retries = args.ping_retries;
    config.reconnect_on_disconnect = !args.no_reconnect;
    config.initial_election_delay_max_ms = args.initial_election_delay_ms;
    config.join_backoff_min_ms = args.join_backoff_min_ms;
    config.join_backoff_max_ms = args.join_backoff_max_ms;
    config.join_attempts_before_election = args.join_attempts_before_election;
    config.publish_timeout_ms = args.publish_timeout_ms;
    config.min_publish_acks = args.min_publish_acks;
    config.seed = args.seed;
    config
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = server_config(args);
    tracing::info!(
        node_id = %config.node_id,
        listen = %config.listen_addr,
        peers = ?config.peers,
        "Starting herald node"
    );

    let shutdown = install_shutdown_handler()?;
    let node = Node::new(config, Arc::new(LoggingApplier))?;
    node.run(shutdown).await?;
    Ok(())
}

async fn handle_status(addr: &str, output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let transport = TcpTransport::new(Duration::from_secs(3));
    let view = transport
        .request(addr, Request::ClusterView)
        .await?
        .into_cluster_view()?;
    let status = StatusOutput::from(*view);

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("Cluster Status");
            println!("{}", "=".repeat(40));
            println!("Node:    {}", status.node_id);
            println!("Cluster: {}", status.cluster_id);
            println!("Phase:   {}", status.phase);
            println!("Role:    {}", status.role);
            println!("Term:    {}", status.term);
            match &status.leader {
                Some(leader) => println!("Leader:  {} ({})", leader.node_id, leader.address),
                None => println!("Leader:  none"),
            }
            println!("Applied: term {} version {}", status.applied_term, status.applied_version);
            println!();
            println!("Members:");
            println!("{:<38} ADDRESS", "ID");
            println!("{}", "-".repeat(60));
            for member in &status.members {
                println!("{:<38} {}", member.node_id, member.address);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("herald=info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Server(server_args) => run_server(server_args).await?,
        Commands::Status { addr, output } => handle_status(&addr, &output).await?,
    }
    Ok(())
}
