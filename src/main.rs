//! MCP server for a MySQL-backed patient exam registry.
//!
//! Run with `exam-mcp` for the SSE transport (default port 8000) or
//! `exam-mcp --transport stdio` for stdin/stdout.

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use exam_mcp::{serve_sse, DbConfig, ExamStore, McpServer};

/// MCP server exposing a patient exam table as tools for AI agents.
///
/// Agents write the SQL themselves; the server forwards each statement to
/// MySQL over a fresh connection. Communicates via JSON-RPC 2.0 over SSE
/// or stdin/stdout.
#[derive(Parser)]
#[command(name = "exam-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Transport to serve MCP over.
    #[arg(long, value_enum, default_value_t = TransportMode::Sse)]
    transport: TransportMode,

    /// Port for the SSE transport. Ignored with --transport stdio.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// MySQL server host.
    #[arg(long, value_name = "HOST", default_value = "127.0.0.3")]
    db_host: String,

    /// MySQL server port.
    #[arg(long, default_value_t = 3306)]
    db_port: u16,

    /// MySQL user.
    #[arg(long, default_value = "root")]
    db_user: String,

    /// MySQL password.
    #[arg(long, default_value = "pass123")]
    db_password: String,

    /// Database holding the exams table.
    #[arg(long, default_value = "hbr_demo_db")]
    db_name: String,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportMode {
    Sse,
    Stdio,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Set up logging. Always to stderr: stdout belongs to the protocol
    // when running over stdio.
    let filter = if args.verbose {
        EnvFilter::new("info,exam_mcp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = DbConfig {
        host: args.db_host,
        port: args.db_port,
        user: args.db_user,
        password: args.db_password,
        database: args.db_name,
    };

    let store = ExamStore::new(config);
    let mut server = McpServer::new(store);

    tracing::info!(transport = ?args.transport, "starting MCP server");

    // Run the server
    let result = match args.transport {
        TransportMode::Stdio => server.run_stdio().await,
        TransportMode::Sse => serve_sse(server, args.port).await,
    };

    if let Err(e) = result {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}
