//! # exam-mcp
//!
//! MCP (Model Context Protocol) server for a MySQL-backed patient exam registry.
//!
//! This crate provides an MCP server that exposes a single `exams` table to AI
//! agents through three tools: `insert`, `select`, and `delete`. Each tool takes
//! a raw SQL statement written by the agent and runs it against MySQL on a
//! connection opened for that call alone, so the server itself holds no database
//! state between calls.
//!
//! ## Features
//!
//! - **Agent-authored SQL**: tools forward statements verbatim; the tool
//!   descriptions teach the agent the table layout
//! - **Connection per call**: open, execute inside a transaction, commit, close
//! - **Two transports**: SSE (HTTP) for remote agents, stdio for local ones
//! - **Forgiving failure mode**: database errors are logged and reported as
//!   `false`, never surfaced as protocol errors
//!
//! ## Usage
//!
//! The server is typically run as an executable. Over stdio it can be wired
//! into AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "exams": {
//!       "command": "/path/to/exam-mcp",
//!       "args": ["--transport", "stdio", "--db-host", "127.0.0.1"]
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, you can use the library API:
//!
//! ```no_run
//! use exam_mcp::{DbConfig, ExamStore, McpServer};
//!
//! let store = ExamStore::new(DbConfig::default());
//! let mut server = McpServer::new(store);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! // server.run_stdio().await.expect("Server error");
//! ```

#![warn(missing_docs)]

mod convert;
mod db;
mod error;
mod server;
mod sse;
mod tools;

pub use convert::rows_to_tuples;
pub use db::{DbConfig, ExamStore};
pub use error::{McpError, Result};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use sse::serve as serve_sse;
pub use tools::{ToolDef, ToolRegistry};
