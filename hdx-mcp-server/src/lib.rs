//! MCP server exposing the HDX Humanitarian API (HAPI) as tools.
//!
//! At startup the HAPI OpenAPI document is fetched and prepared, one tool is generated
//! per operation, and three hand-written tools are registered next to them. Requests
//! arrive as JSON-RPC over stdio or HTTP.

pub mod config;
pub mod generated;
pub mod http;
pub mod openapi;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tools;

pub use config::{ConfigError, Settings};
pub use protocol::{CallToolResult, ServerError};
pub use server::HdxMcpServer;
