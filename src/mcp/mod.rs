//! MCP call gateway.
//!
//! **Config** (`config`): service descriptors and the default service table.
//!
//! **Rate limiting** (`rate_limit`): fixed-window counters per service.
//!
//! **Client** (`McpServiceManager`): registry of services plus the single
//! call path (whitelist, dedup of identical in-flight calls, rate limit,
//! timeout, response normalization).
//!
//! **Server** (`server`): the HTTP boundary, `POST/GET /api/mcp/call`.
//!
//! Wire format towards upstreams: `POST {baseUrl}/mcp/{service}/{method}`
//! with `X-Service-Version` / `X-Request-ID` headers and a JSON body
//! `{params, module, requestId, timestamp}`.

pub mod client;
pub mod config;
pub mod rate_limit;
pub mod server;

pub use client::{CallResponse, ErrorKind, GatewayError, McpRequest, McpServiceManager, ServiceStatus};
pub use config::{RateLimitPolicy, ServiceDescriptor};
