//! HTTP API: routing, authentication middleware and JSON mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
