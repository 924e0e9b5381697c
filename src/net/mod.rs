//! Networking modules for the GeoSiaga REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `client` owns the transport and middleware pipeline, `middleware` defines
//! the ordered request/response hooks, `api` wraps individual endpoints, and
//! `types` defines the wire schema and error types.

pub mod api;
pub mod client;
pub mod middleware;
pub mod types;
