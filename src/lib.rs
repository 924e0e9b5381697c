//! GeoSiaga API session client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Dependency order, leaves first: session storage (`util::storage`) →
//! HTTP client wrapper (`net::client` + `net::middleware`) → session
//! context (`state::auth`). Callers construct an [`AuthSession`] once and
//! pass it to whatever needs the current user.

pub mod config;
pub mod net;
pub mod state;
pub mod util;

pub use config::{ClientConfig, ConfigError};
pub use net::client::{ApiClient, ApiResponse, Navigator};
pub use net::types::{ApiError, SessionError, User, UserPatch};
pub use state::auth::{AuthSession, AuthState, AuthStatus};
pub use util::storage::{FileStore, MemoryStore, SessionStorage, SessionStore, StorageError};
