//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → static registry swaps in the new [[clusters]] table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the cluster table is hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    ClusterConfig, HostPolicy, ListenerConfig, LogFormat, ObservabilityConfig, PortPolicy,
    ProxyConfig, RegistryConfig, RegistryKind, ResolverConfig, TimeoutConfig,
};
