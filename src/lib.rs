//! Dashboard proxy library.
//!
//! Routes `{prefix}/{cluster_id}/{path}` to the dashboard of the named
//! cluster, for plain HTTP and for WebSockets.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod resolver;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{ClusterRecord, ClusterRegistry, RemoteRegistry, StaticRegistry};
pub use resolver::{ProxyTarget, RequestContext, Resolver};
