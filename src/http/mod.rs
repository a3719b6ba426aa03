//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, route under prefix)
//!     → request.rs (cluster id + proxied path, forwarded headers)
//!     → [resolver turns cluster id into a backend target]
//!     → forward.rs (plain HTTP, any method)
//!       websocket.rs (upgrade requests, bidirectional relay)
//!     → response.rs (strip hop-by-hop, stream back)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use forward::Forwarder;
pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
