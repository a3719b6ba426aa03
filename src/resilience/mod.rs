//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce connect/response/handshake deadlines)
//!     → On failure: ProxyError::BackendUnreachable, surfaced as 502
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend dial has a deadline
//! - No retry loop: the client (a browser dashboard) retries on its own

pub mod timeouts;
