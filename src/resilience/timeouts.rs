//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend dial, handshake and response-header waits with a deadline
//! - Map both timeouts and transport failures to `BackendUnreachable`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - No retries: a failed dial is reported to the client as 502

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Run a backend operation under `limit`.
///
/// `stage` names the operation in the error message ("connect", "handshake").
pub async fn with_deadline<T, E, F>(
    limit: Duration,
    target: &str,
    stage: &'static str,
    operation: F,
) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, E>>,
    E: Error,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ProxyError::BackendUnreachable {
            target: target.to_string(),
            reason: format!("{stage} failed: {}", error_chain(&e)),
        }),
        Err(_) => Err(ProxyError::BackendUnreachable {
            target: target.to_string(),
            reason: format!("{stage} timed out after {limit:?}"),
        }),
    }
}

/// Render an error with its sources, e.g. `client error (Connect): tcp connect error: Connection refused`.
pub fn error_chain(error: &dyn Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.ends_with(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn passes_through_success() {
        let value = with_deadline(Duration::from_secs(1), "localhost:1", "connect", async {
            Ok::<_, io::Error>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn maps_failure() {
        let err = with_deadline(Duration::from_secs(1), "localhost:1", "connect", async {
            Err::<(), _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        })
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "backend localhost:1 unreachable: connect failed: refused"
        );
    }

    #[tokio::test]
    async fn maps_expiry() {
        let err = with_deadline(Duration::from_millis(50), "localhost:1", "handshake", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, io::Error>(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().ends_with("handshake timed out after 50ms"));
    }
}
