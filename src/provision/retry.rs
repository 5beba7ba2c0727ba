//! Retry policy for transient provisioning errors
//!
//! Terraform and its providers fail intermittently for reasons that have
//! nothing to do with the module under test: registry hiccups, plugin
//! start-up races, dropped connections. The policy recognises those by
//! substring and retries them a bounded number of times.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::common::{Error, Result};

/// Known transient failures, as (case-insensitive substring, reason)
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        "timeout while waiting for plugin to start",
        "Provider plugin failed to start in time",
    ),
    (
        "timed out waiting for server handshake",
        "Provider plugin handshake timed out",
    ),
    ("connection reset by peer", "Connection reset by peer"),
    ("tls handshake timeout", "TLS handshake timed out"),
    ("i/o timeout", "Network I/O timed out"),
    (
        "client.timeout exceeded while awaiting headers",
        "HTTP client timed out awaiting headers",
    ),
    (
        "registry service is unreachable",
        "Terraform registry is unreachable",
    ),
    (
        "failed to query available provider packages",
        "Provider registry query failed",
    ),
    ("error installing provider", "Provider installation failed"),
    ("failed to install provider", "Provider installation failed"),
    ("could not download module", "Module download failed"),
    ("unable to verify signature", "Provider signature verification hiccup"),
    ("unable to verify checksum", "Provider checksum verification hiccup"),
    (
        "no valid credential sources for s3 backend found",
        "Backend credentials not yet available",
    ),
];

/// Which failures are retried, how many times, and how far apart
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Pause between attempts
    pub time_between_retries: Duration,
    /// Lowercased substring -> human readable reason
    pub retryable_errors: BTreeMap<String, String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_default_retryable_errors()
    }
}

impl RetryPolicy {
    /// 3 retries, 5 seconds apart, over the known transient terraform errors
    pub fn with_default_retryable_errors() -> Self {
        let retryable_errors = DEFAULT_RETRYABLE_ERRORS
            .iter()
            .map(|(pattern, reason)| (pattern.to_string(), reason.to_string()))
            .collect();
        Self {
            max_retries: 3,
            time_between_retries: Duration::from_secs(5),
            retryable_errors,
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn time_between_retries(mut self, pause: Duration) -> Self {
        self.time_between_retries = pause;
        self
    }

    /// Add a retryable substring (matched case-insensitively)
    pub fn retryable_error(mut self, pattern: &str, reason: &str) -> Self {
        self.retryable_errors
            .insert(pattern.to_lowercase(), reason.to_string());
        self
    }

    /// Return the reason if `output` contains a known transient error
    pub fn classify(&self, output: &str) -> Option<&str> {
        let haystack = output.to_lowercase();
        self.retryable_errors
            .iter()
            .find(|(pattern, _)| haystack.contains(pattern.as_str()))
            .map(|(_, reason)| reason.as_str())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retries are used up.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, description: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(%description, attempt, "Running");
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                warn!(
                    %description,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Transient error, retrying in {:?}",
                    policy.time_between_retries
                );
                tokio::time::sleep(policy.time_between_retries).await;
            }
            Err(e) if e.is_retryable() => {
                return Err(Error::RetriesExhausted {
                    description: description.to_string(),
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::with_default_retryable_errors()
            .max_retries(max_retries)
            .time_between_retries(Duration::ZERO)
    }

    #[test]
    fn test_classify_known_transient_errors() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify("Error: Failed to install provider\n\nError while installing databricks/databricks"),
            Some("Provider installation failed")
        );
        assert!(policy
            .classify("dial tcp 10.0.0.1:443: read: Connection Reset By Peer")
            .is_some());
        assert_eq!(
            policy.classify("Error: Unsupported argument \"cluster_nme\""),
            None
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let calls = &AtomicU32::new(0);
        let result = retry(&fast_policy(3), "terraform apply", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::terraform_retryable("apply", "reset", "connection reset by peer"))
            } else {
                Ok("applied")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "applied");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry(&fast_policy(2), "terraform init", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::terraform_retryable("init", "registry", "registry service is unreachable"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_retryable());
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_fatal_errors() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry(&fast_policy(5), "terraform apply", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::terraform_failed("apply", Some(1), "Error: Invalid reference"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::TerraformFailed { .. })));
    }
}
