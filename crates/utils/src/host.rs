use std::{
    future::Future,
    io,
    pin::Pin,
    process::{ExitStatus, Stdio},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::command;

/// Name used when neither Postfix nor the operating system can tell.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Boxed future type for hostname queries.
pub type HostnameFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Errors that can occur while asking Postfix for its host name.
#[derive(Debug, Error)]
pub enum PostconfError {
    /// `postconf` could not be run.
    #[error("unable to run postconf: {0}")]
    Io(#[from] io::Error),
    /// `postconf` did not exit successfully.
    #[error("postconf {0}")]
    Status(ExitStatus),
}

/// Trait for sources of the host name reported in the `Received` header.
///
/// Queries never fail, implementations fall back to a sensible value.
pub trait HostnameSource: Send + Sync {
    /// Returns the host name of this mail system.
    fn hostname(&self) -> HostnameFuture<'_>;
}

/// Hostname source asking Postfix for `myhostname`, falling back to the
/// system host name.
pub struct PostconfHostname {
    program: String,
    path: Option<String>,
}

impl PostconfHostname {
    /// Creates a new [`PostconfHostname`] running `postconf` with the given
    /// `$PATH` override.
    pub fn new(path: Option<String>) -> Self {
        Self::with_program("postconf".to_string(), path)
    }

    /// Creates a new [`PostconfHostname`] running `program` instead of `postconf`.
    pub fn with_program(program: String, path: Option<String>) -> Self {
        Self { program, path }
    }

    async fn postconf(&self) -> Result<String, PostconfError> {
        let output = command(&self.program, self.path.as_deref())
            .args(["-h", "myhostname"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(PostconfError::Status(output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl HostnameSource for PostconfHostname {
    fn hostname(&self) -> HostnameFuture<'_> {
        Box::pin(async move {
            match self.postconf().await {
                Ok(hostname) => {
                    debug!(hostname = %hostname, "Hostname from postconf");
                    hostname
                }
                Err(e) => {
                    warn!(error = %e, "unable to get hostname from postfix");
                    system_hostname()
                }
            }
        })
    }
}

/// Returns the operating system host name, or [`DEFAULT_HOSTNAME`].
pub fn system_hostname() -> String {
    match ::hostname::get() {
        Ok(name) => name.into_string().unwrap_or_else(|name| {
            warn!("unable to use hostname {name:?}, using default");
            DEFAULT_HOSTNAME.to_string()
        }),
        Err(e) => {
            warn!("unable to get hostname ({e}), using default");
            DEFAULT_HOSTNAME.to_string()
        }
    }
}

/// Hostname source returning a fixed name.
pub struct StaticHostname(pub String);

impl HostnameSource for StaticHostname {
    fn hostname(&self) -> HostnameFuture<'_> {
        Box::pin(async move { self.0.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_postconf_fallback_to_system_hostname() {
        let source = PostconfHostname::with_program(
            "srsforward-missing-postconf".to_string(),
            None,
        );
        assert_eq!(source.hostname().await, system_hostname());
    }

    #[tokio::test]
    async fn test_postconf_failure_status_falls_back() {
        let source = PostconfHostname::with_program("false".to_string(), None);
        assert_eq!(source.hostname().await, system_hostname());
    }

    #[tokio::test]
    async fn test_postconf_error_kinds() {
        let missing = PostconfHostname::with_program(
            "srsforward-missing-postconf".to_string(),
            None,
        );
        match missing.postconf().await {
            Err(PostconfError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("Expected I/O error, got {other:?}"),
        }

        let failing = PostconfHostname::with_program("false".to_string(), None);
        match failing.postconf().await {
            Err(PostconfError::Status(status)) => assert_eq!(status.code(), Some(1)),
            other => panic!("Expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_postconf_output_is_trimmed() {
        let source = PostconfHostname::with_program("echo".to_string(), None);
        assert_eq!(source.hostname().await, "-h myhostname");
    }

    #[tokio::test]
    async fn test_static_hostname() {
        let source = StaticHostname("mx.example.com".to_string());
        assert_eq!(source.hostname().await, "mx.example.com");
    }

    #[test]
    fn test_system_hostname_not_empty() {
        assert!(!system_hostname().is_empty());
    }
}
