use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The external services a request depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    VectorIndex,
    Completion,
}

impl Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedding => write!(f, "embedding API"),
            Self::VectorIndex => write!(f, "vector index"),
            Self::Completion => write!(f, "completion API"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("The {service} request failed: {source}")]
    Dependency {
        service: Service,
        #[source]
        source: anyhow::Error,
    },

    #[error("The {0} did not respond in time")]
    Timeout(Service),
}

impl Error {
    pub fn dependency(service: Service, source: impl Into<anyhow::Error>) -> Self {
        Self::Dependency {
            service,
            source: source.into(),
        }
    }

    /// The service at fault, if the error came from a dependency call.
    #[must_use]
    pub const fn service(&self) -> Option<Service> {
        match self {
            Self::Configuration(_) => None,
            Self::Dependency { service, .. } | Self::Timeout(service) => Some(*service),
        }
    }
}

/// Runs a dependency call, failing with [`Error::Timeout`] once `timeout` elapses.
pub(crate) async fn bounded<T>(
    service: Service,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::Timeout(service))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn times_out_stalled_lookups() {
        let err = bounded(
            Service::VectorIndex,
            Duration::from_millis(20),
            std::future::pending::<Result<String>>(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(Service::VectorIndex)));
        assert_eq!(err.service(), Some(Service::VectorIndex));
    }

    #[tokio::test]
    async fn passes_results_through() {
        let host = bounded(Service::VectorIndex, Duration::from_secs(1), async {
            Ok("docs-abc.svc.pinecone.io".to_string())
        })
        .await
        .unwrap();

        assert_eq!(host, "docs-abc.svc.pinecone.io");
    }
}
