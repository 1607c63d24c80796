//! Ports and Adapters Infrastructure
//!
//! Foundational types for the hexagonal (ports and adapters) layout used by
//! the domain crates. A domain declares a port trait extending the marker
//! traits here; adapters (PostgreSQL, in-memory mock, ...) implement it.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │      Application services (commands)         │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │   Port traits (BillStorePort, ...)           │
//! │   defined in each domain crate               │
//! └──────────────────────────────────────────────┘
//!            ▲                        ▲
//!   ┌────────┴────────┐     ┌─────────┴────────┐
//!   │ PostgreSQL      │     │ In-memory mock   │
//!   │ (infra_db)      │     │ (feature "mock") │
//!   └─────────────────┘     └──────────────────┘
//! ```
//!
//! Adapters never retry on their own. A [`PortError`] tells the caller
//! whether repeating the call is safe ([`PortError::is_transient`]); a
//! retried write that already committed would otherwise land twice.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by any adapter behind a port
#[derive(Debug, Error)]
pub enum PortError {
    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// The write collides with stored data, e.g. a reused bill id
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// A stored document no longer matches the domain model
    #[error("Transformation error: {message}")]
    Transformation { message: String },

    /// The store rolled the transaction back (serialization failure, deadlock)
    #[error("Transaction aborted: {message}")]
    TransactionAborted { message: String },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable(service: impl Into<String>) -> Self {
        PortError::ServiceUnavailable {
            service: service.into(),
        }
    }

    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// True when nothing was committed and the same call may be repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::ServiceUnavailable { .. }
                | PortError::TransactionAborted { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
///
/// Ports are shared across tasks behind `Arc<dyn ...>`.
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Serving, but slow or partially impaired
    Degraded,
    Unhealthy,
}

/// Outcome of one adapter probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(
        adapter_id: impl Into<String>,
        latency_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    /// Returns true unless the adapter reported itself unhealthy
    pub fn is_operational(&self) -> bool {
        !matches!(self.status, AdapterHealth::Unhealthy)
    }
}

/// Adapters that can probe their backing system
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_not_found() {
        let error = PortError::not_found("Bill", "123");
        assert!(error.is_not_found());
        assert!(!error.is_transient());
        assert!(error.to_string().contains("Bill"));
        assert!(error.to_string().contains("123"));
    }

    #[test]
    fn test_port_error_transient() {
        let timeout = PortError::Timeout {
            operation: "write_if_version".to_string(),
            duration_ms: 5000,
        };
        assert!(timeout.is_transient());

        let aborted = PortError::TransactionAborted {
            message: "serialization failure".to_string(),
        };
        assert!(aborted.is_transient());
        assert!(PortError::unavailable("bill-store").is_transient());

        let conflict = PortError::conflict("duplicate bill id");
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_health_result_operational() {
        let degraded = HealthCheckResult {
            status: AdapterHealth::Degraded,
            ..HealthCheckResult::healthy("test", 3)
        };
        assert!(degraded.is_operational());

        let down = HealthCheckResult::unhealthy("test", 12, "connection refused");
        assert!(!down.is_operational());
        assert_eq!(down.message.as_deref(), Some("connection refused"));
    }
}
