//! Scoped, transaction-aware logging over `tracing`.
//!
//! The dispatcher and orchestrator depend only on this value type: cloning
//! plus `scoped`/`with_transaction` produce a derived logger without touching
//! the original, and every leveled method forwards to a `tracing` event with
//! `scope` and `tid` as structured fields.

use serde_json::Value;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Cheap-to-clone logging handle carrying a scope (`"Service:Method"`) and
/// the current transaction id.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    scope: Option<String>,
    tid: Option<String>,
}

impl Logger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global fmt subscriber with env-filter configuration.
    ///
    /// Safe to call more than once; a subscriber installed earlier (e.g., by
    /// a test harness or an embedding process) wins.
    pub fn prepare(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    /// Lifecycle hook mirroring `prepare`. Flushing is handled by the
    /// subscriber itself, so there is nothing to tear down.
    pub fn cleanup(&self) {}

    /// Derived logger with the given scope.
    #[must_use]
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            tid: self.tid.clone(),
        }
    }

    /// Derived logger bound to a transaction id.
    #[must_use]
    pub fn with_transaction(&self, tid: impl Into<String>) -> Self {
        Self {
            scope: self.scope.clone(),
            tid: Some(tid.into()),
        }
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.tid.as_deref()
    }

    pub fn trace(&self, message: &str, details: Option<&Value>) {
        self.emit(Level::TRACE, message, details);
    }

    pub fn debug(&self, message: &str, details: Option<&Value>) {
        self.emit(Level::DEBUG, message, details);
    }

    pub fn info(&self, message: &str, details: Option<&Value>) {
        self.emit(Level::INFO, message, details);
    }

    pub fn warning(&self, message: &str, details: Option<&Value>) {
        self.emit(Level::WARN, message, details);
    }

    pub fn error(&self, message: &str, details: Option<&Value>) {
        self.emit(Level::ERROR, message, details);
    }

    fn emit(&self, level: Level, message: &str, details: Option<&Value>) {
        let scope = self.scope.as_deref().unwrap_or("");
        let tid = self.tid.as_deref().unwrap_or("");
        let detail = details.map(ToString::to_string).unwrap_or_default();
        // tracing macros need a const level, hence the match.
        match level {
            Level::TRACE => tracing::trace!(%scope, %tid, %detail, "{message}"),
            Level::DEBUG => tracing::debug!(%scope, %tid, %detail, "{message}"),
            Level::INFO => tracing::info!(%scope, %tid, %detail, "{message}"),
            Level::WARN => tracing::warn!(%scope, %tid, %detail, "{message}"),
            _ => tracing::error!(%scope, %tid, %detail, "{message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
