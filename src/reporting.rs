// src/reporting.rs
// Audit trail for failures that are absorbed instead of propagated

use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Receives every chunk, probe and cleanup failure the pipeline swallows.
pub trait ErrorReporter: Send + Sync {
    fn log_error(
        &self,
        error: &dyn Error,
        component: &str,
        severity: Severity,
        context: serde_json::Value,
    );
}

/// Default reporter: one `tracing` event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn log_error(
        &self,
        error: &dyn Error,
        component: &str,
        severity: Severity,
        context: serde_json::Value,
    ) {
        match severity {
            Severity::Info => tracing::info!("[{}] {} {}", component, error, context),
            Severity::Warning => tracing::warn!("[{}] {} {}", component, error, context),
            Severity::Error => tracing::error!("[{}] {} {}", component, error, context),
        }
    }
}
