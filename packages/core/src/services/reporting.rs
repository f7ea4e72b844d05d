//! Warning Sink
//!
//! Isolated faults, e.g. a single resource failing to initialize, are not
//! allowed to abort bulk operations. They are handed to an [`ErrorReporting`]
//! sink instead, so embedders can surface them in their own monitoring.

/// Sink for non-fatal faults.
pub trait ErrorReporting: Send + Sync {
    /// Records a warning originating from `component`. Implementations must
    /// not panic and must not block for long.
    fn report_warning(&self, component: &str, error: &anyhow::Error);
}

/// Default sink forwarding warnings to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingErrorReporting;

impl ErrorReporting for TracingErrorReporting {
    fn report_warning(&self, component: &str, error: &anyhow::Error) {
        tracing::warn!(component = %component, error = %error, "resource fault isolated");
    }
}
