//! The outbound value-writing seam.
//!
//! The core never talks to a wire protocol directly; it hands resolved
//! values to a [`ValueSink`]. The scheduler loop maps [`SinkError`]
//! variants onto its retry policy: transient failures retry while the
//! occurrence is live (for retry-until-end events), fatal failures stop
//! retries for that occurrence.

use std::time::Duration;

use crate::error::SinkError;
use crate::schedule::TargetValue;

/// External collaborator performing the actual write.
pub trait ValueSink {
    /// Write `value` to `node_id` on `endpoint`, observing `timeout`.
    ///
    /// # Errors
    /// [`SinkError::Transient`] for recoverable failures (including
    /// timeouts), [`SinkError::Fatal`] when retrying cannot help.
    fn write(
        &mut self,
        endpoint: &str,
        node_id: &str,
        value: &TargetValue,
        timeout: Duration,
    ) -> Result<(), SinkError>;
}

/// Sink that records writes to the log and always succeeds. Stands in for
/// the wire client during dry runs and when `output_type` is `"log"`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ValueSink for LogSink {
    fn write(
        &mut self,
        endpoint: &str,
        node_id: &str,
        value: &TargetValue,
        _timeout: Duration,
    ) -> Result<(), SinkError> {
        tracing::info!(endpoint, node_id, value = %value.render(), "sink write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_accepts_any_value() {
        let mut sink = LogSink;
        let result = sink.write(
            "opc.tcp://localhost:4840",
            "ns=2;i=1001",
            &TargetValue::Int(1),
            Duration::from_secs(10),
        );
        assert!(result.is_ok());
    }
}
