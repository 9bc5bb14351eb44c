//! Fire-and-forget usage statistics.

use tracing::debug;

/// A usage event worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// An engine entered the defaults list.
    EngineAdded { engine: String },
    /// An engine left the defaults list.
    EngineRemoved { engine: String },
    /// An engine answered a suggestion round.
    SuggestionRound { engine: String, count: usize },
}

/// Sink for usage statistics. Implementations must not block.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Writes events to the `tracing` log at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        debug!(target: "a3s_suggest::telemetry", ?event, "telemetry");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTelemetry;
    use super::*;

    #[test]
    fn test_noop_and_tracing_accept_events() {
        NoopTelemetry.record(TelemetryEvent::EngineAdded { engine: "x".into() });
        TracingTelemetry.record(TelemetryEvent::SuggestionRound {
            engine: "x".into(),
            count: 2,
        });
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingTelemetry::default();
        sink.record(TelemetryEvent::EngineRemoved { engine: "y".into() });
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![TelemetryEvent::EngineRemoved { engine: "y".into() }]
        );
    }
}
