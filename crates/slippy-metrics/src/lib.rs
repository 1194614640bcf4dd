//! Metrics for the slippymesh router.
//!
//! Every metric the router records is declared once here as a [`Metric`]
//! constant, so names and label keys cannot drift between the call sites and
//! the exporter. The `metrics` facade is re-exported; when no recorder is
//! installed, recording is a no-op.
//!
//! # Example
//!
//! ```rust
//! use slippy_metrics::{metric_defs, MetricKind};
//!
//! assert_eq!(metric_defs::SERIAL_LINES.kind, MetricKind::Counter);
//! slippy_metrics::metrics::counter!(metric_defs::SERIAL_LINES.name, "kind" => "plain").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
}

/// A metric declaration with its metadata.
///
/// Built with const constructors so the whole catalogue lives in
/// [`metric_defs`] as compile-time constants.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "slippy.serial.lines").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the router.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Serial Side
    // ========================================================================

    /// Lines read from the device.
    ///
    /// Labels: kind (address, packet, malformed, plain)
    pub const SERIAL_LINES: Metric = Metric::counter("slippy.serial.lines")
        .with_description("Lines read from the serial device")
        .with_unit(Unit::Count)
        .with_labels(&["kind"]);

    /// `JSON:` frames that failed to decode.
    pub const SERIAL_FRAME_ERRORS: Metric = Metric::counter("slippy.serial.frame_errors")
        .with_description("Mesh frames that could not be decoded")
        .with_unit(Unit::Count);

    /// Bytes written to the device.
    pub const SERIAL_BYTES_WRITTEN: Metric = Metric::counter("slippy.serial.bytes_written")
        .with_description("Bytes written to the serial device")
        .with_unit(Unit::Bytes);

    /// Serial resets requested by clients.
    ///
    /// Labels: outcome (ok, error)
    pub const SERIAL_RESETS: Metric = Metric::counter("slippy.serial.resets")
        .with_description("Serial port resets")
        .with_unit(Unit::Count)
        .with_labels(&["outcome"]);

    // ========================================================================
    // Client Side
    // ========================================================================

    /// Currently connected clients.
    pub const CLIENTS_CONNECTED: Metric = Metric::gauge("slippy.clients.connected")
        .with_description("Currently connected clients")
        .with_unit(Unit::Count);

    /// Clients removed because their outbox was closed or full.
    pub const CLIENTS_DROPPED: Metric = Metric::counter("slippy.clients.dropped")
        .with_description("Clients removed during broadcast")
        .with_unit(Unit::Count);

    /// Broadcast batches handed to client outboxes.
    pub const BROADCAST_DELIVERIES: Metric = Metric::counter("slippy.broadcast.deliveries")
        .with_description("Broadcast batches queued to clients")
        .with_unit(Unit::Count);

    /// Accepted client requests.
    ///
    /// Labels: function
    pub const REQUESTS: Metric = Metric::counter("slippy.requests")
        .with_description("Client requests dispatched")
        .with_unit(Unit::Count)
        .with_labels(&["function"]);

    /// Rejected client requests.
    ///
    /// Labels: reason
    pub const REQUESTS_REJECTED: Metric = Metric::counter("slippy.requests.rejected")
        .with_description("Client requests rejected")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &SERIAL_LINES,
        &SERIAL_FRAME_ERRORS,
        &SERIAL_BYTES_WRITTEN,
        &SERIAL_RESETS,
        &CLIENTS_CONNECTED,
        &CLIENTS_DROPPED,
        &BROADCAST_DELIVERIES,
        &REQUESTS,
        &REQUESTS_REJECTED,
    ];
}

/// Describes all metrics used by the router.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus recorder serving `/metrics` on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}
