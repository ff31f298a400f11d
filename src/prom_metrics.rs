//! # Prometheus Metrics: Poller and API Exposition
//!
//! Exposes fleetpulse operational metrics in the Prometheus text exposition
//! format on `/metrics`.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `fleetpulse_probe_failures_total` | Counter | `probe` | Probe calls that fell back to unknown |
//! | `fleetpulse_cycles_completed_total` | Counter | `cadence` | Finished polling cycles |
//! | `fleetpulse_cycle_duration_seconds` | Gauge | `cadence` | Wall time of the last cycle |
//! | `fleetpulse_servers_registered` | Gauge |: | Servers seen by the last cycle |
//! | `fleetpulse_http_request_duration_seconds` | Histogram | `method`, `path` | API latency |

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ProbeLabel {
    pub probe: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct CadenceLabel {
    pub cadence: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

type HistogramConstructor = fn() -> Histogram;

fn request_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Registry plus handles. All metric types are atomic, so a shared
/// `Arc<Metrics>` can be updated from any task.
pub struct Metrics {
    pub registry: Registry,
    pub probe_failures: Family<ProbeLabel, Counter>,
    pub cycles_completed: Family<CadenceLabel, Counter>,
    pub cycle_duration_seconds: Family<CadenceLabel, Gauge<f64, AtomicU64>>,
    pub servers_registered: Gauge,
    pub http_request_duration: Family<HttpLabel, Histogram, HistogramConstructor>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let probe_failures = Family::<ProbeLabel, Counter>::default();
        registry.register(
            "fleetpulse_probe_failures",
            "Probe calls that failed and were recorded as unknown",
            probe_failures.clone(),
        );

        let cycles_completed = Family::<CadenceLabel, Counter>::default();
        registry.register(
            "fleetpulse_cycles_completed",
            "Polling cycles completed by cadence",
            cycles_completed.clone(),
        );

        let cycle_duration_seconds = Family::<CadenceLabel, Gauge<f64, AtomicU64>>::default();
        registry.register(
            "fleetpulse_cycle_duration_seconds",
            "Duration of the most recent polling cycle",
            cycle_duration_seconds.clone(),
        );

        let servers_registered = Gauge::default();
        registry.register(
            "fleetpulse_servers_registered",
            "Registered servers seen by the most recent cycle",
            servers_registered.clone(),
        );

        let http_request_duration =
            Family::<HttpLabel, Histogram, HistogramConstructor>::new_with_constructor(
                request_histogram,
            );
        registry.register(
            "fleetpulse_http_request_duration_seconds",
            "API request latency",
            http_request_duration.clone(),
        );

        Self {
            registry,
            probe_failures,
            cycles_completed,
            cycle_duration_seconds,
            servers_registered,
            http_request_duration,
        }
    }

    pub fn probe_failed(&self, probe: &str) {
        self.probe_failures
            .get_or_create(&ProbeLabel {
                probe: probe.to_string(),
            })
            .inc();
    }

    pub fn cycle_finished(&self, cadence: &str, seconds: f64, servers: usize) {
        let label = CadenceLabel {
            cadence: cadence.to_string(),
        };
        self.cycles_completed.get_or_create(&label).inc();
        self.cycle_duration_seconds.get_or_create(&label).set(seconds);
        self.servers_registered.set(servers as i64);
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
