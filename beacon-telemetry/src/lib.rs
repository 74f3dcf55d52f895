// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Beacon telemetry (tracing + delivery metrics).

use beacon_agent::{AttemptOutcome, CycleEnd, FlushObserver};
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Delivery metrics, recorded through the agent's observer hooks.
pub struct DeliveryMetrics {
    pub events_tracked: Counter<u64>,
    pub batches_sent: Counter<u64>,
    pub batches_failed: Counter<u64>,
    pub batch_size: Histogram<u64>,
    pub cycles_started: Counter<u64>,
    pub cycles_exhausted: Counter<u64>,
}

impl DeliveryMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events_tracked: meter
                .u64_counter("beacon.events.tracked")
                .with_description("Events handed to the agent")
                .init(),
            batches_sent: meter
                .u64_counter("beacon.batches.sent")
                .with_description("Batches acknowledged by the collector")
                .init(),
            batches_failed: meter
                .u64_counter("beacon.batches.failed")
                .with_description("Failed delivery attempts")
                .init(),
            batch_size: meter
                .u64_histogram("beacon.batch.size")
                .with_description("Events per delivery attempt")
                .init(),
            cycles_started: meter
                .u64_counter("beacon.cycles.started")
                .with_description("Flush cycles started")
                .init(),
            cycles_exhausted: meter
                .u64_counter("beacon.cycles.exhausted")
                .with_description("Flush cycles that ran out of attempts")
                .init(),
        }
    }
}

impl FlushObserver for DeliveryMetrics {
    fn on_track(&self) {
        self.events_tracked.add(1, &[]);
    }

    fn on_cycle_start(&self) {
        self.cycles_started.add(1, &[]);
    }

    fn on_attempt(&self, batch_len: usize, outcome: &AttemptOutcome) {
        let attrs = [KeyValue::new("delivered", outcome.is_delivered())];
        self.batch_size.record(batch_len as u64, &attrs);
        if outcome.is_delivered() {
            self.batches_sent.add(1, &[]);
        } else {
            self.batches_failed.add(1, &[]);
        }
    }

    fn on_cycle_end(&self, end: CycleEnd) {
        if end == CycleEnd::Exhausted {
            self.cycles_exhausted.add(1, &[]);
        }
    }
}

/// Installed telemetry; keep it alive for the life of the process.
pub struct Telemetry {
    pub metrics: Arc<DeliveryMetrics>,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    /// Flush and stop the exporters.
    pub fn shutdown(self) {
        global::shutdown_tracer_provider();
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!("Failed to shut down meter provider: {}", e);
        }
    }
}

/// Build delivery metrics, exporting over OTLP when an endpoint is given.
pub fn init_metrics(
    service_name: &str,
    otlp_endpoint: Option<&str>,
) -> anyhow::Result<(SdkMeterProvider, Arc<DeliveryMetrics>)> {
    let meter_provider = if let Some(endpoint) = otlp_endpoint {
        opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .build()?
    } else {
        SdkMeterProvider::default()
    };

    let meter = meter_provider.meter(service_name.to_string());
    let metrics = Arc::new(DeliveryMetrics::new(&meter));
    Ok((meter_provider, metrics))
}

/// Initialize telemetry (tracing + metrics).
///
/// Logs go to stderr, as JSON when `json` is set. `RUST_LOG` controls the
/// filter.
pub fn init_telemetry(
    service_name: &str,
    otlp_endpoint: Option<&str>,
    json: bool,
) -> anyhow::Result<Telemetry> {
    let tracer_provider = if let Some(endpoint) = otlp_endpoint {
        opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .with_trace_config(
                opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![KeyValue::new(
                        "service.name",
                        service_name.to_string(),
                    )]),
                ),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?
    } else {
        opentelemetry_sdk::trace::TracerProvider::builder().build()
    };

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);

    let (meter_provider, metrics) = init_metrics(service_name, otlp_endpoint)?;

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let text_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(Telemetry {
        metrics,
        meter_provider,
    })
}
