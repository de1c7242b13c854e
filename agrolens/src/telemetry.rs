use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(log_level: &str) {
    let log_level = format!("{},ort=info", log_level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();
}

pub struct Metrics {
    // Dropping the last handle shuts the exporter down.
    _provider: SdkMeterProvider,
    request_counter: Counter<u64>,
    diagnosis_duration: Histogram<u64>,
    diagnosis_outcomes: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("agrolens");
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let boundaries = generate_boundaries((10, 50, 100, 500, 2000));

        let diagnosis_duration = meter
            .u64_histogram("diagnosis_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of image diagnosis in milliseconds")
            .build();

        let diagnosis_outcomes = meter
            .u64_counter("diagnosis_outcomes_total")
            .with_description("Image diagnoses by response status")
            .build();

        Ok(Metrics {
            _provider: provider,
            request_counter,
            diagnosis_duration,
            diagnosis_outcomes,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_diagnosis_duration(&self, duration_ms: u64) {
        self.diagnosis_duration.record(duration_ms, &[]);
    }

    pub fn record_diagnosis_outcome(&self, status: u16) {
        let attributes = vec![KeyValue::new("status", status as i64)];
        self.diagnosis_outcomes.add(1, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
