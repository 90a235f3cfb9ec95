use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to build prometheus exporter: {0}")]
    Exporter(String),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    diagnosis_duration: Histogram<u64>,
    regions_detected: Counter<u64>,
    label_counter: Counter<u64>,
    pub registry: Registry,
    _provider: SdkMeterProvider,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| MetricsError::Exporter(e.to_string()))?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("diagnosis_service");
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("diagnose_requests_total")
            .with_description("Total number of diagnose requests by outcome")
            .build();

        let boundaries = generate_boundaries((10, 100, 500, 2000, 10000));

        let diagnosis_duration = meter
            .u64_histogram("diagnosis_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of the detect, classify and annotate pipeline in milliseconds")
            .build();

        let regions_detected = meter
            .u64_counter("regions_detected_total")
            .with_description("Total number of regions returned by the detector")
            .build();

        let label_counter = meter
            .u64_counter("diagnosis_labels_total")
            .with_description("Total number of assigned diagnosis labels")
            .build();

        Ok(Metrics {
            request_counter,
            diagnosis_duration,
            regions_detected,
            label_counter,
            registry,
            _provider: provider,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        let attributes = [KeyValue::new("outcome", outcome.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_diagnosis_duration(&self, duration_ms: u64) {
        self.diagnosis_duration.record(duration_ms, &[]);
    }

    pub fn record_labels<'a>(&self, labels: impl Iterator<Item = &'a str>) {
        let mut regions = 0;
        for label in labels {
            regions += 1;
            self.label_counter
                .add(1, &[KeyValue::new("label", label.to_string())]);
        }
        self.regions_detected.add(regions, &[]);
    }
}

/// Histogram buckets: fine steps for fast requests, coarser ones in the tail.
fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 50;
    let end_step: usize = 250;
    let tail_step: usize = 2000;
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
