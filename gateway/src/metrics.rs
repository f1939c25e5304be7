use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLL_CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_poll_cycles_total",
        "Total poll cycles started"
    ))
    .unwrap();
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_poll_failures_total",
        "Total poll cycles abandoned on an upstream failure"
    ))
    .unwrap();
    pub static ref DEVICES_UPDATED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_devices_updated_total",
        "Total device records merged into the state table"
    ))
    .unwrap();
    pub static ref RECORDS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_records_skipped_total",
        "Total upstream nodes dropped for lack of a device serial"
    ))
    .unwrap();
    pub static ref BROADCASTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_broadcasts_total",
        "Total messages fanned out to subscribers"
    ))
    .unwrap();
    pub static ref SUBSCRIBERS_PRUNED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "gateway_subscribers_pruned_total",
        "Total subscribers dropped after a failed send"
    ))
    .unwrap();
    pub static ref TRACKED_DEVICES: Gauge = Gauge::with_opts(Opts::new(
        "gateway_tracked_devices",
        "Devices currently held in the state table"
    ))
    .unwrap();
    pub static ref SUBSCRIBERS: Gauge = Gauge::with_opts(Opts::new(
        "gateway_subscribers",
        "Currently registered subscribers"
    ))
    .unwrap();
    pub static ref FETCH_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gateway_fetch_latency_seconds",
            "Time taken to fetch topologies from upstream"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(POLL_CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEVICES_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECORDS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BROADCASTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIBERS_PRUNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKED_DEVICES.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIBERS.clone()))?;
    REGISTRY.register(Box::new(FETCH_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
}
