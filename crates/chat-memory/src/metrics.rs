use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static ACTIVE_STREAMS: OnceLock<IntGauge> = OnceLock::new();
static BACKUPS: OnceLock<IntCounterVec> = OnceLock::new();
static FLUSHED_RECORDS: OnceLock<IntCounter> = OnceLock::new();

pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .unwrap()
    });

    let active_streams = ACTIVE_STREAMS.get_or_init(|| {
        IntGauge::new("active_streams", "Chat streams currently in flight").unwrap()
    });

    let backups = BACKUPS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("backups_total", "Session backups by trigger"),
            &["trigger"],
        )
        .unwrap()
    });

    let flushed_records = FLUSHED_RECORDS.get_or_init(|| {
        IntCounter::new("flushed_records_total", "Records flushed to durable storage").unwrap()
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(active_streams.clone())).ok();
    REGISTRY.register(Box::new(backups.clone())).ok();
    REGISTRY.register(Box::new(flushed_records.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_streams() {
    if let Some(gauge) = ACTIVE_STREAMS.get() {
        gauge.inc();
    }
}

pub fn dec_streams() {
    if let Some(gauge) = ACTIVE_STREAMS.get() {
        gauge.dec();
    }
}

pub fn observe_backup(trigger: &str, flushed: usize) {
    if let Some(counter) = BACKUPS.get() {
        counter.with_label_values(&[trigger]).inc();
    }
    if let Some(counter) = FLUSHED_RECORDS.get() {
        counter.inc_by(flushed as u64);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
