//! Metrics collection.
//!
//! # Metrics
//! - `flock_fetch_requests_total` (counter): requests by mode, outcome
//! - `flock_fetch_exchange_duration_seconds` (histogram): exchange latency by outcome
//! - `flock_fetch_discovery_total` (counter): appliance lookups by outcome
//! - `flock_fetch_login_total` (counter): persona logins by outcome
//! - `flock_fetch_cache_lookups_total` (counter): hit, miss, error
//! - `flock_fetch_cache_store_failures_total` (counter)
//!
//! # Design Decisions
//! - Labels are static strings, never URLs or persona ids
//! - Exposition is left to the embedding application's recorder

use std::time::Duration;

use metrics::{counter, histogram};

/// `mode` is `appliance` or `passthrough`; `outcome` is `success` or an error kind.
pub fn record_request(mode: &'static str, outcome: &'static str) {
    counter!("flock_fetch_requests_total", "mode" => mode, "outcome" => outcome).increment(1);
}

pub fn record_exchange(outcome: &'static str, elapsed: Duration) {
    histogram!("flock_fetch_exchange_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn record_discovery(outcome: &'static str) {
    counter!("flock_fetch_discovery_total", "outcome" => outcome).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!("flock_fetch_login_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("flock_fetch_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_store_failure() {
    counter!("flock_fetch_cache_store_failures_total").increment(1);
}
