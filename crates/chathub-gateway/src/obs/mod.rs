//! Lightweight in-process metrics.
//!
//! Counters and gauges are plain atomics; labelled counters are keyed in a
//! `DashMap`. Everything is rendered in Prometheus text format by `/metrics`.

pub mod metrics;
