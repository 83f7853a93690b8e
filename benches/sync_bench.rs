//! Sync Benchmarks — Hot-Path Performance Validation
//!
//! Benchmarks the work done on every fetch outcome: computing the next
//! delay and fanning one payload out to many subscribers.
//!
//! Run with: cargo bench --bench sync_bench

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use scalix_realtime_sync::domain::backoff::BackoffPolicy;
use scalix_realtime_sync::domain::connection::ConnectionMonitor;
use scalix_realtime_sync::domain::topic::{LiveStats, Topic, TopicPayload};
use scalix_realtime_sync::usecases::bus::{self, Callback};

/// Benchmark the jittered backoff delay.
fn bench_backoff_delay(c: &mut Criterion) {
    let policy = BackoffPolicy::default();
    let base = Duration::from_secs(5);

    c.bench_function("backoff_delay_jittered", |b| {
        b.iter(|| {
            let _delay = policy.delay(black_box(base), black_box(3));
        });
    });
}

/// Benchmark folding alternating outcomes into the connection monitor.
fn bench_connection_monitor(c: &mut Criterion) {
    c.bench_function("connection_monitor_flip", |b| {
        let mut monitor = ConnectionMonitor::new();
        let mut ok = false;
        b.iter(|| {
            ok = !ok;
            let _event = if black_box(ok) {
                monitor.record_success()
            } else {
                monitor.record_failure("unreachable")
            };
        });
    });
}

/// Benchmark delivering one payload to 100 subscribers.
fn bench_dispatch_fan_out(c: &mut Criterion) {
    let counter = Arc::new(AtomicU64::new(0));
    let callbacks: Vec<Callback> = (0..100)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let callback: Callback = Arc::new(move |payload: Arc<TopicPayload>| {
                if payload.as_live_stats().is_some() {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
            callback
        })
        .collect();

    let payload = Arc::new(TopicPayload::LiveStats(LiveStats {
        active_subscriptions: 1200,
        monthly_api_calls: 4,
        platform_uptime: "99.9%".to_string(),
        avg_response_time: "1.2s".to_string(),
    }));

    c.bench_function("dispatch_100_subscribers", |b| {
        b.iter(|| bus::dispatch(Topic::LiveStats, black_box(&callbacks), &payload));
    });
}

criterion_group!(
    benches,
    bench_backoff_delay,
    bench_connection_monitor,
    bench_dispatch_fan_out,
);
criterion_main!(benches);
