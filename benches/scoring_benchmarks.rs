use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scorewatch::alerts::{LogNotifier, MemoryStore};
use scorewatch::analytics::{AnomalyDetector, DetectionRequest};
use scorewatch::clock::SystemClock;
use scorewatch::config::AppConfig;
use scorewatch::ServiceState;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// スコアリングパイプラインのベンチマーク
///
/// 系列長ごとの学習・判定コストと、キャッシュヒット時のコストを測定します。

fn synthetic_scores(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let base = 50.0 + (i as f64 * 0.3).sin() * 5.0;
            if i % 41 == 0 {
                base * 3.0
            } else {
                base
            }
        })
        .collect()
}

fn synthetic_request(len: usize) -> DetectionRequest {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    DetectionRequest {
        dates: (0..len)
            .map(|i| (start + chrono::Duration::days(i as i64)).to_string())
            .collect(),
        scores: synthetic_scores(len),
    }
}

fn bench_flag_anomalies(c: &mut Criterion) {
    let detector = AnomalyDetector::default();
    let mut group = c.benchmark_group("flag_anomalies");

    for size in [10, 100, 500, 1000].iter() {
        let scores = synthetic_scores(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &scores, |b, scores| {
            b.iter(|| detector.flag_anomalies(black_box(scores)).unwrap())
        });
    }

    group.finish();
}

fn bench_cached_detection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let state = ServiceState::new(
        AppConfig::default(),
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
        Arc::new(MemoryStore::new()),
    );
    let request = synthetic_request(1000);
    rt.block_on(state.detect(&request, None)).unwrap();

    c.bench_function("cached_detection_1000", |b| {
        b.to_async(&rt)
            .iter(|| async { state.detect(black_box(&request), None).await.unwrap() })
    });
}

criterion_group!(benches, bench_flag_anomalies, bench_cached_detection);
criterion_main!(benches);
