/// Outlier filter and sample parser benchmarks
///
/// Sized after a default run: 1000 trials × 100 offsets per metric.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibbench::matrix::TimingMatrix;
use fibbench::outlier::OutlierFilter;
use fibbench::sample::parse_samples;

/// Deterministic jittery timings with an occasional spike
fn synthetic_matrix(trials: usize, offsets: usize, seed: u64) -> TimingMatrix {
    let mut matrix = TimingMatrix::with_capacity(trials, offsets);
    let mut state = seed;
    for _ in 0..trials {
        let row: Vec<f64> = (0..offsets)
            .map(|offset| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let jitter = (state % 50) as f64;
                let spike = if state % 97 == 0 { 5000.0 } else { 0.0 };
                100.0 + offset as f64 * 12.0 + jitter + spike
            })
            .collect();
        matrix.push_trial(&row).expect("row width matches");
    }
    matrix
}

fn bench_filter_trials(c: &mut Criterion) {
    let mut group = c.benchmark_group("outlier_filter");
    let filter = OutlierFilter::default();

    for trials in [100usize, 1000] {
        let matrix = synthetic_matrix(trials, 100, 0x2545_F491_4F6C_DD1D);
        group.throughput(Throughput::Elements((trials * 100) as u64));
        group.bench_with_input(BenchmarkId::new("apply", trials), &matrix, |b, m| {
            b.iter(|| black_box(filter.apply(black_box(m)).expect("enough trials")));
        });
    }

    group.finish();
}

fn bench_difference_and_filter(c: &mut Criterion) {
    let user = synthetic_matrix(1000, 100, 0x2545_F491_4F6C_DD1D);
    let kernel = synthetic_matrix(1000, 100, 0x9E37_79B9_7F4A_7C15);
    let filter = OutlierFilter::default();

    c.bench_function("kernel_to_user_1000x100", |b| {
        b.iter(|| {
            let diff = user.difference(&kernel).expect("same shape");
            black_box(filter.apply(&diff).expect("enough trials"))
        });
    });
}

fn bench_parse_samples(c: &mut Criterion) {
    let text: String = (0..=100)
        .map(|i| format!("{} {} {}\n", i, 900 + i * 3, 400 + i * 2))
        .collect();

    c.bench_function("parse_samples_100", |b| {
        b.iter(|| black_box(parse_samples(black_box(&text), 100).expect("valid sample file")));
    });
}

criterion_group!(
    benches,
    bench_filter_trials,
    bench_difference_and_filter,
    bench_parse_samples
);

criterion_main!(benches);
