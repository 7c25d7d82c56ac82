use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use custseg::{scan, KMeans, Standardizer};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

const N_FEATURES: usize = 9;

fn random_customers(n_samples: usize) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    Array2::from_shape_fn((n_samples, N_FEATURES), |_| rng.gen_range(-1.0..1.0))
}

fn benchmark_kmeans_varying_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_samples");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    for n_samples in [1_000, 5_000, 20_000].iter() {
        group.throughput(Throughput::Elements(*n_samples as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_samples),
            n_samples,
            |b, &n_samples| {
                let data = random_customers(n_samples);
                let params = KMeans::new(5).with_seed(42).with_max_iters(20);

                b.iter(|| params.fit(black_box(&data)).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_elbow_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("elbow_scan");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(3));

    let data = random_customers(2_000);
    for k_max in [5, 10].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(k_max), k_max, |b, &k_max| {
            b.iter(|| scan(black_box(&data), 1..=k_max, 42).unwrap());
        });
    }
    group.finish();
}

fn benchmark_standardize(c: &mut Criterion) {
    let data = random_customers(20_000);

    c.bench_function("standardize_fit_transform", |b| {
        b.iter(|| {
            let mut scaler = Standardizer::new();
            scaler.fit_transform(black_box(&data)).unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_kmeans_varying_samples,
    benchmark_elbow_scan,
    benchmark_standardize
);
criterion_main!(benches);
