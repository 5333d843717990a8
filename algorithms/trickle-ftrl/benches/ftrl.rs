use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use sprs::{CsMat, TriMat};
use trickle::prelude::*;
use trickle_ftrl::{FmFtrl, Ftrl};

fn sparse_batch(nrows: usize, ncols: usize, density: f64, seed: u64) -> (CsMat<f64>, Array1<bool>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let mut triplets = TriMat::new((nrows, ncols));
    for i in 0..nrows {
        for j in 0..ncols {
            if rng.gen::<f64>() < density {
                triplets.add_triplet(i, j, rng.gen_range(-1.0..1.0));
            }
        }
    }
    let targets = (0..nrows).map(|_| rng.gen()).collect();
    (triplets.to_csr(), targets)
}

fn bench_linear_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ftrl-fit");
    for &nfeatures in &[100usize, 1_000, 10_000] {
        let (x, y) = sparse_batch(2_000, nfeatures, 0.05, 42);
        let dataset = DatasetBase::new(x, y);
        group.bench_with_input(
            BenchmarkId::from_parameter(nfeatures),
            &dataset,
            |b, dataset| {
                let params = Ftrl::<f64>::params().l1_penalty(0.1);
                b.iter(|| params.clone().fit_with(None, black_box(dataset)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_fm_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fm-ftrl-fit");
    for &embedding_dim in &[4usize, 8, 16] {
        let (x, y) = sparse_batch(1_000, 1_000, 0.05, 7);
        let dataset = DatasetBase::new(x, y);
        group.bench_with_input(
            BenchmarkId::from_parameter(embedding_dim),
            &dataset,
            |b, dataset| {
                let params = FmFtrl::<f64>::params().embedding_dim(embedding_dim);
                b.iter(|| params.clone().fit_with(None, black_box(dataset)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_linear_predict(c: &mut Criterion) {
    let (x, y) = sparse_batch(5_000, 1_000, 0.05, 3);
    let dataset = DatasetBase::new(x, y);
    let model = Ftrl::<f64>::params()
        .fit_with(None, &dataset)
        .unwrap();

    c.bench_function("ftrl-predict", |b| {
        b.iter(|| model.try_predict(black_box(dataset.records())).unwrap())
    });
}

criterion_group!(
    benches,
    bench_linear_fit,
    bench_fm_fit,
    bench_linear_predict
);
criterion_main!(benches);
