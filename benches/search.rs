use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::prelude::*;
use scentid::catalog::{EmbeddingCatalog, FeatureRecord};
use scentid::normalize::l2_normalize;
use scentid::search::{find_top_k, rank_with_color};

const EMBEDDING_DIM: usize = 2048;
const COLOR_DIM: usize = 512;

fn random_unit(rng: &mut impl Rng, dim: usize) -> Vec<f32> {
    let v = (0..dim).map(|_| rng.random_range(-1f32..1.)).collect::<Vec<_>>();
    l2_normalize(&v)
}

fn random_catalog(rng: &mut impl Rng, n: usize) -> EmbeddingCatalog {
    let records = (0..n)
        .map(|i| {
            let color = rng.random_bool(0.8).then(|| random_unit(rng, COLOR_DIM));
            FeatureRecord::new(i as i64 / 4, random_unit(rng, EMBEDDING_DIM), color)
        })
        .collect();
    EmbeddingCatalog::new(records, EMBEDDING_DIM).unwrap()
}

fn bench_search(c: &mut Criterion) {
    let mut rng = rand::rng();
    let query = random_unit(&mut rng, EMBEDDING_DIM);
    let query_color = random_unit(&mut rng, COLOR_DIM);

    let mut group = c.benchmark_group("特征检索");
    for n in [1000, 10000] {
        let catalog = random_catalog(&mut rng, n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("嵌入", n), &catalog, |b, catalog| {
            b.iter(|| find_top_k(black_box(&query), catalog, 3))
        });
        group.bench_with_input(BenchmarkId::new("嵌入 + 颜色", n), &catalog, |b, catalog| {
            b.iter(|| rank_with_color(black_box(&query), &query_color, catalog, 3, 32, 0.2))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
