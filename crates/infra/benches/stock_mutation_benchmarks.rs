use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use kade_core::ProductId;
use kade_infra::{
    EngineConfig, InMemoryInventoryStore, LowStockDetector, MovementRequest, RecordingNotifier,
    ReorderOrchestrator, StockMutationEngine,
};
use kade_inventory::{NewProduct, Price};
use tokio::runtime::Runtime;

type Engine = StockMutationEngine<Arc<InMemoryInventoryStore>>;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn seeded_engine(rt: &Runtime, products: i64, stock: i64, reorder_level: i64) -> Arc<Engine> {
    let engine = Arc::new(StockMutationEngine::new(
        Arc::new(InMemoryInventoryStore::new()),
        EngineConfig::default(),
    ));
    rt.block_on(async {
        for id in 1..=products {
            engine
                .create_product(NewProduct {
                    product_id: ProductId::new(id),
                    name: format!("Bench product {id}"),
                    price: Price::new(199).unwrap(),
                    stock,
                    reorder_level: Some(reorder_level),
                    category: "Bench".to_string(),
                })
                .await
                .unwrap();
        }
    });
    engine
}

fn bench_movement_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("movement_latency");

    group.bench_function("restock_single_product", |b| {
        let engine = seeded_engine(&rt, 1, 0, 10);
        b.iter(|| {
            rt.block_on(engine.apply_movement(MovementRequest::restock(ProductId::new(1), 1)))
                .unwrap();
        });
    });

    group.bench_function("rejected_sale", |b| {
        let engine = seeded_engine(&rt, 1, 0, 10);
        b.iter(|| {
            let result =
                rt.block_on(engine.apply_movement(MovementRequest::sale(ProductId::new(1), 5)));
            black_box(result.is_err());
        });
    });

    group.finish();
}

fn bench_contended_sales(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended_sales");

    for tasks in [4usize, 16, 64].iter() {
        group.throughput(Throughput::Elements(*tasks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), tasks, |b, &tasks| {
            let engine = seeded_engine(&rt, 1, i64::MAX / 2, 10);
            b.iter(|| {
                rt.block_on(async {
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let engine = Arc::clone(&engine);
                            tokio::spawn(async move {
                                engine
                                    .apply_movement(MovementRequest::sale(ProductId::new(1), 1))
                                    .await
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap().unwrap();
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_detection_and_reorder(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reorder");

    for products in [10i64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("detect", products), products, |b, &n| {
            let engine = seeded_engine(&rt, n, 5, 10);
            let detector = LowStockDetector::new(Arc::clone(engine.store()));
            b.iter(|| black_box(rt.block_on(detector.detect()).unwrap().len()));
        });

        group.bench_with_input(
            BenchmarkId::new("build_and_process", products),
            products,
            |b, &n| {
                b.iter_batched(
                    || seeded_engine(&rt, n, 5, 10),
                    |engine| {
                        let orchestrator = ReorderOrchestrator::new(engine, RecordingNotifier::new());
                        black_box(rt.block_on(orchestrator.build_and_process()).unwrap())
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_movement_latency,
    bench_contended_sales,
    bench_detection_and_reorder
);
criterion_main!(benches);
