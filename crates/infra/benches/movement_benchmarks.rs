use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use stockflow_core::{DocumentType, ProductId, UserId, WarehouseId};
use stockflow_infra::{InMemoryDirectory, InventoryConfig, InventoryEngine, InMemoryInventoryStore};
use stockflow_inventory::DocumentReference;
use stockflow_transfers::NewTransfer;
use tokio::runtime::Runtime;
use uuid::Uuid;

struct Setup {
    engine: InventoryEngine<InMemoryInventoryStore>,
    directory: Arc<InMemoryDirectory>,
    user: UserId,
}

fn setup() -> Setup {
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = InventoryEngine::in_memory(directory.clone(), &InventoryConfig::default());
    let user = UserId::new();
    directory.add_user(user);
    Setup {
        engine,
        directory,
        user,
    }
}

impl Setup {
    fn key(&self) -> (ProductId, WarehouseId) {
        let (product, warehouse) = (ProductId::new(), WarehouseId::new());
        self.directory.add_product(product);
        self.directory.add_warehouse(warehouse);
        (product, warehouse)
    }
}

fn reference() -> DocumentReference {
    DocumentReference::new(DocumentType::Manual, Uuid::now_v7(), "BENCH")
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_single_movement_latency(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("single_movement_latency");

    group.bench_function("purchase_existing_snapshot", |b| {
        let s = setup();
        let (product, warehouse) = s.key();
        rt.block_on(s.engine.coordinator().initial_stock(product, warehouse, 1, s.user, reference()))
            .unwrap();
        b.iter(|| {
            let outcome = rt
                .block_on(s.engine.coordinator().purchase(product, warehouse, 1, s.user, reference(), None))
                .unwrap();
            black_box(outcome);
        });
    });

    group.bench_function("purchase_then_sale", |b| {
        let s = setup();
        let (product, warehouse) = s.key();
        b.iter(|| {
            rt.block_on(async {
                let coordinator = s.engine.coordinator();
                coordinator.purchase(product, warehouse, 5, s.user, reference(), None).await.unwrap();
                let outcome = coordinator.sale(product, warehouse, 5, s.user, reference(), None).await.unwrap();
                black_box(outcome);
            });
        });
    });

    group.finish();
}

fn bench_concurrent_sales(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("concurrent_sales");

    for tasks in [1usize, 8, 64].iter() {
        group.throughput(Throughput::Elements(*tasks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), tasks, |b, &tasks| {
            let s = setup();
            let (product, warehouse) = s.key();
            b.iter(|| {
                rt.block_on(async {
                    s.engine
                        .coordinator()
                        .purchase(product, warehouse, tasks as i64, s.user, reference(), None)
                        .await
                        .unwrap();
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let engine = s.engine.clone();
                            let user = s.user;
                            tokio::spawn(async move {
                                engine.coordinator().sale(product, warehouse, 1, user, reference(), None).await
                            })
                        })
                        .collect();
                    for handle in handles {
                        black_box(handle.await.unwrap().unwrap());
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_transfer_ship_and_receive(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("transfer_ship_and_receive");

    for items in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(items), items, |b, &items| {
            let s = setup();
            let (from, to) = (WarehouseId::new(), WarehouseId::new());
            s.directory.add_warehouse(from);
            s.directory.add_warehouse(to);
            let products: Vec<ProductId> = (0..items)
                .map(|_| {
                    let product = ProductId::new();
                    s.directory.add_product(product);
                    product
                })
                .collect();

            b.iter(|| {
                rt.block_on(async {
                    let coordinator = s.engine.coordinator();
                    for product in &products {
                        coordinator.purchase(*product, from, 2, s.user, reference(), None).await.unwrap();
                    }

                    let transfers = s.engine.transfers();
                    let created = transfers
                        .create(NewTransfer {
                            from_warehouse: from,
                            to_warehouse: to,
                            items: products.iter().map(|p| (*p, 2)).collect(),
                            requested_by: s.user,
                            expected_delivery_date: None,
                            notes: None,
                        })
                        .await
                        .unwrap();
                    let id = created.document.id();
                    transfers.submit(id).await.unwrap();
                    transfers.approve(id, s.user).await.unwrap();
                    transfers.ship(id, s.user, None).await.unwrap();
                    let lines = products
                        .iter()
                        .map(|p| stockflow_transfers::ReceiptLine {
                            product_id: *p,
                            received_quantity: 2,
                        })
                        .collect();
                    black_box(transfers.receive(id, lines, s.user).await.unwrap());
                });
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_movement_latency,
    bench_concurrent_sales,
    bench_transfer_ship_and_receive
);
criterion_main!(benches);
