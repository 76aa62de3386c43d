//! End-to-end tests: engine → store → detector → orchestrator → notifier.
//!
//! Verifies:
//! - Stock always equals the ledger reconstruction
//! - Concurrent sales never oversell
//! - Reorder batches isolate per-item failures

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kade_core::{AggregateRoot, ProductId};
    use kade_inventory::{Direction, NewProduct, Price, net_change};

    use crate::engine::{EngineConfig, MovementRequest, MutationError, StockMutationEngine};
    use crate::notify::RecordingNotifier;
    use crate::reorder::{ItemOutcome, NotificationStatus, ReorderOrchestrator};
    use crate::store::{
        CatalogStore, InMemoryInventoryStore, MovementOrder, SharedStore, StockLedger,
    };
    use crate::LowStockDetector;
    use kade_inventory::BatchState;

    fn new_product(id: i64, stock: i64, reorder_level: Option<i64>) -> NewProduct {
        NewProduct {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Price::new(1_250).unwrap(),
            stock,
            reorder_level,
            category: "Grocery".to_string(),
        }
    }

    fn setup() -> (Arc<StockMutationEngine<SharedStore>>, SharedStore) {
        let store: SharedStore = Arc::new(InMemoryInventoryStore::new());
        let engine = Arc::new(StockMutationEngine::new(
            Arc::clone(&store),
            EngineConfig::default(),
        ));
        (engine, store)
    }

    #[tokio::test]
    async fn low_stock_product_is_restocked_out_of_the_low_set() {
        let (engine, store) = setup();
        engine.create_product(new_product(1, 5, Some(10))).await.unwrap();
        let detector = LowStockDetector::new(Arc::clone(&store));

        let low = detector.detect().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].reorder_quantity(), 5);

        let orchestrator = ReorderOrchestrator::new(Arc::clone(&engine), RecordingNotifier::new());
        let batch = orchestrator.build_reorder_batch().await.unwrap();
        assert_eq!(batch.lines()[0].reorder_quantity, 5);

        engine
            .apply_movement(MovementRequest::restock(ProductId::new(1), 5))
            .await
            .unwrap();
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 10);
        assert!(detector.detect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_sale_leaves_no_trace_and_never_succeeds_on_retry() {
        let (engine, store) = setup();
        engine.create_product(new_product(2, 3, None)).await.unwrap();

        for _ in 0..3 {
            let err = engine
                .apply_movement(MovementRequest::sale(ProductId::new(2), 5))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                MutationError::InsufficientStock {
                    available: 3,
                    requested: 5,
                    ..
                }
            ));
        }
        assert_eq!(store.find(ProductId::new(2)).await.unwrap().stock(), 3);
        assert!(store.list_for_product(ProductId::new(2)).await.unwrap().is_empty());

        engine
            .apply_movement(MovementRequest::restock(ProductId::new(2), 2))
            .await
            .unwrap();
        engine
            .apply_movement(MovementRequest::sale(ProductId::new(2), 5))
            .await
            .unwrap();
        assert_eq!(store.find(ProductId::new(2)).await.unwrap().stock(), 0);
    }

    #[tokio::test]
    async fn batch_with_deleted_product_reports_not_found_for_that_item_only() {
        let (engine, store) = setup();
        for id in 1..=3 {
            engine.create_product(new_product(id, 1, Some(6))).await.unwrap();
        }
        let orchestrator = ReorderOrchestrator::new(Arc::clone(&engine), RecordingNotifier::new());
        let mut batch = orchestrator.build_reorder_batch().await.unwrap();
        assert_eq!(batch.lines().len(), 3);

        engine.delete_product(ProductId::new(2)).await.unwrap();
        let report = orchestrator.process_batch(&mut batch).await.unwrap();

        assert_eq!(report.state, BatchState::Failed);
        for item in &report.items {
            if item.product_id == ProductId::new(2) {
                assert_eq!(item.outcome, ItemOutcome::Error);
                assert_eq!(item.error.as_deref(), Some("not_found"));
            } else {
                assert_eq!(item.outcome, ItemOutcome::Success);
            }
        }
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 6);
        assert_eq!(store.find(ProductId::new(3)).await.unwrap().stock(), 6);
        assert!(store.list_for_product(ProductId::new(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stock_matches_ledger_after_mixed_movements() {
        let (engine, store) = setup();
        let initial = 7;
        engine.create_product(new_product(1, initial, None)).await.unwrap();
        let id = ProductId::new(1);

        let requests = [
            MovementRequest::restock(id, 4),
            MovementRequest::sale(id, 3),
            MovementRequest::sale(id, 50),
            MovementRequest::adjustment(id, 2, Direction::Decrease),
            MovementRequest::adjustment(id, 9, Direction::Increase),
            MovementRequest::restock(id, 0),
            MovementRequest::sale(id, 15),
        ];
        for request in requests {
            let _ = engine.apply_movement(request).await;
        }

        let product = store.find(id).await.unwrap();
        let ledger = store.list_for_product(id).await.unwrap();
        assert_eq!(product.stock(), initial + net_change(&ledger));
        assert_eq!(product.stock(), 0);
        assert_eq!(ledger.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sales_never_oversell() {
        let (engine, store) = setup();
        engine.create_product(new_product(1, 5, None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .apply_movement(MovementRequest::sale(ProductId::new(1), 1))
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(err, MutationError::InsufficientStock { .. })),
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 0);
        assert_eq!(store.list_movements(MovementOrder::NewestFirst).await.unwrap().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_engines_on_one_store_are_guarded_by_version() {
        let store: SharedStore = Arc::new(InMemoryInventoryStore::new());
        let engines: Vec<_> = (0..2)
            .map(|_| Arc::new(StockMutationEngine::new(Arc::clone(&store), EngineConfig::default())))
            .collect();
        engines[0].create_product(new_product(1, 20, None)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..60 {
            let engine = Arc::clone(&engines[i % 2]);
            handles.push(tokio::spawn(async move {
                engine
                    .apply_movement(MovementRequest::sale(ProductId::new(1), 1))
                    .await
            }));
        }

        let mut succeeded = 0i64;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(
                    err,
                    MutationError::InsufficientStock { .. } | MutationError::Conflict(_)
                )),
            }
        }

        let product = store.find(ProductId::new(1)).await.unwrap();
        let ledger = store.list_for_product(ProductId::new(1)).await.unwrap();
        assert!(succeeded <= 20);
        assert_eq!(product.stock(), 20 - succeeded);
        assert_eq!(ledger.len() as i64, succeeded);
        assert!(product.stock() >= 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_products_mutate_independently() {
        let (engine, store) = setup();
        for id in 1..=4 {
            engine.create_product(new_product(id, 0, None)).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in 1..=4 {
            for _ in 0..10 {
                let engine = Arc::clone(&engine);
                handles.push(tokio::spawn(async move {
                    engine
                        .apply_movement(MovementRequest::restock(ProductId::new(id), 2))
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for product in store.list_all().await.unwrap() {
            assert_eq!(product.stock(), 20);
            assert_eq!(product.version(), 10);
        }
    }

    #[tokio::test]
    async fn full_run_notifies_about_restocked_lines() {
        let (engine, store) = setup();
        engine.create_product(new_product(1, 2, Some(10))).await.unwrap();
        engine.create_product(new_product(2, 30, Some(10))).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = ReorderOrchestrator::new(Arc::clone(&engine), Arc::clone(&notifier));

        let run = orchestrator.run("orders@supplier.test").await.unwrap();
        assert_eq!(run.report.state, BatchState::Completed);
        assert_eq!(run.notification.status, NotificationStatus::Sent);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "orders@supplier.test");
        assert_eq!(sent[0].notices[0].product_name, "Product 1");
        assert_eq!(sent[0].notices[0].reorder_quantity, 8);
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().stock(), 10);
    }

    #[tokio::test]
    async fn ledger_lists_newest_first_and_survives_deletion() {
        let (engine, store) = setup();
        engine.create_product(new_product(1, 10, None)).await.unwrap();
        let first = engine
            .apply_movement(MovementRequest::sale(ProductId::new(1), 1))
            .await
            .unwrap();
        let second = engine
            .apply_movement(MovementRequest::restock(ProductId::new(1), 3))
            .await
            .unwrap();
        engine.delete_product(ProductId::new(1)).await.unwrap();

        let newest = store.list_movements(MovementOrder::NewestFirst).await.unwrap();
        assert_eq!(newest, vec![second.movement.clone(), first.movement.clone()]);
        assert_eq!(first.movement.total_price, Some(1_250));
        assert!(store.find(ProductId::new(1)).await.is_err());
    }

    mod proptest_tests {
        use super::*;
        use kade_inventory::MovementType;
        use proptest::prelude::*;

        fn arb_request() -> impl Strategy<Value = (MovementType, i64, bool)> {
            (
                prop_oneof![
                    Just(MovementType::Restock),
                    Just(MovementType::Sale),
                    Just(MovementType::Adjustment),
                ],
                -2i64..25,
                any::<bool>(),
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 48,
                ..ProptestConfig::default()
            })]

            /// Property: whatever the engine accepts, the stored stock equals the
            /// initial stock plus the ledger's net change and stays non-negative.
            #[test]
            fn committed_stock_matches_ledger(
                initial in 0i64..30,
                requests in proptest::collection::vec(arb_request(), 0..40)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let (stock, ledger_net, accepted, ledger_len) = rt.block_on(async {
                    let (engine, store) = setup();
                    engine.create_product(new_product(1, initial, None)).await.unwrap();
                    let mut accepted = 0usize;
                    for (movement_type, quantity, decrease) in requests {
                        let request = MovementRequest {
                            product_id: ProductId::new(1),
                            movement_type,
                            quantity,
                            direction: if decrease { Direction::Decrease } else { Direction::Increase },
                        };
                        if engine.apply_movement(request).await.is_ok() {
                            accepted += 1;
                        }
                    }
                    let product = store.find(ProductId::new(1)).await.unwrap();
                    let ledger = store.list_for_product(ProductId::new(1)).await.unwrap();
                    (product.stock(), net_change(&ledger), accepted, ledger.len())
                });

                prop_assert!(stock >= 0);
                prop_assert_eq!(stock, initial + ledger_net);
                prop_assert_eq!(accepted, ledger_len);
            }
        }
    }
}
