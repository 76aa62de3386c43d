use std::sync::Arc;

use kade_infra::{
    InMemoryInventoryStore, InfraConfig, LowStockDetector, PostgresInventoryStore, ReorderNotifier,
    ReorderOrchestrator, SharedStore, StockMutationEngine, StoreError, TracingNotifier,
};

pub type Engine = StockMutationEngine<SharedStore>;
pub type Notifier = Arc<dyn ReorderNotifier>;
pub type Orchestrator = ReorderOrchestrator<SharedStore, Notifier>;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub store: SharedStore,
    pub engine: Arc<Engine>,
    pub detector: LowStockDetector<SharedStore>,
    pub orchestrator: Orchestrator,
    /// Destination used when a reorder request names none.
    pub reorder_contact: String,
}

impl AppServices {
    pub fn new(store: SharedStore, notifier: Notifier, config: &InfraConfig) -> Self {
        let engine = Arc::new(StockMutationEngine::new(Arc::clone(&store), config.engine));
        Self {
            detector: LowStockDetector::new(Arc::clone(&store)),
            orchestrator: ReorderOrchestrator::new(Arc::clone(&engine), notifier),
            engine,
            store,
            reorder_contact: config.reorder_contact.clone(),
        }
    }

    /// In-memory store with the given notifier (dev/tests).
    pub fn in_memory(notifier: Notifier, config: &InfraConfig) -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()), notifier, config)
    }
}

/// Wire services from config: Postgres when `USE_PERSISTENT_STORES=true`,
/// in-memory otherwise. Notifications go to the log.
pub async fn build_services(config: &InfraConfig) -> Result<AppServices, StoreError> {
    let notifier: Notifier = Arc::new(TracingNotifier);

    match &config.database_url {
        Some(url) => {
            let store = PostgresInventoryStore::connect(url).await?;
            store.migrate().await?;
            tracing::info!("using postgres inventory store");
            Ok(AppServices::new(Arc::new(store), notifier, config))
        }
        None => {
            tracing::info!("using in-memory inventory store");
            Ok(AppServices::in_memory(notifier, config))
        }
    }
}
