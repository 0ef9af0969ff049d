use relay_core::config::Config;
use relay_core::registry::JobRegistry;
use relay_core::store::DropStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: JobRegistry,
    pub store: Arc<dyn DropStore>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DropStore>) -> Self {
        AppState {
            config: Arc::new(config),
            registry: JobRegistry::new(),
            store,
            start_time: std::time::Instant::now(),
        }
    }
}
