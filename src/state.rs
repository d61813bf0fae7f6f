use std::sync::Arc;

use crate::{
    admission::{AdmissionController, CanvasRules},
    config::Config,
    database::{RedisStore, init_redis},
    hackatime::Hackatime,
    notifier::RedisNotifier,
};

pub struct AppState {
    pub config: Config,
    pub store: RedisStore,
    pub admission: AdmissionController<Hackatime, RedisStore, RedisNotifier>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let connection = init_redis(&config.redis_url).await;
        let store = RedisStore::new(connection.clone());
        let notifier = RedisNotifier::new(connection);
        let hackatime = Hackatime::new(&config.hackatime_url);

        let admission = AdmissionController::new(
            hackatime,
            store.clone(),
            notifier,
            CanvasRules::from(&config),
        );

        Arc::new(Self {
            config,
            store,
            admission,
        })
    }
}
