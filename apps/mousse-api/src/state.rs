use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;

use mousse_service::{MemoryCacheStore, MousseService, PgCacheStore, ResultCacheStore};
use mousse_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MousseService>,
}
impl AppState {
	pub async fn new(config: mousse_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema(config.storage.vector_dim, config.storage.projection_dim).await?;

		let cache: Arc<dyn ResultCacheStore> = match config.cache.backend.as_str() {
			"memory" => Arc::new(MemoryCacheStore::new()),
			_ => Arc::new(PgCacheStore::new(db.pool.clone())),
		};
		let client = mousse_providers::http_client()?;
		let service = MousseService::new(config, db, cache, client);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: MousseService) -> Self {
		Self { service: Arc::new(service) }
	}

	/// Periodically deletes expired rows from the Postgres result cache.
	pub fn spawn_cache_janitor(&self) {
		let cfg = &self.service.cfg.cache;

		if !cfg.enabled || cfg.backend != "postgres" {
			return;
		}

		let pool = self.service.db.pool.clone();
		let period = Duration::from_secs(cfg.ttl_seconds.max(60));

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);

			loop {
				ticker.tick().await;

				match mousse_storage::cache::purge_expired(&pool, OffsetDateTime::now_utc()).await {
					Ok(0) => {},
					Ok(purged) => tracing::info!(purged, "Expired cache entries purged."),
					Err(err) => tracing::warn!(error = %err, "Cache purge failed."),
				}
			}
		});
	}
}
