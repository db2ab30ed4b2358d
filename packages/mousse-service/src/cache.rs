//! Memoization of clustering results.
//!
//! The cache is never a correctness dependency: read failures, expired entries, and payloads that
//! do not decode under the current schema version are all reported as misses, and write
//! failures are only logged.

use std::{collections::HashMap, time::Duration};

use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::{sync::RwLock, time::Instant};

use mousse_domain::{
	cluster::{CLUSTER_PAYLOAD_SCHEMA_VERSION, Cluster, ClusterPayload},
	filter::FilterSet,
};

use crate::{BoxFuture, Error, Result, ResultCacheStore};

/// Longest lifetime a stored entry can get, whatever TTL the caller asks for.
pub const MAX_TTL_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Cache key for one clustering request.
///
/// The key covers the trimmed query, every filter in topic order, and the cluster count, so
/// permuting the filters of a request yields the same key.
pub fn fingerprint(prefix: &str, query: &str, filters: &FilterSet, clusters: u32) -> Result<String> {
	let normalized = serde_json::json!({
		"schema_version": CLUSTER_PAYLOAD_SCHEMA_VERSION,
		"query": query.trim(),
		"filters": filters.fingerprint_value(),
		"number_of_clusters": clusters,
	});

	Ok(format!("{prefix}:{}", hash_cache_key(&normalized)?))
}

pub fn cache_key_prefix(key: &str) -> &str {
	let hash = key.rsplit(':').next().unwrap_or(key);

	hash.get(..12).unwrap_or(hash)
}

fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::InvalidRequest {
		message: format!("Failed to encode cache key: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

/// Typed view over a [`ResultCacheStore`].
pub struct ClusterCache<'a> {
	store: &'a dyn ResultCacheStore,
	cfg: &'a mousse_config::Cache,
}
impl<'a> ClusterCache<'a> {
	pub fn new(store: &'a dyn ResultCacheStore, cfg: &'a mousse_config::Cache) -> Self {
		Self { store, cfg }
	}

	pub async fn get(&self, key: &str) -> Option<Vec<Cluster>> {
		if !self.cfg.enabled {
			return None;
		}

		let prefix = cache_key_prefix(key);
		let raw = match self.store.get(key).await {
			Ok(Some(raw)) => raw,
			Ok(None) => {
				tracing::info!(cache_key_prefix = prefix, "Cache miss.");

				return None;
			},
			Err(err) => {
				tracing::warn!(error = %err, cache_key_prefix = prefix, "Cache read failed.");

				return None;
			},
		};

		match serde_json::from_value::<ClusterPayload>(raw) {
			Ok(payload) if payload.is_current() => {
				tracing::info!(cache_key_prefix = prefix, "Cache hit.");

				Some(payload.clusters)
			},
			Ok(payload) => {
				tracing::warn!(
					cache_key_prefix = prefix,
					schema_version = payload.schema_version,
					"Cache payload version mismatch."
				);

				None
			},
			Err(err) => {
				tracing::warn!(error = %err, cache_key_prefix = prefix, "Cache payload decode failed.");

				None
			},
		}
	}

	pub async fn put(&self, key: &str, clusters: &[Cluster]) {
		if !self.cfg.enabled {
			return;
		}

		let prefix = cache_key_prefix(key);
		let payload = match serde_json::to_value(ClusterPayload::new(clusters.to_vec())) {
			Ok(payload) => payload,
			Err(err) => {
				tracing::warn!(error = %err, cache_key_prefix = prefix, "Cache payload encode failed.");

				return;
			},
		};

		match self.store.setex(key, self.cfg.ttl_seconds, payload).await {
			Ok(()) => tracing::info!(
				cache_key_prefix = prefix,
				ttl_seconds = self.cfg.ttl_seconds,
				"Cache stored."
			),
			Err(err) => {
				tracing::warn!(error = %err, cache_key_prefix = prefix, "Cache write failed.")
			},
		}
	}
}

/// Cache entries in the `result_cache` table.
pub struct PgCacheStore {
	pool: PgPool,
}
impl PgCacheStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

impl ResultCacheStore for PgCacheStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			Ok(mousse_storage::cache::fetch_payload(&self.pool, key, OffsetDateTime::now_utc())
				.await?)
		})
	}

	fn setex<'a>(
		&'a self,
		key: &'a str,
		ttl_seconds: u64,
		value: Value,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let expires_at = now + time::Duration::seconds(capped_ttl(ttl_seconds) as i64);

			mousse_storage::cache::store_payload(&self.pool, key, &value, now, expires_at).await?;

			Ok(())
		})
	}
}

/// In-process cache for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryCacheStore {
	entries: RwLock<HashMap<String, (Value, Instant)>>,
}
impl MemoryCacheStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn live_entries(&self) -> usize {
		let now = Instant::now();

		self.entries.read().await.values().filter(|(_, expires_at)| *expires_at > now).count()
	}
}

impl ResultCacheStore for MemoryCacheStore {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			let now = Instant::now();
			let entries = self.entries.read().await;

			Ok(entries
				.get(key)
				.filter(|(_, expires_at)| *expires_at > now)
				.map(|(value, _)| value.clone()))
		})
	}

	fn setex<'a>(
		&'a self,
		key: &'a str,
		ttl_seconds: u64,
		value: Value,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let now = Instant::now();
			let expires_at = now + Duration::from_secs(capped_ttl(ttl_seconds));
			let mut entries = self.entries.write().await;

			entries.retain(|_, (_, expiry)| *expiry > now);
			entries.insert(key.to_string(), (value, expires_at));

			Ok(())
		})
	}
}

fn capped_ttl(ttl_seconds: u64) -> u64 {
	ttl_seconds.min(MAX_TTL_SECONDS)
}
