pub mod cache;
pub mod cluster;
pub mod clustered;
pub mod countries;
pub mod generation;
pub mod ner;
pub mod search;

mod error;

pub use cache::{MemoryCacheStore, PgCacheStore};
pub use clustered::{
	ClusterMembersRequest, ClusterMembersResponse, ClusterRequest, ClusterSummary,
	ClusteredSearchResponse,
};
pub use error::{Error, Result};
pub use generation::{GenerationError, GenerativeRequest};
pub use ner::NerAnalysisResponse;
pub use search::{FilterInput, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use reqwest::Client;
use serde_json::Value;

use mousse_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use mousse_providers::{
	completion::{self, ChatRequest},
	embedding,
};
use mousse_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	/// Returns the model's raw text reply.
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a GenerativeRequest,
	) -> BoxFuture<'a, Result<String>>;
}

/// Short-lived key/value store backing the clustering cache.
pub trait ResultCacheStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

	fn setex<'a>(&'a self, key: &'a str, ttl_seconds: u64, value: Value)
	-> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub completion: Arc<dyn CompletionProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		completion: Arc<dyn CompletionProvider>,
	) -> Self {
		Self { embedding, completion }
	}

	/// Both providers backed by the HTTP clients in `mousse-providers`, sharing one pool.
	pub fn http(client: Client) -> Self {
		let shared = Arc::new(DefaultProviders { client });

		Self { embedding: shared.clone(), completion: shared }
	}
}

pub struct MousseService {
	pub cfg: Config,
	pub db: Db,
	pub cache: Arc<dyn ResultCacheStore>,
	pub providers: Providers,
}
impl MousseService {
	pub fn new(cfg: Config, db: Db, cache: Arc<dyn ResultCacheStore>, client: Client) -> Self {
		Self::with_providers(cfg, db, cache, Providers::http(client))
	}

	pub fn with_providers(
		cfg: Config,
		db: Db,
		cache: Arc<dyn ResultCacheStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, db, cache, providers }
	}

	/// Embeds one query and checks it against the stored vector dimension.
	pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let texts = vec![query.to_string()];
		let mut vectors =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;

		if vectors.len() != 1 {
			return Err(Error::Provider {
				message: format!("expected one embedding, got {}.", vectors.len()),
			});
		}

		let vector = vectors.remove(0);

		if vector.len() != self.cfg.storage.vector_dim as usize {
			return Err(Error::Provider {
				message: format!(
					"embedding dimension {} does not match storage.vector_dim {}.",
					vector.len(),
					self.cfg.storage.vector_dim
				),
			});
		}

		Ok(vector)
	}
}

struct DefaultProviders {
	client: Client,
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(&self.client, cfg, texts).await?) })
	}
}

impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		request: &'a GenerativeRequest,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			let chat = ChatRequest {
				system_prompt: &request.system_prompt,
				user_content: &request.user_content,
				max_tokens: request.max_tokens,
				temperature: request.temperature,
			};

			Ok(completion::complete(&self.client, cfg, &chat).await?)
		})
	}
}
