use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mousse_domain::{
	cluster::{Cluster, ClusterElement},
	filter::FilterSet,
};
use mousse_storage::{
	compose::{OutputShape, QueryComposer, QueryOutput, RankingWindow},
	vector,
};

use crate::{
	Error, MousseService, Result,
	cache::{self, ClusterCache},
	cluster::{ClusterEngine, ClusterInput},
	search::{FilterInput, paginate},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
	pub query: String,
	#[serde(flatten)]
	pub filters: FilterInput,
	#[serde(default)]
	pub number_of_clusters: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
	pub id: u32,
	pub representative_id: Uuid,
	pub representative_title: String,
	pub summary: Option<String>,
	pub element_count: usize,
}
impl From<&Cluster> for ClusterSummary {
	fn from(cluster: &Cluster) -> Self {
		Self {
			id: cluster.id,
			representative_id: cluster.representative_id,
			representative_title: cluster.representative_text.clone(),
			summary: cluster.summary.clone(),
			element_count: cluster.elements.len(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteredSearchResponse {
	pub fingerprint: String,
	pub clusters: Vec<ClusterSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMembersRequest {
	#[serde(flatten)]
	pub request: ClusterRequest,
	pub cluster_id: u32,
	#[serde(default)]
	pub page: Option<u32>,
	#[serde(default)]
	pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMembersResponse {
	pub cluster_id: u32,
	pub page: u32,
	pub has_more: bool,
	pub total: usize,
	pub data: Vec<ClusterElement>,
}

impl MousseService {
	pub async fn clustered_search(
		&self,
		req: ClusterRequest,
		cancel: &CancellationToken,
	) -> Result<ClusteredSearchResponse> {
		let (fingerprint, clusters) = self.resolve_clusters(&req, cancel).await?;

		Ok(ClusteredSearchResponse {
			fingerprint,
			clusters: clusters.iter().map(ClusterSummary::from).collect(),
		})
	}

	/// Pages through one cluster's members in descending score order.
	pub async fn cluster_members(
		&self,
		req: ClusterMembersRequest,
		cancel: &CancellationToken,
	) -> Result<ClusterMembersResponse> {
		let page = req.page.unwrap_or(1);
		let per_page = req.per_page.unwrap_or(self.cfg.search.default_results_per_page);

		if page == 0 {
			return Err(Error::InvalidRequest { message: "page must be at least 1.".to_string() });
		}
		if per_page == 0 || per_page > self.cfg.search.max_results_per_page {
			return Err(Error::InvalidRequest {
				message: format!(
					"perPage must be between 1 and {}.",
					self.cfg.search.max_results_per_page
				),
			});
		}

		let (_, clusters) = self.resolve_clusters(&req.request, cancel).await?;
		let Some(cluster) = clusters.into_iter().find(|cluster| cluster.id == req.cluster_id) else {
			return Err(Error::NotFound { message: format!("cluster {}.", req.cluster_id) });
		};
		let total = cluster.elements.len();
		let start = (page as usize - 1).saturating_mul(per_page as usize);
		// One extra element reports whether another page exists.
		let window = cluster
			.elements
			.into_iter()
			.skip(start)
			.take(per_page as usize + 1)
			.collect::<Vec<_>>();
		let (data, has_more) = paginate(window, per_page);

		Ok(ClusterMembersResponse { cluster_id: req.cluster_id, page, has_more, total, data })
	}

	/// Returns the request fingerprint and its clusters, from the cache when possible.
	///
	/// Clusters are written back after every resolution, so a hit also refreshes the entry's
	/// lifetime.
	pub(crate) async fn resolve_clusters(
		&self,
		req: &ClusterRequest,
		cancel: &CancellationToken,
	) -> Result<(String, Vec<Cluster>)> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let k = req.number_of_clusters.unwrap_or(self.cfg.clustering.default_clusters);

		if k == 0 || k > self.cfg.clustering.max_results {
			return Err(Error::InvalidRequest {
				message: format!(
					"numberOfClusters must be between 1 and {}.",
					self.cfg.clustering.max_results
				),
			});
		}

		let filters = req.filters.to_filter_set()?;
		let key = cache::fingerprint(&self.cfg.cache.key_prefix, query, &filters, k)?;
		let cache = ClusterCache::new(self.cache.as_ref(), &self.cfg.cache);
		let clusters = match cache.get(&key).await {
			Some(clusters) => clusters,
			None => self.compute_clusters(query, &filters, k as usize, cancel).await?,
		};

		cache.put(&key, &clusters).await;

		Ok((key, clusters))
	}

	async fn compute_clusters(
		&self,
		query: &str,
		filters: &FilterSet,
		k: usize,
		cancel: &CancellationToken,
	) -> Result<Vec<Cluster>> {
		let vector = self.embed_query(query).await?;
		let window = RankingWindow {
			vector: &vector,
			page: 1,
			results_per_page: self.cfg.clustering.max_results,
			threshold: self.cfg.clustering.threshold,
		};
		let composed = QueryComposer::from_filters(filters, self.cfg.search.country_simplify_tolerance)
			.build(&window, OutputShape::Projections)?;
		let QueryOutput::Projections(rows) = composed.execute(&self.db.pool).await? else {
			return Err(Error::Storage {
				message: "clustered search returned non-projection rows.".to_string(),
			});
		};
		let inputs = rows
			.into_iter()
			.map(|row| ClusterInput {
				id: row.id,
				text: row.text,
				score: row.score,
				vector: vector::parse_pg_vector(&row.vector).unwrap_or_default(),
			})
			.collect::<Vec<_>>();

		tracing::info!(hits = inputs.len(), k, "Clustering search hits.");

		ClusterEngine {
			cfg: &self.cfg.clustering,
			budget: &self.cfg.generation.summary,
			llm: &self.cfg.providers.llm,
			completion: self.providers.completion.as_ref(),
		}
		.cluster(inputs, k, cancel)
		.await
	}
}
