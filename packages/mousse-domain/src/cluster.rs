use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bumped whenever the serialized cluster layout changes; cached payloads with another
/// version are discarded.
pub const CLUSTER_PAYLOAD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterElement {
	pub id: Uuid,
	pub text: String,
	pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
	/// Unique within one clustering response only.
	pub id: u32,
	pub representative_id: Uuid,
	pub representative_text: String,
	pub summary: Option<String>,
	/// Sorted by score, descending.
	pub elements: Vec<ClusterElement>,
}
impl Cluster {
	pub fn representative_score(&self) -> f64 {
		self.elements
			.iter()
			.find(|element| element.id == self.representative_id)
			.map(|element| element.score)
			.unwrap_or(f64::NEG_INFINITY)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPayload {
	pub schema_version: u32,
	pub clusters: Vec<Cluster>,
}
impl ClusterPayload {
	pub fn new(clusters: Vec<Cluster>) -> Self {
		Self { schema_version: CLUSTER_PAYLOAD_SCHEMA_VERSION, clusters }
	}

	pub fn is_current(&self) -> bool {
		self.schema_version == CLUSTER_PAYLOAD_SCHEMA_VERSION
	}
}
