use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// One ranked record in row form.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
	pub id: Uuid,
	pub original_id: String,
	pub title: String,
	pub description: Option<String>,
	pub format: Vec<String>,
	pub keyword: Vec<String>,
	pub topic: Vec<String>,
	pub score: f64,
	pub geometry: Option<Value>,
}

/// One ranked record with its reduced projection, used for clustering.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProjectionRow {
	pub id: Uuid,
	pub text: String,
	pub score: f64,
	/// pgvector text form.
	pub vector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CountryRow {
	pub code: String,
	pub label: String,
}
