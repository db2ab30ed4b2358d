use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use mousse_domain::{
	epoch::Epoch,
	filter::{
		CountrySet, DateInterval, FilterPredicate, FilterSet, MonthSet, SpatialUnion, iso_date,
	},
};
use mousse_storage::{
	compose::{OutputShape, QueryComposer, QueryOutput, RankingWindow},
	models::RecordRow,
};

use crate::{Error, MousseService, Result};

/// Filters shared by search and clustering requests. Empty lists count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterInput {
	#[serde(default, alias = "country")]
	pub countries: Option<Vec<String>>,
	/// GeoJSON features, feature collections, or bare geometries.
	#[serde(default)]
	pub features: Option<Vec<Value>>,
	#[serde(default)]
	pub date_range: Option<DateRangeInput>,
	#[serde(default)]
	pub epoch: Option<Vec<Epoch>>,
}
impl FilterInput {
	pub fn to_filter_set(&self) -> Result<FilterSet> {
		let mut filters = FilterSet::new();

		if let Some(countries) = self.countries.as_ref().filter(|codes| !codes.is_empty()) {
			filters.insert(FilterPredicate::CountrySet(CountrySet::new(countries)?));
		}
		if let Some(features) = self.features.as_ref().filter(|features| !features.is_empty()) {
			filters.insert(FilterPredicate::SpatialUnion(SpatialUnion::from_features(features)?));
		}
		if let Some(range) = self.date_range.filter(|range| range.start.is_some() || range.end.is_some())
		{
			filters.insert(FilterPredicate::DateInterval(DateInterval::new(range.start, range.end)?));
		}
		if let Some(epochs) = self.epoch.as_ref().filter(|epochs| !epochs.is_empty()) {
			filters.insert(FilterPredicate::MonthSet(MonthSet::from_epochs(epochs)?));
		}

		Ok(filters)
	}
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DateRangeInput {
	#[serde(default, with = "iso_date::option")]
	pub start: Option<Date>,
	#[serde(default, with = "iso_date::option")]
	pub end: Option<Date>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
	#[default]
	Json,
	Geojson,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub page: Option<u32>,
	#[serde(default)]
	pub results_per_page: Option<u32>,
	#[serde(default)]
	pub threshold: Option<f32>,
	#[serde(flatten)]
	pub filters: FilterInput,
	#[serde(default)]
	pub output: OutputFormat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub page: u32,
	pub has_more: bool,
	pub data: SearchData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchData {
	Records(Vec<RecordRow>),
	FeatureCollection(Value),
}

impl MousseService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let page = req.page.unwrap_or(1);
		let results_per_page =
			req.results_per_page.unwrap_or(self.cfg.search.default_results_per_page);
		let threshold = req.threshold.unwrap_or(self.cfg.search.default_threshold);

		if page == 0 {
			return Err(Error::InvalidRequest { message: "page must be at least 1.".to_string() });
		}
		if results_per_page == 0 || results_per_page > self.cfg.search.max_results_per_page {
			return Err(Error::InvalidRequest {
				message: format!(
					"resultsPerPage must be between 1 and {}.",
					self.cfg.search.max_results_per_page
				),
			});
		}
		if !threshold.is_finite() || threshold <= 0.0 || threshold >= 1.0 {
			return Err(Error::InvalidRequest {
				message: "threshold must be between 0 and 1.".to_string(),
			});
		}

		let filters = req.filters.to_filter_set()?;
		let vector = self.embed_query(query).await?;
		let shape = match req.output {
			OutputFormat::Json => OutputShape::Rows,
			OutputFormat::Geojson => OutputShape::FeatureCollection,
		};
		let window = RankingWindow { vector: &vector, page, results_per_page, threshold };
		let composed = QueryComposer::from_filters(&filters, self.cfg.search.country_simplify_tolerance)
			.build(&window, shape)?;

		tracing::debug!(topics = filters.len(), page, results_per_page, "Running record search.");

		let (has_more, data) = match composed.execute(&self.db.pool).await? {
			QueryOutput::Records(rows) => {
				let (rows, has_more) = paginate(rows, results_per_page);

				(has_more, SearchData::Records(rows))
			},
			QueryOutput::FeatureCollection(collection) => {
				let (collection, has_more) = paginate_collection(collection, results_per_page);

				(has_more, SearchData::FeatureCollection(collection))
			},
			QueryOutput::Projections(_) => {
				return Err(Error::Storage {
					message: "record search returned projection rows.".to_string(),
				});
			},
		};

		Ok(SearchResponse { page, has_more, data })
	}
}

/// Truncates a window of `per_page + 1` rows to one page and reports whether the extra row
/// was present.
pub fn paginate<T>(mut rows: Vec<T>, per_page: u32) -> (Vec<T>, bool) {
	let per_page = per_page as usize;
	let has_more = rows.len() > per_page;

	rows.truncate(per_page);

	(rows, has_more)
}

fn paginate_collection(mut collection: Value, per_page: u32) -> (Value, bool) {
	let mut has_more = false;

	if let Some(features) = collection.get_mut("features").and_then(Value::as_array_mut) {
		has_more = features.len() > per_page as usize;

		features.truncate(per_page as usize);
	}

	(collection, has_more)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn eleven_rows_make_one_full_page_with_more() {
		let rows = (0..11).collect::<Vec<_>>();
		let (page, has_more) = paginate(rows, 10);

		assert_eq!(page, (0..10).collect::<Vec<_>>());
		assert!(has_more);
	}

	#[test]
	fn short_window_has_no_more() {
		let (page, has_more) = paginate(vec![1, 2, 3], 10);

		assert_eq!(page.len(), 3);
		assert!(!has_more);
	}

	#[test]
	fn feature_collections_paginate_on_features() {
		let collection = serde_json::json!({
			"type": "FeatureCollection",
			"features": [{ "id": 1 }, { "id": 2 }, { "id": 3 }]
		});
		let (collection, has_more) = paginate_collection(collection, 2);

		assert!(has_more);
		assert_eq!(collection["features"].as_array().map(Vec::len), Some(2));
	}

	#[test]
	fn request_accepts_country_alias_and_seasons() {
		let req: SearchRequest = serde_json::from_value(serde_json::json!({
			"query": "floods",
			"country": ["IT", "FR"],
			"resultsPerPage": 10,
			"page": 1,
			"dateRange": { "start": "2020-01-01" },
			"epoch": ["winter"]
		}))
		.expect("request");
		let filters = req.filters.to_filter_set().expect("filters");

		assert_eq!(filters.len(), 3);
		assert_eq!(req.output, OutputFormat::Json);
		assert_eq!(req.results_per_page, Some(10));
	}

	#[test]
	fn empty_filter_lists_are_ignored() {
		let input = FilterInput {
			countries: Some(Vec::new()),
			features: Some(Vec::new()),
			date_range: Some(DateRangeInput::default()),
			epoch: Some(Vec::new()),
		};

		assert!(input.to_filter_set().expect("filters").is_empty());
	}

	#[test]
	fn malformed_geometry_is_a_validation_error() {
		let input = FilterInput {
			features: Some(vec![serde_json::json!({ "type": "Polygon", "coordinates": [] })]),
			..FilterInput::default()
		};

		assert!(matches!(input.to_filter_set(), Err(Error::InvalidRequest { .. })));
	}
}
