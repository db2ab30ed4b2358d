//! Query composition.
//!
//! Every filter predicate becomes one candidate-set CTE over bound parameters. The candidate
//! sets are intersected into `ensemble`, the ensemble (or the whole corpus when no filter is
//! active) is ranked by cosine distance and windowed, and the window is thresholded and joined
//! back to the caller-selected projection. The resulting statement is executed once.

use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::Date;

use mousse_domain::filter::{FilterPredicate, FilterSet, Topic};

use crate::{
	Error, Result,
	models::{ProjectionRow, RecordRow},
	vector,
};

/// One filter's candidate set, holding the values it binds.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSet {
	Country { codes: Vec<String>, simplify_tolerance: f64 },
	Spatial { geometries: Vec<String> },
	DateRange { start: Date, end: Date },
	Months { months: Vec<i32> },
}
impl CandidateSet {
	pub fn from_predicate(predicate: &FilterPredicate, simplify_tolerance: f64) -> Self {
		match predicate {
			FilterPredicate::CountrySet(set) => Self::Country { codes: set.to_vec(), simplify_tolerance },
			FilterPredicate::SpatialUnion(union) => Self::Spatial { geometries: union.geojson() },
			FilterPredicate::DateInterval(interval) => {
				let (start, end) = interval.bounds();

				Self::DateRange { start, end }
			},
			FilterPredicate::MonthSet(set) => Self::Months { months: set.to_vec() },
		}
	}

	pub fn topic(&self) -> Topic {
		match self {
			Self::Country { .. } => Topic::Country,
			Self::Spatial { .. } => Topic::Spatial,
			Self::DateRange { .. } => Topic::DateRange,
			Self::Months { .. } => Topic::Epoch,
		}
	}

	fn push_query(&self, qb: &mut QueryBuilder<'static, Postgres>) {
		match self {
			Self::Country { codes, simplify_tolerance } => {
				qb.push(
					"\
	SELECT record_id
	FROM record_locations
	WHERE ST_Within(
		ST_MakeValid(geometry),
		(SELECT ST_Simplify(ST_Union(geometry), ",
				);
				qb.push_bind(*simplify_tolerance);
				qb.push(") FROM countries WHERE code = ANY(");
				qb.push_bind(codes.clone());
				qb.push("))\n\t)\n");
			},
			Self::Spatial { geometries } => {
				qb.push(
					"\
	SELECT record_id
	FROM record_locations
	WHERE ST_Within(
		ST_MakeValid(geometry),
		(SELECT ST_Union(ST_SetSRID(ST_GeomFromGeoJSON(area), 4326)) FROM unnest(",
				);
				qb.push_bind(geometries.clone());
				qb.push("::text[]) AS area)\n\t)\n");
			},
			Self::DateRange { start, end } => {
				qb.push(
					"\
	SELECT record_id
	FROM record_time_ranges
	WHERE time_interval && tstzrange(",
				);
				qb.push_bind(*start);
				qb.push("::date::timestamp AT TIME ZONE 'UTC', (");
				qb.push_bind(*end);
				qb.push("::date + 1)::timestamp AT TIME ZONE 'UTC', '[)')\n");
			},
			Self::Months { months } => {
				qb.push(
					"\
	SELECT record_id
	FROM record_time_ranges
	WHERE lower_inf(time_interval)
		OR upper_inf(time_interval)
		OR upper(time_interval) >= lower(time_interval) + interval '1 year'
		OR ARRAY(
			SELECT EXTRACT(MONTH FROM month_start AT TIME ZONE 'UTC')::int
			FROM generate_series(
				date_trunc('month', lower(time_interval), 'UTC'),
				CASE
					WHEN upper_inc(time_interval) THEN upper(time_interval)
					ELSE upper(time_interval) - interval '1 microsecond'
				END,
				interval '1 month'
			) AS month_start
		) && ",
				);
				qb.push_bind(months.clone());
				qb.push("::int[]\n");
			},
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
	/// One row per record.
	Rows,
	/// A single GeoJSON `FeatureCollection` whose features are keyed by record id.
	FeatureCollection,
	/// Cleaned titles with reduced projection vectors, for clustering.
	Projections,
}

/// Stages of a composed query, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Filter(Topic),
	/// Depends on every `Filter` stage.
	Ensemble,
	/// Depends on `Ensemble` when restricted, otherwise scans the whole corpus.
	VectorSearch { restricted: bool },
	Threshold,
	Output(OutputShape),
}

/// The ranking window of one request.
#[derive(Debug, Clone, Copy)]
pub struct RankingWindow<'a> {
	pub vector: &'a [f32],
	pub page: u32,
	pub results_per_page: u32,
	pub threshold: f32,
}
impl RankingWindow<'_> {
	pub fn offset(&self) -> i64 {
		i64::from(self.page.saturating_sub(1)) * i64::from(self.results_per_page)
	}

	/// One extra row signals that another page exists.
	pub fn limit(&self) -> i64 {
		i64::from(self.results_per_page) + 1
	}

	pub fn max_distance(&self) -> f64 {
		1.0 - f64::from(self.threshold)
	}

	fn validate(&self) -> Result<()> {
		if self.page == 0 {
			return Err(Error::InvalidArgument("page must be at least 1.".to_string()));
		}
		if self.results_per_page == 0 {
			return Err(Error::InvalidArgument("results per page must be at least 1.".to_string()));
		}
		if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold >= 1.0 {
			return Err(Error::InvalidArgument("threshold must be between 0 and 1.".to_string()));
		}
		if self.vector.is_empty() || self.vector.iter().any(|v| !v.is_finite()) {
			return Err(Error::InvalidArgument(
				"query vector must be non-empty and finite.".to_string(),
			));
		}

		Ok(())
	}
}

/// Accumulates candidate sets. Adding a predicate for a topic that is already present replaces
/// the earlier candidate set.
#[derive(Debug, Clone)]
pub struct QueryComposer {
	simplify_tolerance: f64,
	sets: BTreeMap<Topic, CandidateSet>,
}
impl QueryComposer {
	pub fn new(simplify_tolerance: f64) -> Self {
		Self { simplify_tolerance, sets: BTreeMap::new() }
	}

	pub fn from_filters(filters: &FilterSet, simplify_tolerance: f64) -> Self {
		let mut composer = Self::new(simplify_tolerance);

		for predicate in filters.iter() {
			composer.add(predicate);
		}

		composer
	}

	pub fn add(&mut self, predicate: &FilterPredicate) -> &mut Self {
		let set = CandidateSet::from_predicate(predicate, self.simplify_tolerance);

		self.sets.insert(set.topic(), set);

		self
	}

	/// Topics that contribute a candidate set. A country filter suppresses the spatial one.
	pub fn active_topics(&self) -> Vec<Topic> {
		let has_country = self.sets.contains_key(&Topic::Country);

		self.sets.keys().copied().filter(|topic| !(has_country && *topic == Topic::Spatial)).collect()
	}

	pub fn pipeline(&self, shape: OutputShape) -> Vec<Stage> {
		let topics = self.active_topics();
		let restricted = !topics.is_empty();
		let mut stages = topics.into_iter().map(Stage::Filter).collect::<Vec<_>>();

		if restricted {
			stages.push(Stage::Ensemble);
		}

		stages.push(Stage::VectorSearch { restricted });
		stages.push(Stage::Threshold);
		stages.push(Stage::Output(shape));

		stages
	}

	pub fn build(&self, window: &RankingWindow<'_>, shape: OutputShape) -> Result<ComposedQuery> {
		window.validate()?;

		let topics = self.active_topics();
		let mut qb = QueryBuilder::new("WITH ");
		let mut ctes = 0;

		for stage in self.pipeline(shape) {
			match stage {
				Stage::Filter(topic) => {
					let Some(set) = self.sets.get(&topic) else {
						continue;
					};

					open_cte(&mut qb, &mut ctes, topic.cte_name());
					set.push_query(&mut qb);
					qb.push(")");
				},
				Stage::Ensemble => {
					open_cte(&mut qb, &mut ctes, "ensemble");

					let mut separated = qb.separated("\n\tINTERSECT\n");

					for topic in &topics {
						separated.push(format!("\tSELECT record_id FROM {}", topic.cte_name()));
					}

					qb.push("\n)");
				},
				Stage::VectorSearch { restricted } => {
					open_cte(&mut qb, &mut ctes, "vector_search");
					qb.push("\tSELECT record_id, vector <=> ");
					qb.push_bind(vector::vector_to_pg(window.vector));
					qb.push("::text::vector AS distance\n\tFROM record_embeddings\n");

					if restricted {
						qb.push("\tWHERE record_id IN (SELECT record_id FROM ensemble)\n");
					}

					qb.push("\tORDER BY distance\n\tOFFSET ");
					qb.push_bind(window.offset());
					qb.push(" LIMIT ");
					qb.push_bind(window.limit());
					qb.push("\n)");
				},
				Stage::Threshold => {
					open_cte(&mut qb, &mut ctes, "ranked_records");
					qb.push(
						"\
	SELECT record_id, distance, ROUND((1 - distance)::numeric, 4)::float8 AS score
	FROM vector_search
	WHERE distance < ",
					);
					qb.push_bind(window.max_distance());
					qb.push("\n)\n");
				},
				Stage::Output(shape) => push_output(&mut qb, shape),
			}
		}

		Ok(ComposedQuery { builder: qb, shape })
	}
}

fn open_cte(qb: &mut QueryBuilder<'static, Postgres>, count: &mut usize, name: &str) {
	if *count > 0 {
		qb.push(",\n");
	}

	*count += 1;

	qb.push(format!("{name} AS (\n"));
}

const RECORD_COLUMNS: &str = "\
	ranked.record_id AS id,
	rec.original_id,
	rec.title,
	rec.description,
	COALESCE(rec.format, '{}'::text[]) AS format,
	COALESCE(rec.keyword, '{}'::text[]) AS keyword,
	ARRAY(
		SELECT topic.topic
		FROM record_topics bridge
		JOIN topics topic ON topic.topic_id = bridge.topic_id
		WHERE bridge.record_id = ranked.record_id
		ORDER BY topic.topic
	) AS topic,
	ranked.score,
	ranked.distance,
	ST_AsGeoJSON(loc.geometry)::jsonb AS geometry
FROM ranked_records ranked
JOIN records rec ON rec.record_id = ranked.record_id
LEFT JOIN record_locations loc ON loc.record_id = ranked.record_id";

fn push_output(qb: &mut QueryBuilder<'static, Postgres>, shape: OutputShape) {
	match shape {
		OutputShape::Rows => {
			qb.push(
				"\
SELECT id, original_id, title, description, format, keyword, topic, score, geometry
FROM (
SELECT
",
			);
			qb.push(RECORD_COLUMNS);
			qb.push("\n) AS record\nORDER BY distance");
		},
		OutputShape::FeatureCollection => {
			qb.push(
				"\
SELECT jsonb_build_object(
	'type', 'FeatureCollection',
	'features', COALESCE(
		jsonb_agg(
			jsonb_build_object(
				'type', 'Feature',
				'id', feature.id,
				'geometry', feature.geometry,
				'properties', to_jsonb(feature) - 'id' - 'geometry' - 'distance'
			)
			ORDER BY feature.distance
		),
		'[]'::jsonb
	)
)
FROM (
SELECT
",
			);
			qb.push(RECORD_COLUMNS);
			qb.push("\n) AS feature");
		},
		OutputShape::Projections => {
			qb.push(
				"\
SELECT
	ranked.record_id AS id,
	proj.title_cleaned AS text,
	ranked.score,
	proj.vector::text AS vector
FROM ranked_records ranked
JOIN record_projections proj ON proj.record_id = ranked.record_id
ORDER BY ranked.distance",
			);
		},
	}
}

/// Rows produced by one composed query, matching its output shape.
#[derive(Debug, Clone)]
pub enum QueryOutput {
	Records(Vec<RecordRow>),
	FeatureCollection(Value),
	Projections(Vec<ProjectionRow>),
}

pub struct ComposedQuery {
	builder: QueryBuilder<'static, Postgres>,
	shape: OutputShape,
}
impl ComposedQuery {
	pub fn sql(&self) -> &str {
		self.builder.sql()
	}

	pub fn shape(&self) -> OutputShape {
		self.shape
	}

	pub async fn execute(mut self, pool: &PgPool) -> Result<QueryOutput> {
		let output = match self.shape {
			OutputShape::Rows => QueryOutput::Records(
				self.builder.build_query_as::<RecordRow>().fetch_all(pool).await?,
			),
			OutputShape::FeatureCollection => QueryOutput::FeatureCollection(
				self.builder.build_query_scalar::<Value>().fetch_one(pool).await?,
			),
			OutputShape::Projections => QueryOutput::Projections(
				self.builder.build_query_as::<ProjectionRow>().fetch_all(pool).await?,
			),
		};

		Ok(output)
	}
}

#[cfg(test)]
mod tests {
	use mousse_domain::filter::{CountrySet, DateInterval, MonthSet, SpatialUnion};
	use time::macros::date;

	use super::*;

	const VECTOR: [f32; 3] = [0.1, 0.2, 0.3];

	fn window(page: u32) -> RankingWindow<'static> {
		RankingWindow { vector: &VECTOR, page, results_per_page: 10, threshold: 0.2 }
	}

	fn square() -> Value {
		serde_json::json!({
			"type": "Polygon",
			"coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
		})
	}

	#[test]
	fn solo_mode_ranks_the_whole_corpus() {
		let composer = QueryComposer::new(0.1);
		let query = composer.build(&window(1), OutputShape::Rows).expect("query");

		assert_eq!(
			composer.pipeline(OutputShape::Rows),
			vec![
				Stage::VectorSearch { restricted: false },
				Stage::Threshold,
				Stage::Output(OutputShape::Rows),
			]
		);
		assert!(!query.sql().contains("ensemble"));
		assert!(query.sql().starts_with("WITH vector_search AS ("));
		assert!(query.sql().contains("OFFSET $2 LIMIT $3"));
		assert!(query.sql().contains("WHERE distance < $4"));
	}

	#[test]
	fn filters_intersect_in_topic_order_with_sequential_binds() {
		let mut composer = QueryComposer::new(0.1);

		composer
			.add(&FilterPredicate::MonthSet(MonthSet::new([6, 7]).expect("months")))
			.add(&FilterPredicate::DateInterval(
				DateInterval::new(Some(date!(2020 - 01 - 01)), None).expect("interval"),
			));

		let sql = composer.build(&window(2), OutputShape::Rows).expect("query").sql().to_string();

		assert!(sql.starts_with("WITH date_filtered AS ("));
		assert!(sql.contains(
			"ensemble AS (\n\tSELECT record_id FROM date_filtered\n\tINTERSECT\n\tSELECT record_id FROM epoch_filtered\n)"
		));
		assert!(sql.contains("&& $3::int[]"));
		assert!(sql.contains("ELSE upper(time_interval) - interval '1 microsecond'"));
		assert!(sql.contains("vector <=> $4::text::vector"));
		assert!(sql.contains("WHERE record_id IN (SELECT record_id FROM ensemble)"));
		assert!(sql.contains("OFFSET $5 LIMIT $6"));
		assert!(sql.contains("WHERE distance < $7"));
	}

	#[test]
	fn country_takes_precedence_over_spatial() {
		let mut composer = QueryComposer::new(0.1);

		composer
			.add(&FilterPredicate::SpatialUnion(
				SpatialUnion::from_features(&[square()]).expect("area"),
			))
			.add(&FilterPredicate::CountrySet(CountrySet::new(["IT", "FR"]).expect("codes")));

		let sql = composer.build(&window(1), OutputShape::Rows).expect("query").sql().to_string();

		assert_eq!(composer.active_topics(), vec![Topic::Country]);
		assert!(sql.contains("country_filtered AS ("));
		assert!(!sql.contains("spatially_filtered"));
		assert!(sql.contains("ST_Simplify(ST_Union(geometry), $1)"));
	}

	#[test]
	fn user_geometry_is_never_simplified() {
		let mut composer = QueryComposer::new(0.1);

		composer.add(&FilterPredicate::SpatialUnion(
			SpatialUnion::from_features(&[square(), square()]).expect("areas"),
		));

		let sql = composer.build(&window(1), OutputShape::Rows).expect("query").sql().to_string();

		assert!(sql.contains("ST_Union(ST_SetSRID(ST_GeomFromGeoJSON(area), 4326))"));
		assert!(!sql.contains("ST_Simplify"));
	}

	#[test]
	fn repeated_topic_replaces_the_earlier_candidate_set() {
		let mut composer = QueryComposer::new(0.1);

		composer
			.add(&FilterPredicate::MonthSet(MonthSet::new([1]).expect("months")))
			.add(&FilterPredicate::MonthSet(MonthSet::new([2]).expect("months")));

		let query = composer.build(&window(1), OutputShape::Rows).expect("query");

		assert_eq!(query.sql().matches("epoch_filtered AS (").count(), 1);
		assert_eq!(composer.active_topics(), vec![Topic::Epoch]);
	}

	#[test]
	fn output_shapes_select_their_projection() {
		let composer = QueryComposer::new(0.1);
		let features =
			composer.build(&window(1), OutputShape::FeatureCollection).expect("query");
		let projections = composer.build(&window(1), OutputShape::Projections).expect("query");

		assert!(features.sql().contains("'type', 'FeatureCollection'"));
		assert!(features.sql().contains("'id', feature.id"));
		assert!(projections.sql().contains("proj.vector::text AS vector"));
		assert_eq!(projections.shape(), OutputShape::Projections);
	}

	#[test]
	fn window_math_and_validation() {
		let w = window(3);

		assert_eq!(w.offset(), 20);
		assert_eq!(w.limit(), 11);
		assert!((w.max_distance() - 0.8).abs() < 1e-6);

		let composer = QueryComposer::new(0.1);

		assert!(composer.build(&window(0), OutputShape::Rows).is_err());
		assert!(
			composer
				.build(
					&RankingWindow { vector: &[], page: 1, results_per_page: 10, threshold: 0.2 },
					OutputShape::Rows,
				)
				.is_err()
		);
		assert!(
			composer
				.build(
					&RankingWindow { vector: &VECTOR, page: 1, results_per_page: 10, threshold: 1.0 },
					OutputShape::Rows,
				)
				.is_err()
		);
	}
}
