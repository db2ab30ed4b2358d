use serde_json::Value;

use crate::{Result, db::Db, models::CountryRow};

pub async fn list_countries(db: &Db) -> Result<Vec<CountryRow>> {
	let rows = sqlx::query_as::<_, CountryRow>("SELECT code, label FROM countries ORDER BY label")
		.fetch_all(&db.pool)
		.await?;

	Ok(rows)
}

/// Countries whose English label matches one of `labels`, compared case-insensitively.
pub async fn countries_by_labels(db: &Db, labels: &[String]) -> Result<Vec<CountryRow>> {
	if labels.is_empty() {
		return Ok(Vec::new());
	}

	let lowered = labels.iter().map(|label| label.trim().to_lowercase()).collect::<Vec<_>>();
	let rows = sqlx::query_as::<_, CountryRow>(
		"\
SELECT code, label
FROM countries
WHERE lower(label) = ANY($1)
ORDER BY label",
	)
	.bind(lowered)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Boundaries of the given countries as one GeoJSON `FeatureCollection` keyed by country code.
pub async fn country_feature_collection(db: &Db, codes: &[String]) -> Result<Value> {
	let collection: Value = sqlx::query_scalar(
		"\
SELECT jsonb_build_object(
	'type', 'FeatureCollection',
	'features', COALESCE(
		jsonb_agg(
			jsonb_build_object(
				'type', 'Feature',
				'id', code,
				'properties', jsonb_build_object('code', code, 'label', label),
				'geometry', ST_AsGeoJSON(geometry)::jsonb
			)
			ORDER BY code
		),
		'[]'::jsonb
	)
)
FROM countries
WHERE code = ANY($1)",
	)
	.bind(codes)
	.fetch_one(&db.pool)
	.await?;

	Ok(collection)
}
