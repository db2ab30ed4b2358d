//! Postgres-backed storage for short-lived result payloads.

use serde_json::Value;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;

use crate::Result;

/// Returns the payload for `key` when it exists and has not expired, bumping its hit counter.
pub async fn fetch_payload(pool: &PgPool, key: &str, now: OffsetDateTime) -> Result<Option<Value>> {
	let row = sqlx::query(
		"\
UPDATE result_cache
SET last_accessed_at = $1, hit_count = hit_count + 1
WHERE cache_key = $2 AND expires_at > $1
RETURNING payload",
	)
	.bind(now)
	.bind(key)
	.fetch_optional(pool)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};

	Ok(Some(row.try_get("payload")?))
}

/// Upserts `payload` under `key`, resetting its expiry.
pub async fn store_payload(
	pool: &PgPool,
	key: &str,
	payload: &Value,
	now: OffsetDateTime,
	expires_at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO result_cache (cache_key, payload, created_at, last_accessed_at, expires_at, hit_count)
VALUES ($1, $2, $3, $3, $4, 0)
ON CONFLICT (cache_key) DO UPDATE
SET
	payload = EXCLUDED.payload,
	last_accessed_at = EXCLUDED.last_accessed_at,
	expires_at = EXCLUDED.expires_at",
	)
	.bind(key)
	.bind(payload)
	.bind(now)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn purge_expired(pool: &PgPool, now: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM result_cache WHERE expires_at <= $1")
		.bind(now)
		.execute(pool)
		.await?;

	Ok(result.rows_affected())
}
