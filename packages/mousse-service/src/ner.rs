//! Location and date entity extraction over a free-text query.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use mousse_domain::{epoch, filter::iso_date};
use mousse_storage::{models::CountryRow, queries};

use crate::{
	Error, MousseService, Result,
	generation::{self, GenerativeRequest},
};

const NER_PROMPT: &str = "\
You extract location and date entities from search queries over environmental datasets.

1. Find the entities in the text:
   - Locations: specific place names only, never generic phrases such as \"sample sites\".
   - Dates: every date expression, copied exactly as written.
2. Map every location to the English name of the country or countries it lies in. A location \
that is itself a country is listed as is. If no country can be determined, return an empty list.
3. Classify every date expression as either
   a) an absolute period: give periodStart and periodEnd as YYYY-MM-DD and set phase to null. \
Resolve relative expressions against today, {today}; or
   b) a recurring part of the year: give phase as the month numbers 1 to 12 and set \
periodStart and periodEnd to null.
4. Remove the date expressions, the country names, and the words that attach them to the \
query (for example prepositions). Return what remains as a list of fragments copied exactly \
from the query, even when they are not grammatical on their own.

Reply with one JSON object with these fields:
{schema}

Always include every field. Reply with JSON only, without explanations.";

/// Field descriptions of the extraction reply, listed in the system prompt.
const REPLY_FIELDS: [(&str, &str); 7] = [
	("country", "list of English country names the locations belong to"),
	(
		"periodStart",
		"start of an absolute period as YYYY-MM-DD, or null when the query names no absolute period",
	),
	(
		"periodEnd",
		"end of an absolute period as YYYY-MM-DD, or null when the query names no absolute period",
	),
	(
		"phase",
		"months 1-12 of a recurring yearly period, or null when periodStart or periodEnd is set",
	),
	("location", "location entities exactly as written in the query, or null"),
	("date", "date entities exactly as written in the query, or null"),
	(
		"cleanedQuery",
		"fragments of the query left after removing the date entities, the country entities, and their related words",
	),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionReply {
	#[serde(default)]
	country: Option<Vec<String>>,
	#[serde(default, with = "iso_date::option")]
	period_start: Option<Date>,
	#[serde(default, with = "iso_date::option")]
	period_end: Option<Date>,
	#[serde(default)]
	phase: Option<Vec<i64>>,
	#[serde(default)]
	location: Option<Vec<String>>,
	#[serde(default)]
	date: Option<Vec<String>>,
	cleaned_query: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeRange {
	#[serde(with = "iso_date::option")]
	pub start: Option<Date>,
	#[serde(with = "iso_date::option")]
	pub end: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthLabel {
	pub kind: &'static str,
	pub value: String,
	pub label: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entities {
	pub location: Option<Vec<String>>,
	pub date: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NerAnalysisResponse {
	pub query: String,
	pub country: Vec<CountryRow>,
	pub timerange: TimeRange,
	pub phase: Vec<MonthLabel>,
	pub entities: Entities,
	pub cleaned_query: Vec<String>,
}

impl MousseService {
	pub async fn analyze(&self, query: &str, cancel: &CancellationToken) -> Result<NerAnalysisResponse> {
		if query.trim().is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let budget = &self.cfg.generation.extraction;
		let request = GenerativeRequest::new(
			system_prompt(OffsetDateTime::now_utc().date()),
			query,
			budget,
		);
		let generated = generation::generate::<ExtractionReply>(
			self.providers.completion.as_ref(),
			&self.cfg.providers.llm,
			&request,
			budget.max_retries,
			cancel,
		)
		.await?;

		tracing::info!(retries = generated.retries, "Entities extracted.");

		let reply = generated.value;
		let country = match &reply.country {
			Some(names) => queries::countries_by_labels(&self.db, names).await?,
			None => Vec::new(),
		};

		Ok(build_response(query, country, reply))
	}
}

pub fn system_prompt(today: Date) -> String {
	NER_PROMPT.replace("{today}", &today.to_string()).replace("{schema}", &schema_summary())
}

fn schema_summary() -> String {
	REPLY_FIELDS
		.iter()
		.map(|(field, description)| format!("{field}: {description}"))
		.collect::<Vec<_>>()
		.join(",\n")
}

fn build_response(query: &str, country: Vec<CountryRow>, reply: ExtractionReply) -> NerAnalysisResponse {
	let timerange = TimeRange { start: reply.period_start, end: reply.period_end };
	// An absolute period takes precedence over a recurring one.
	let phase = if timerange.start.is_some() || timerange.end.is_some() {
		Vec::new()
	} else {
		month_labels(reply.phase.as_deref().unwrap_or_default())
	};

	NerAnalysisResponse {
		query: query.to_string(),
		country,
		timerange,
		phase,
		entities: Entities { location: reply.location, date: reply.date },
		cleaned_query: reply.cleaned_query,
	}
}

fn month_labels(months: &[i64]) -> Vec<MonthLabel> {
	months
		.iter()
		.filter_map(|month| u8::try_from(*month).ok())
		.filter_map(|month| {
			let label = epoch::month_label(month)?;

			Some(MonthLabel { kind: "Month", value: epoch::month_code(month), label })
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	fn reply(value: serde_json::Value) -> ExtractionReply {
		serde_json::from_value(value).expect("reply")
	}

	#[test]
	fn prompt_carries_date_and_schema() {
		let prompt = system_prompt(date!(2026 - 10 - 17));

		assert!(prompt.contains("today, 2026-10-17"));
		assert!(prompt.contains("cleanedQuery: fragments"));
		assert!(prompt.contains("periodEnd: end of an absolute period"));
		assert!(!prompt.contains("{schema}"));
	}

	#[test]
	fn absolute_period_clears_phase() {
		let response = build_response(
			"air pollution in Rome last summer",
			Vec::new(),
			reply(serde_json::json!({
				"country": ["Italy"],
				"periodStart": "2026-06-01",
				"periodEnd": "2026-08-31",
				"phase": [6, 7, 8],
				"location": ["Rome"],
				"date": ["last summer"],
				"cleanedQuery": ["air pollution in Rome"]
			})),
		);

		assert!(response.phase.is_empty());
		assert_eq!(response.timerange.start, Some(date!(2026 - 06 - 01)));
		assert_eq!(response.entities.location, Some(vec!["Rome".to_string()]));
	}

	#[test]
	fn recurring_months_become_labels_and_invalid_ones_drop() {
		let response = build_response(
			"snow cover in winter",
			Vec::new(),
			reply(serde_json::json!({
				"country": [],
				"periodStart": null,
				"periodEnd": null,
				"phase": [12, 1, 13, 0, 2],
				"cleanedQuery": ["snow cover"]
			})),
		);
		let encoded = serde_json::to_value(&response).expect("encode");

		assert_eq!(
			encoded["phase"],
			serde_json::json!([
				{ "kind": "Month", "value": "12", "label": "December" },
				{ "kind": "Month", "value": "01", "label": "January" },
				{ "kind": "Month", "value": "02", "label": "February" }
			])
		);
		assert_eq!(encoded["timerange"], serde_json::json!({ "start": null, "end": null }));
		assert_eq!(encoded["cleanedQuery"], serde_json::json!(["snow cover"]));
	}

	#[test]
	fn reply_without_cleaned_query_is_rejected() {
		assert!(serde_json::from_value::<ExtractionReply>(serde_json::json!({ "country": [] })).is_err());
	}
}
