use serde_json::Value;

use mousse_domain::filter::CountrySet;
use mousse_storage::{models::CountryRow, queries};

use crate::{MousseService, Result};

impl MousseService {
	pub async fn countries(&self) -> Result<Vec<CountryRow>> {
		Ok(queries::list_countries(&self.db).await?)
	}

	/// Boundaries for a `;`-separated list of country codes, e.g. `"IT;FR"`.
	pub async fn country_geojson(&self, codes: &str) -> Result<Value> {
		let codes = parse_codes(codes)?;

		Ok(queries::country_feature_collection(&self.db, &codes).await?)
	}
}

fn parse_codes(raw: &str) -> Result<Vec<String>> {
	Ok(CountrySet::new(raw.split(';'))?.to_vec())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn codes_split_on_semicolons() {
		assert_eq!(
			parse_codes("it; FR;;").expect("codes"),
			vec!["FR".to_string(), "IT".to_string()]
		);
		assert!(parse_codes(" ; ").is_err());
		assert!(parse_codes("I1").is_err());
	}
}
