//! Typed filter predicates.
//!
//! Each predicate is one independent constraint over the record corpus. Predicates only carry
//! validated values; turning them into candidate-set queries is the storage layer's job.

use std::{
	collections::{BTreeMap, BTreeSet},
	fmt::{self, Display, Formatter},
	str::FromStr,
};

use serde::Serialize;
use serde_json::Value;
use time::Date;

use crate::{
	Error, Result,
	epoch::{self, Epoch},
	geometry::{self, AreaGeometry},
};

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// Filter kinds, in the order their candidate sets appear in a composed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
	Country,
	Spatial,
	DateRange,
	Epoch,
}
impl Topic {
	pub const ALL: [Self; 4] = [Self::Country, Self::Spatial, Self::DateRange, Self::Epoch];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Country => "country",
			Self::Spatial => "spatial",
			Self::DateRange => "daterange",
			Self::Epoch => "epoch",
		}
	}

	/// Name of the common table expression holding this topic's candidate set.
	pub fn cte_name(self) -> &'static str {
		match self {
			Self::Country => "country_filtered",
			Self::Spatial => "spatially_filtered",
			Self::DateRange => "date_filtered",
			Self::Epoch => "epoch_filtered",
		}
	}
}
impl FromStr for Topic {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::ALL
			.into_iter()
			.find(|topic| topic.as_str() == s)
			.ok_or_else(|| Error::UnknownTopic { topic: s.to_string() })
	}
}
impl Display for Topic {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
	CountrySet(CountrySet),
	SpatialUnion(SpatialUnion),
	DateInterval(DateInterval),
	MonthSet(MonthSet),
}
impl FilterPredicate {
	pub fn topic(&self) -> Topic {
		match self {
			Self::CountrySet(_) => Topic::Country,
			Self::SpatialUnion(_) => Topic::Spatial,
			Self::DateInterval(_) => Topic::DateRange,
			Self::MonthSet(_) => Topic::Epoch,
		}
	}

	/// Order-independent representation used for request fingerprints.
	pub fn fingerprint_value(&self) -> Value {
		match self {
			Self::CountrySet(set) => serde_json::json!(set.codes),
			Self::SpatialUnion(union) => {
				let mut geometries = union.geojson();

				geometries.sort();

				serde_json::json!(geometries)
			},
			Self::DateInterval(interval) => serde_json::json!({
				"start": interval.start.map(|date| date.to_string()),
				"end": interval.end.map(|date| date.to_string()),
			}),
			Self::MonthSet(set) => serde_json::json!(set.months),
		}
	}
}

/// At most one predicate per topic; inserting a second predicate for a topic replaces the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
	predicates: BTreeMap<Topic, FilterPredicate>,
}
impl FilterSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, predicate: FilterPredicate) -> Option<FilterPredicate> {
		self.predicates.insert(predicate.topic(), predicate)
	}

	pub fn is_empty(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn len(&self) -> usize {
		self.predicates.len()
	}

	/// Predicates in topic order.
	pub fn iter(&self) -> impl Iterator<Item = &FilterPredicate> {
		self.predicates.values()
	}

	pub fn fingerprint_value(&self) -> Value {
		let map = self
			.predicates
			.iter()
			.map(|(topic, predicate)| (topic.as_str().to_string(), predicate.fingerprint_value()))
			.collect::<serde_json::Map<_, _>>();

		Value::Object(map)
	}
}

/// ISO 3166 alpha-2 country codes, uppercased and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountrySet {
	codes: BTreeSet<String>,
}
impl CountrySet {
	pub fn new<I, S>(codes: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut out = BTreeSet::new();

		for code in codes {
			let code = code.as_ref().trim();

			if code.is_empty() {
				continue;
			}
			if !code.chars().all(|c| c.is_ascii_alphabetic()) {
				return Err(Error::InvalidPredicate {
					field: "countries",
					message: format!("'{code}' is not a country code."),
				});
			}

			out.insert(code.to_ascii_uppercase());
		}

		if out.is_empty() {
			return Err(Error::InvalidPredicate {
				field: "countries",
				message: "at least one country code is required.".to_string(),
			});
		}

		Ok(Self { codes: out })
	}

	pub fn codes(&self) -> impl Iterator<Item = &str> {
		self.codes.iter().map(String::as_str)
	}

	pub fn to_vec(&self) -> Vec<String> {
		self.codes.iter().cloned().collect()
	}
}

/// User-supplied areas whose union bounds the search. Never simplified.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialUnion {
	areas: Vec<AreaGeometry>,
}
impl SpatialUnion {
	pub fn from_features(features: &[Value]) -> Result<Self> {
		Ok(Self { areas: geometry::parse_areas(features)? })
	}

	pub fn geojson(&self) -> Vec<String> {
		self.areas.iter().map(AreaGeometry::to_geojson).collect()
	}
}

/// Inclusive date interval; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateInterval {
	#[serde(with = "iso_date::option")]
	start: Option<Date>,
	#[serde(with = "iso_date::option")]
	end: Option<Date>,
}
impl DateInterval {
	pub fn new(start: Option<Date>, end: Option<Date>) -> Result<Self> {
		match (start, end) {
			(None, None) => Err(Error::InvalidPredicate {
				field: "dateRange",
				message: "start or end is required.".to_string(),
			}),
			(Some(start), Some(end)) if start > end => Err(Error::InvalidPredicate {
				field: "dateRange",
				message: format!("start {start} is after end {end}."),
			}),
			_ => Ok(Self { start, end }),
		}
	}

	/// Closed bounds with open ends widened to the representable extremes.
	pub fn bounds(&self) -> (Date, Date) {
		(self.start.unwrap_or(min_date()), self.end.unwrap_or(max_date()))
	}
}

/// Calendar months, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthSet {
	months: BTreeSet<u8>,
}
impl MonthSet {
	pub fn new(months: impl IntoIterator<Item = u8>) -> Result<Self> {
		let months = months.into_iter().collect::<BTreeSet<_>>();

		if months.is_empty() {
			return Err(Error::InvalidPredicate {
				field: "epoch",
				message: "at least one month is required.".to_string(),
			});
		}
		if let Some(bad) = months.iter().find(|month| !(1..=12).contains(*month)) {
			return Err(Error::InvalidPredicate {
				field: "epoch",
				message: format!("month {bad} is outside 1-12."),
			});
		}

		Ok(Self { months })
	}

	pub fn from_epochs(epochs: &[Epoch]) -> Result<Self> {
		Self::new(epoch::expand_epochs(epochs))
	}

	pub fn to_vec(&self) -> Vec<i32> {
		self.months.iter().map(|month| i32::from(*month)).collect()
	}
}

pub fn min_date() -> Date {
	time::macros::date!(0001 - 01 - 01)
}

pub fn max_date() -> Date {
	time::macros::date!(9999 - 12 - 31)
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	#[test]
	fn topics_parse_and_reject_unknown_names() {
		assert_eq!("daterange".parse::<Topic>(), Ok(Topic::DateRange));
		assert_eq!(
			"keywords".parse::<Topic>(),
			Err(Error::UnknownTopic { topic: "keywords".to_string() })
		);
	}

	#[test]
	fn later_insert_replaces_same_topic() {
		let mut set = FilterSet::new();

		set.insert(FilterPredicate::CountrySet(CountrySet::new(["IT"]).expect("codes")));

		let previous =
			set.insert(FilterPredicate::CountrySet(CountrySet::new(["fr"]).expect("codes")));

		assert!(previous.is_some());
		assert_eq!(set.len(), 1);
		assert_eq!(set.fingerprint_value(), serde_json::json!({ "country": ["FR"] }));
	}

	#[test]
	fn country_codes_are_normalized() {
		let set = CountrySet::new([" it", "FR", "it", ""]).expect("codes");

		assert_eq!(set.to_vec(), vec!["FR".to_string(), "IT".to_string()]);
		assert!(CountrySet::new(Vec::<String>::new()).is_err());
		assert!(CountrySet::new(["I'T"]).is_err());
	}

	#[test]
	fn open_date_bounds_widen() {
		let interval = DateInterval::new(Some(date!(2024 - 06 - 01)), None).expect("interval");

		assert_eq!(interval.bounds(), (date!(2024 - 06 - 01), max_date()));
		assert_eq!(
			DateInterval::new(None, Some(date!(2024 - 06 - 01))).expect("interval").bounds(),
			(min_date(), date!(2024 - 06 - 01))
		);
		assert!(DateInterval::new(None, None).is_err());
		assert!(DateInterval::new(Some(date!(2024 - 02 - 01)), Some(date!(2024 - 01 - 01))).is_err());
	}
}
