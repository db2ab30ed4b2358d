//! Recurring yearly periods: calendar months and the four seasons.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const MONTH_LABELS: [&str; 12] = [
	"January",
	"February",
	"March",
	"April",
	"May",
	"June",
	"July",
	"August",
	"September",
	"October",
	"November",
	"December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Epoch {
	#[serde(rename = "01")]
	Jan,
	#[serde(rename = "02")]
	Feb,
	#[serde(rename = "03")]
	Mar,
	#[serde(rename = "04")]
	Apr,
	#[serde(rename = "05")]
	May,
	#[serde(rename = "06")]
	Jun,
	#[serde(rename = "07")]
	Jul,
	#[serde(rename = "08")]
	Aug,
	#[serde(rename = "09")]
	Sep,
	#[serde(rename = "10")]
	Oct,
	#[serde(rename = "11")]
	Nov,
	#[serde(rename = "12")]
	Dec,
	#[serde(rename = "winter")]
	Winter,
	#[serde(rename = "spring")]
	Spring,
	#[serde(rename = "summer")]
	Summer,
	#[serde(rename = "autumn")]
	Autumn,
}
impl Epoch {
	/// Months covered by this epoch, 1-based.
	pub fn months(self) -> &'static [u8] {
		match self {
			Self::Jan => &[1],
			Self::Feb => &[2],
			Self::Mar => &[3],
			Self::Apr => &[4],
			Self::May => &[5],
			Self::Jun => &[6],
			Self::Jul => &[7],
			Self::Aug => &[8],
			Self::Sep => &[9],
			Self::Oct => &[10],
			Self::Nov => &[11],
			Self::Dec => &[12],
			Self::Winter => &[12, 1, 2],
			Self::Spring => &[3, 4, 5],
			Self::Summer => &[6, 7, 8],
			Self::Autumn => &[9, 10, 11],
		}
	}
}

/// Expands months and season names into one deduplicated month set.
pub fn expand_epochs(epochs: &[Epoch]) -> BTreeSet<u8> {
	epochs.iter().flat_map(|epoch| epoch.months().iter().copied()).collect()
}

pub fn month_label(month: u8) -> Option<&'static str> {
	MONTH_LABELS.get(usize::from(month).checked_sub(1)?).copied()
}

/// Zero-padded wire code of a month, e.g. `"03"`.
pub fn month_code(month: u8) -> String {
	format!("{month:02}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn seasons_expand_and_dedupe_with_months() {
		let months = expand_epochs(&[Epoch::Winter, Epoch::Jan, Epoch::Summer]);

		assert_eq!(months.into_iter().collect::<Vec<_>>(), vec![1, 2, 6, 7, 8, 12]);
	}

	#[test]
	fn month_labels_are_one_based() {
		assert_eq!(month_label(1), Some("January"));
		assert_eq!(month_label(12), Some("December"));
		assert_eq!(month_label(0), None);
		assert_eq!(month_label(13), None);
		assert_eq!(month_code(7), "07");
	}
}
