use time::macros::date;

use mousse_domain::{
	cluster::{Cluster, ClusterElement, ClusterPayload},
	epoch::Epoch,
	filter::{DateInterval, FilterPredicate, FilterSet, MonthSet, SpatialUnion},
	kmeans::{self, KMeans},
};

fn spread_points(n: usize) -> Vec<Vec<f32>> {
	(0..n)
		.map(|i| {
			let angle = i as f32 * 0.7;

			vec![angle.cos() * (1.0 + (i % 5) as f32), angle.sin() * (1.0 + (i % 3) as f32)]
		})
		.collect()
}

#[test]
fn seasons_expand_to_their_months() {
	let winter = MonthSet::from_epochs(&[Epoch::Winter]).expect("winter");
	let mixed = MonthSet::from_epochs(&[Epoch::Summer, Epoch::Jun, Epoch::Jan]).expect("mixed");

	assert_eq!(winter.to_vec(), vec![1, 2, 12]);
	assert_eq!(mixed.to_vec(), vec![1, 6, 7, 8]);
	assert!(MonthSet::new([0]).is_err());
}

#[test]
fn epoch_names_deserialize_from_wire_codes() {
	let epochs: Vec<Epoch> =
		serde_json::from_value(serde_json::json!(["01", "summer", "12"])).expect("epochs");

	assert_eq!(epochs, vec![Epoch::Jan, Epoch::Summer, Epoch::Dec]);
	assert!(serde_json::from_value::<Vec<Epoch>>(serde_json::json!(["13"])).is_err());
}

#[test]
fn filter_fingerprint_ignores_insertion_order() {
	let date = FilterPredicate::DateInterval(
		DateInterval::new(Some(date!(2020 - 01 - 01)), None).expect("interval"),
	);
	let months = FilterPredicate::MonthSet(MonthSet::new([6, 7]).expect("months"));
	let mut a = FilterSet::new();
	let mut b = FilterSet::new();

	a.insert(date.clone());
	a.insert(months.clone());
	b.insert(months);
	b.insert(date);

	assert_eq!(a.fingerprint_value(), b.fingerprint_value());
}

#[test]
fn spatial_union_reports_first_invalid_feature() {
	let features = vec![
		serde_json::json!({
			"type": "Feature",
			"properties": {},
			"geometry": {
				"type": "Polygon",
				"coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
			}
		}),
		serde_json::json!({ "type": "Feature", "properties": {}, "geometry": null }),
	];
	let err = SpatialUnion::from_features(&features).expect_err("null geometry");

	assert_eq!(err.to_string(), "$.features[1].geometry: is required.");
}

#[test]
fn kmeans_is_deterministic_for_a_fixed_seed() {
	let points = spread_points(40);
	let model = KMeans { k: 5, seed: 42, tolerance: 1e-6, max_iterations: 1_000 };
	let first = model.fit(&points).expect("fit");
	let second = model.fit(&points).expect("fit");

	assert_eq!(first, second);
	assert_eq!(
		kmeans::representatives(&points, &first.labels),
		kmeans::representatives(&points, &second.labels)
	);
}

#[test]
fn representatives_stay_inside_their_cluster() {
	let points = spread_points(40);
	let fit = KMeans { k: 5, seed: 42, tolerance: 1e-6, max_iterations: 1_000 }
		.fit(&points)
		.expect("fit");

	let representatives = kmeans::representatives(&points, &fit.labels);

	assert!(representatives.iter().any(Option::is_some));

	for (label, representative) in representatives.iter().enumerate() {
		if let Some(index) = representative {
			assert_eq!(fit.labels[*index], label);
		}
	}
}

#[test]
fn cluster_payload_round_trips_with_version() {
	let id = uuid::Uuid::new_v4();
	let payload = ClusterPayload::new(vec![Cluster {
		id: 0,
		representative_id: id,
		representative_text: "Flood extents".to_string(),
		summary: None,
		elements: vec![ClusterElement { id, text: "Flood extents".to_string(), score: 0.81 }],
	}]);
	let raw = serde_json::to_value(&payload).expect("serialize");

	assert_eq!(raw["clusters"][0]["representativeId"], serde_json::json!(id));

	let decoded: ClusterPayload = serde_json::from_value(raw).expect("deserialize");

	assert!(decoded.is_current());
	assert_eq!(decoded.clusters[0].representative_score(), 0.81);
}
