//! Structural validation of user-supplied GeoJSON areas.
//!
//! Only polygonal geometries are accepted. Validation happens before any query is built so
//! that malformed input never reaches the storage engine.

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

type Position = Vec<f64>;
type Ring = Vec<Position>;

const MIN_RING_POSITIONS: usize = 4;

/// A validated polygon or multipolygon in WGS84 coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum AreaGeometry {
	Polygon(Vec<Ring>),
	MultiPolygon(Vec<Vec<Ring>>),
}
impl AreaGeometry {
	/// Canonical GeoJSON text, suitable for `ST_GeomFromGeoJSON`.
	pub fn to_geojson(&self) -> String {
		serde_json::to_string(self).unwrap_or_default()
	}
}

/// Collects every polygonal geometry from a list of GeoJSON features, feature collections, or
/// bare geometries.
pub fn parse_areas(values: &[Value]) -> Result<Vec<AreaGeometry>> {
	let mut out = Vec::new();

	for (index, value) in values.iter().enumerate() {
		collect_areas(value, &format!("$.features[{index}]"), &mut out)?;
	}

	if out.is_empty() {
		return Err(invalid("$.features", "at least one polygonal geometry is required."));
	}

	Ok(out)
}

fn collect_areas(value: &Value, path: &str, out: &mut Vec<AreaGeometry>) -> Result<()> {
	let obj = value.as_object().ok_or_else(|| invalid(path, "must be a GeoJSON object."))?;
	let kind = obj
		.get("type")
		.and_then(Value::as_str)
		.ok_or_else(|| invalid(&format!("{path}.type"), "is required."))?;

	match kind {
		"FeatureCollection" => {
			let features = obj
				.get("features")
				.and_then(Value::as_array)
				.ok_or_else(|| invalid(&format!("{path}.features"), "must be an array."))?;

			for (index, feature) in features.iter().enumerate() {
				collect_areas(feature, &format!("{path}.features[{index}]"), out)?;
			}

			Ok(())
		},
		"Feature" => {
			let geometry = obj
				.get("geometry")
				.filter(|geometry| !geometry.is_null())
				.ok_or_else(|| invalid(&format!("{path}.geometry"), "is required."))?;

			collect_areas(geometry, &format!("{path}.geometry"), out)
		},
		"Polygon" => {
			let coordinates = coordinates(obj.get("coordinates"), path)?;

			out.push(AreaGeometry::Polygon(parse_polygon(coordinates, &format!("{path}.coordinates"))?));

			Ok(())
		},
		"MultiPolygon" => {
			let coordinates = coordinates(obj.get("coordinates"), path)?;
			let mut polygons = Vec::with_capacity(coordinates.len());

			if coordinates.is_empty() {
				return Err(invalid(&format!("{path}.coordinates"), "must contain a polygon."));
			}

			for (index, polygon) in coordinates.iter().enumerate() {
				let polygon_path = format!("{path}.coordinates[{index}]");
				let rings = polygon
					.as_array()
					.ok_or_else(|| invalid(&polygon_path, "must be an array of rings."))?;

				polygons.push(parse_polygon(rings, &polygon_path)?);
			}

			out.push(AreaGeometry::MultiPolygon(polygons));

			Ok(())
		},
		other => Err(invalid(
			&format!("{path}.type"),
			&format!("'{other}' is not supported; expected Polygon or MultiPolygon."),
		)),
	}
}

fn coordinates<'a>(value: Option<&'a Value>, path: &str) -> Result<&'a Vec<Value>> {
	value
		.and_then(Value::as_array)
		.ok_or_else(|| invalid(&format!("{path}.coordinates"), "must be an array."))
}

fn parse_polygon(rings: &[Value], path: &str) -> Result<Vec<Ring>> {
	if rings.is_empty() {
		return Err(invalid(path, "must contain an exterior ring."));
	}

	rings
		.iter()
		.enumerate()
		.map(|(index, ring)| parse_ring(ring, &format!("{path}[{index}]")))
		.collect()
}

fn parse_ring(value: &Value, path: &str) -> Result<Ring> {
	let positions = value.as_array().ok_or_else(|| invalid(path, "must be an array."))?;

	if positions.len() < MIN_RING_POSITIONS {
		return Err(invalid(path, "a linear ring needs at least four positions."));
	}

	let ring = positions
		.iter()
		.enumerate()
		.map(|(index, position)| parse_position(position, &format!("{path}[{index}]")))
		.collect::<Result<Ring>>()?;

	if ring.first().map(|p| &p[..2]) != ring.last().map(|p| &p[..2]) {
		return Err(invalid(path, "a linear ring must be closed."));
	}

	Ok(ring)
}

fn parse_position(value: &Value, path: &str) -> Result<Position> {
	let raw = value.as_array().ok_or_else(|| invalid(path, "must be an array."))?;

	if !(2..=3).contains(&raw.len()) {
		return Err(invalid(path, "a position must have two or three numbers."));
	}

	let position = raw
		.iter()
		.map(|n| n.as_f64().filter(|n| n.is_finite()))
		.collect::<Option<Position>>()
		.ok_or_else(|| invalid(path, "coordinates must be finite numbers."))?;

	if !(-180.0..=180.0).contains(&position[0]) || !(-90.0..=90.0).contains(&position[1]) {
		return Err(invalid(path, "longitude/latitude out of range."));
	}

	Ok(position)
}

fn invalid(path: &str, message: &str) -> Error {
	Error::InvalidGeometry { path: path.to_string(), message: message.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn square() -> Value {
		serde_json::json!({
			"type": "Polygon",
			"coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
		})
	}

	#[test]
	fn accepts_features_and_collections() {
		let feature = serde_json::json!({ "type": "Feature", "properties": {}, "geometry": square() });
		let collection = serde_json::json!({ "type": "FeatureCollection", "features": [feature.clone()] });
		let areas = parse_areas(&[feature, collection, square()]).expect("valid areas");

		assert_eq!(areas.len(), 3);
		assert!(areas[0].to_geojson().starts_with("{\"type\":\"Polygon\",\"coordinates\":"));
	}

	#[test]
	fn rejects_open_rings_with_path() {
		let open = serde_json::json!({
			"type": "Polygon",
			"coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]
		});
		let err = parse_areas(&[open]).expect_err("open ring");

		assert_eq!(
			err,
			Error::InvalidGeometry {
				path: "$.features[0].coordinates[0]".to_string(),
				message: "a linear ring must be closed.".to_string(),
			}
		);
	}

	#[test]
	fn rejects_points_and_out_of_range_coordinates() {
		let point = serde_json::json!({ "type": "Point", "coordinates": [0.0, 0.0] });

		assert!(parse_areas(&[point]).is_err());

		let far = serde_json::json!({
			"type": "Polygon",
			"coordinates": [[[0.0, 0.0], [200.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
		});

		assert!(parse_areas(&[far]).is_err());
	}
}
