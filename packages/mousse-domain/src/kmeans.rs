//! Seeded k-means over dense vectors.
//!
//! Initialization uses k-means++ driven by a seeded `StdRng`, followed by Lloyd iterations.
//! With the same points, `k`, and seed the output is identical across runs.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct KMeans {
	pub k: usize,
	pub seed: u64,
	/// Relative tolerance on centroid movement, scaled by the mean per-dimension variance.
	pub tolerance: f64,
	pub max_iterations: u32,
}
impl KMeans {
	pub fn fit(&self, points: &[Vec<f32>]) -> Result<KMeansFit> {
		let dim = validate_points(points)?;

		if self.k == 0 {
			return Err(invalid("k must be greater than zero."));
		}
		if self.k > points.len() {
			return Err(invalid(format!(
				"k = {} exceeds the number of points ({}).",
				self.k,
				points.len()
			)));
		}

		let data = points
			.iter()
			.map(|point| point.iter().map(|v| f64::from(*v)).collect::<Vec<_>>())
			.collect::<Vec<_>>();
		let threshold = self.tolerance * mean_variance(&data, dim);
		let mut rng = StdRng::seed_from_u64(self.seed);
		let mut centroids = init_plus_plus(&data, self.k, &mut rng);
		let mut labels = vec![0_usize; data.len()];
		let mut iterations = 0;

		while iterations < self.max_iterations {
			iterations += 1;

			assign(&data, &centroids, &mut labels);

			let next = update(&data, &labels, &centroids, dim);
			let shift = centroids
				.iter()
				.zip(&next)
				.map(|(old, new)| squared_distance(old, new))
				.sum::<f64>();

			centroids = next;

			if shift <= threshold {
				break;
			}
		}

		assign(&data, &centroids, &mut labels);

		Ok(KMeansFit { labels, centroids, iterations })
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
	/// Cluster label per input point, in `0..k`.
	pub labels: Vec<usize>,
	pub centroids: Vec<Vec<f64>>,
	pub iterations: u32,
}

/// For every label in `0..=max(labels)`, the index of the member closest to the members' mean.
///
/// Labels without members map to `None`.
pub fn representatives(points: &[Vec<f32>], labels: &[usize]) -> Vec<Option<usize>> {
	let k = labels.iter().max().map(|max| max + 1).unwrap_or(0);
	let dim = points.first().map(Vec::len).unwrap_or(0);
	let mut sums = vec![vec![0.0_f64; dim]; k];
	let mut counts = vec![0_usize; k];

	for (point, label) in points.iter().zip(labels) {
		counts[*label] += 1;

		for (sum, value) in sums[*label].iter_mut().zip(point) {
			*sum += f64::from(*value);
		}
	}

	let means = sums
		.into_iter()
		.zip(&counts)
		.map(|(sum, count)| {
			let count = (*count).max(1) as f64;

			sum.into_iter().map(|v| v / count).collect::<Vec<_>>()
		})
		.collect::<Vec<_>>();
	let mut best: Vec<Option<(usize, f64)>> = vec![None; k];

	for (index, (point, label)) in points.iter().zip(labels).enumerate() {
		let point = point.iter().map(|v| f64::from(*v)).collect::<Vec<_>>();
		let distance = squared_distance(&point, &means[*label]);

		match best[*label] {
			Some((_, current)) if current <= distance => {},
			_ => best[*label] = Some((index, distance)),
		}
	}

	best.into_iter().map(|entry| entry.map(|(index, _)| index)).collect()
}

fn validate_points(points: &[Vec<f32>]) -> Result<usize> {
	let dim = points.first().map(Vec::len).ok_or_else(|| invalid("no points to cluster."))?;

	if dim == 0 {
		return Err(invalid("points must have at least one dimension."));
	}

	for (index, point) in points.iter().enumerate() {
		if point.len() != dim {
			return Err(invalid(format!(
				"point {index} has dimension {}, expected {dim}.",
				point.len()
			)));
		}
		if point.iter().any(|v| !v.is_finite()) {
			return Err(invalid(format!("point {index} contains a non-finite value.")));
		}
	}

	Ok(dim)
}

fn init_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
	let mut centroids = Vec::with_capacity(k);

	centroids.push(data[rng.random_range(0..data.len())].clone());

	let mut nearest = data.iter().map(|point| squared_distance(point, &centroids[0])).collect::<Vec<_>>();

	while centroids.len() < k {
		let total = nearest.iter().sum::<f64>();
		let next = if total > 0.0 {
			let mut target = rng.random::<f64>() * total;

			nearest
				.iter()
				.position(|weight| {
					target -= weight;

					target < 0.0
				})
				.unwrap_or_else(|| last_positive(&nearest))
		} else {
			// All remaining points coincide with a centroid.
			centroids.len() % data.len()
		};
		let centroid = data[next].clone();

		for (point, best) in data.iter().zip(nearest.iter_mut()) {
			*best = best.min(squared_distance(point, &centroid));
		}

		centroids.push(centroid);
	}

	centroids
}

fn last_positive(weights: &[f64]) -> usize {
	weights.iter().rposition(|weight| *weight > 0.0).unwrap_or(0)
}

fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>], labels: &mut [usize]) {
	for (point, label) in data.iter().zip(labels.iter_mut()) {
		*label = nearest_centroid(point, centroids);
	}
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
	let mut best = (0, f64::INFINITY);

	for (index, centroid) in centroids.iter().enumerate() {
		let distance = squared_distance(point, centroid);

		if distance < best.1 {
			best = (index, distance);
		}
	}

	best.0
}

fn update(data: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>], dim: usize) -> Vec<Vec<f64>> {
	let k = previous.len();
	let mut sums = vec![vec![0.0_f64; dim]; k];
	let mut counts = vec![0_usize; k];

	for (point, label) in data.iter().zip(labels) {
		counts[*label] += 1;

		for (sum, value) in sums[*label].iter_mut().zip(point) {
			*sum += value;
		}
	}

	let mut centroids = sums
		.into_iter()
		.zip(&counts)
		.map(|(sum, count)| {
			let count = (*count).max(1) as f64;

			sum.into_iter().map(|v| v / count).collect::<Vec<_>>()
		})
		.collect::<Vec<_>>();

	// An empty cluster takes over the point farthest from its current centroid.
	for cluster in (0..k).filter(|cluster| counts[*cluster] == 0) {
		let farthest = data
			.iter()
			.zip(labels)
			.enumerate()
			.map(|(index, (point, label))| (index, squared_distance(point, &previous[*label])))
			.fold((0, f64::NEG_INFINITY), |best, candidate| {
				if candidate.1 > best.1 { candidate } else { best }
			})
			.0;

		centroids[cluster] = data[farthest].clone();
	}

	centroids
}

fn mean_variance(data: &[Vec<f64>], dim: usize) -> f64 {
	let n = data.len() as f64;
	let mut total = 0.0;

	for d in 0..dim {
		let mean = data.iter().map(|point| point[d]).sum::<f64>() / n;

		total += data.iter().map(|point| (point[d] - mean).powi(2)).sum::<f64>() / n;
	}

	total / dim as f64
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
	a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn invalid(message: impl Into<String>) -> Error {
	Error::InvalidClustering { message: message.into() }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn blobs() -> Vec<Vec<f32>> {
		let mut points = Vec::new();

		for (cx, cy) in [(0.0_f32, 0.0_f32), (10.0, 10.0), (-10.0, 10.0)] {
			for i in 0..6 {
				let offset = i as f32 * 0.1;

				points.push(vec![cx + offset, cy - offset]);
			}
		}

		points
	}

	#[test]
	fn separates_well_spaced_blobs() {
		let fit = KMeans { k: 3, seed: 42, tolerance: 1e-6, max_iterations: 100 }
			.fit(&blobs())
			.expect("fit");

		for chunk in fit.labels.chunks(6) {
			assert!(chunk.iter().all(|label| *label == chunk[0]));
		}

		let mut distinct = fit.labels.clone();

		distinct.sort_unstable();
		distinct.dedup();

		assert_eq!(distinct, vec![0, 1, 2]);
	}

	#[test]
	fn rejects_bad_inputs() {
		let model = KMeans { k: 4, seed: 1, tolerance: 1e-6, max_iterations: 10 };

		assert!(model.fit(&[vec![0.0], vec![1.0]]).is_err());
		assert!(model.fit(&[]).is_err());
		assert!(
			KMeans { k: 1, ..model }.fit(&[vec![0.0, 1.0], vec![1.0]]).is_err()
		);
	}

	#[test]
	fn coincident_points_still_fit() {
		let points = vec![vec![1.0_f32, 1.0]; 5];
		let fit = KMeans { k: 3, seed: 7, tolerance: 1e-6, max_iterations: 10 }
			.fit(&points)
			.expect("fit");

		assert_eq!(fit.labels.len(), 5);
	}
}
