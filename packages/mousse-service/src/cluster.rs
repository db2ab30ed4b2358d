//! Partitioning of scored hits into titled clusters.

use std::collections::{BTreeMap, HashMap};

use rand::{SeedableRng, rngs::StdRng, seq::index};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use mousse_config::{Clustering, GenerationBudget, LlmProviderConfig};
use mousse_domain::{
	cluster::{Cluster, ClusterElement},
	kmeans::{self, KMeans},
};

use crate::{
	CompletionProvider, Error, Result,
	generation::{self, GenerationError, GenerativeRequest},
};

pub const SUMMARY_PROMPT: &str = "\
You will receive examples from several groups of documents. Each group starts with a line \
'CLUSTER <number>:' followed by example titles from that group, and groups are separated by \
'====NEXT CLUSTER===='.

Give every group one representative title of 5 to 7 words that names the theme its examples \
share, specific enough to tell the groups apart.

Reply with one JSON object that maps each group number, as a string, to its title, for example \
{\"0\": \"Flood extent maps of northern Italy\", \"3\": \"Seasonal drought indices for Europe\"}. \
Reply with JSON only.";

const BATCH_SEPARATOR: &str = "\n\n====NEXT CLUSTER====\n\n";

/// One scored hit with the vector used to cluster it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInput {
	pub id: Uuid,
	pub text: String,
	pub score: f64,
	pub vector: Vec<f32>,
}

pub struct ClusterEngine<'a> {
	pub cfg: &'a Clustering,
	pub budget: &'a GenerationBudget,
	pub llm: &'a LlmProviderConfig,
	pub completion: &'a dyn CompletionProvider,
}
impl ClusterEngine<'_> {
	/// Groups `inputs` into at most `k` clusters, ordered by their representative's score.
	///
	/// Inputs whose vector is empty, non-finite, or of a different dimension than the first
	/// usable one are left out. Summaries are best effort; only a client disconnect aborts.
	pub async fn cluster(
		&self,
		inputs: Vec<ClusterInput>,
		k: usize,
		cancel: &CancellationToken,
	) -> Result<Vec<Cluster>> {
		if k == 0 {
			return Err(Error::InvalidRequest {
				message: "numberOfClusters must be at least 1.".to_string(),
			});
		}

		let total = inputs.len();
		let inputs = usable_inputs(inputs);

		if inputs.is_empty() {
			return Ok(Vec::new());
		}
		if inputs.len() < total {
			tracing::warn!(dropped = total - inputs.len(), "Skipped hits without a usable vector.");
		}

		let k = self.effective_k(k, inputs.len());
		let points = inputs.iter().map(|input| input.vector.clone()).collect::<Vec<_>>();
		let fit = KMeans {
			k,
			seed: self.cfg.seed,
			tolerance: self.cfg.tolerance,
			max_iterations: self.cfg.max_iterations,
		}
		.fit(&points)?;
		let representatives = kmeans::representatives(&points, &fit.labels);
		let mut groups = BTreeMap::<usize, Vec<usize>>::new();

		for (index, label) in fit.labels.iter().enumerate() {
			groups.entry(*label).or_default().push(index);
		}

		tracing::info!(
			hits = inputs.len(),
			clusters = groups.len(),
			iterations = fit.iterations,
			"Clustering finished."
		);

		let texts = inputs.iter().map(|input| input.text.as_str()).collect::<Vec<_>>();
		let mut summaries = self.summarize(&groups, &texts, cancel).await?;
		let mut clusters = Vec::with_capacity(groups.len());

		for (label, members) in &groups {
			let Some(representative) = representatives.get(*label).copied().flatten() else {
				continue;
			};
			let mut elements = members
				.iter()
				.map(|index| {
					let input = &inputs[*index];

					ClusterElement { id: input.id, text: input.text.clone(), score: input.score }
				})
				.collect::<Vec<_>>();

			elements.sort_by(|a, b| b.score.total_cmp(&a.score));
			clusters.push(Cluster {
				id: *label as u32,
				representative_id: inputs[representative].id,
				representative_text: inputs[representative].text.clone(),
				summary: summaries.remove(label),
				elements,
			});
		}

		clusters.sort_by(|a, b| b.representative_score().total_cmp(&a.representative_score()));

		Ok(clusters)
	}

	fn effective_k(&self, requested: usize, available: usize) -> usize {
		if requested <= available {
			return requested;
		}

		let fallback = (self.cfg.fallback_clusters as usize).clamp(1, available);

		tracing::warn!(
			requested,
			available,
			fallback,
			"Too few hits for the requested cluster count. Using the fallback count."
		);

		fallback
	}

	async fn summarize(
		&self,
		groups: &BTreeMap<usize, Vec<usize>>,
		texts: &[&str],
		cancel: &CancellationToken,
	) -> Result<HashMap<usize, String>> {
		let labels = groups.keys().copied().collect::<Vec<_>>();
		let batches = (self.cfg.summary_batches as usize).max(1);
		let mut rng = StdRng::seed_from_u64(self.cfg.seed);
		let mut summaries = HashMap::new();

		for batch_index in 0..batches {
			let batch =
				&labels[batch_index * labels.len() / batches..(batch_index + 1) * labels.len() / batches];

			if batch.is_empty() {
				continue;
			}

			let prompt = batch
				.iter()
				.filter_map(|label| {
					groups.get(label).map(|members| self.cluster_block(*label, members, texts, &mut rng))
				})
				.collect::<Vec<_>>()
				.join(BATCH_SEPARATOR);
			let request = GenerativeRequest::new(SUMMARY_PROMPT, prompt, self.budget);

			match generation::generate::<BTreeMap<String, Value>>(
				self.completion,
				self.llm,
				&request,
				self.budget.max_retries,
				cancel,
			)
			.await
			{
				Ok(generated) => {
					let before = summaries.len();

					for (key, title) in generated.value {
						let Ok(label) = key.trim().parse::<usize>() else {
							continue;
						};
						let Some(title) = title.as_str().map(str::trim) else {
							continue;
						};

						if batch.contains(&label) && !title.is_empty() {
							summaries.insert(label, title.to_string());
						}
					}

					tracing::info!(
						batch = batch_index,
						clusters = batch.len(),
						titled = summaries.len() - before,
						retries = generated.retries,
						"Summary batch finished."
					);
				},
				Err(GenerationError::ClientDisconnected) => return Err(Error::ClientDisconnected),
				Err(err) => {
					tracing::warn!(
						batch = batch_index,
						error = %err,
						"Summary batch failed. Its clusters keep no summary."
					);
				},
			}
		}

		Ok(summaries)
	}

	fn cluster_block(
		&self,
		label: usize,
		members: &[usize],
		texts: &[&str],
		rng: &mut StdRng,
	) -> String {
		let amount = members.len().min(self.cfg.summary_examples as usize);
		let chunk = self.cfg.summary_chunk_chars as usize;
		let examples = index::sample(rng, members.len(), amount)
			.iter()
			.enumerate()
			.map(|(position, pick)| {
				let text = texts[members[pick]].graphemes(true).take(chunk).collect::<String>();

				format!("Example {}:\n{text}", position + 1)
			})
			.collect::<Vec<_>>()
			.join("\n\n");

		format!("CLUSTER {label}:\n{examples}")
	}
}

fn usable_inputs(inputs: Vec<ClusterInput>) -> Vec<ClusterInput> {
	let dim = inputs
		.iter()
		.find(|input| is_usable(&input.vector))
		.map(|input| input.vector.len())
		.unwrap_or(0);

	inputs
		.into_iter()
		.filter(|input| is_usable(&input.vector) && input.vector.len() == dim)
		.collect()
}

fn is_usable(vector: &[f32]) -> bool {
	!vector.is_empty() && vector.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drops_vectors_of_another_dimension() {
		let input = |vector: Vec<f32>| ClusterInput {
			id: Uuid::new_v4(),
			text: "t".to_string(),
			score: 0.5,
			vector,
		};
		let kept = usable_inputs(vec![
			input(Vec::new()),
			input(vec![1.0, 2.0]),
			input(vec![f32::NAN, 1.0]),
			input(vec![1.0, 2.0, 3.0]),
			input(vec![0.5, 0.5]),
		]);

		assert_eq!(kept.len(), 2);
		assert!(kept.iter().all(|input| input.vector.len() == 2));
	}
}
