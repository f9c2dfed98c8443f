use super::reservoir::reservoir_sample;
use super::{Sample, SampleTable, SamplingStrategy};
use crate::data::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Fractions of the coarse and fine draws for adaptive sampling
pub const ADAPTIVE_FRACTIONS: (f64, f64) = (0.1, 0.2);

/// Sizing for one sample build
#[derive(Debug, Clone, Copy)]
pub struct SamplePlan {
    pub fraction: f64,
    pub reservoir_size: usize,
    pub seed: Option<u64>,
}

/// Independent RNG stream per strategy so seeded builds are reproducible
/// regardless of build order.
fn rng_for(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

/// Keep each row independently with probability `fraction`
pub fn bernoulli_indices<R: Rng + ?Sized>(n: usize, fraction: f64, rng: &mut R) -> Vec<usize> {
    (0..n).filter(|_| rng.gen::<f64>() < fraction).collect()
}

/// Partition rows by the composite key of `dim_cols` and draw
/// `max(1, round(fraction * group_size))` rows per group with replacement.
/// Each draw comes back with its weight, `group_size / draws`, sorted by row.
/// With no dimension columns the whole dataset is one group.
pub fn stratified_draws<R: Rng + ?Sized>(
    dataset: &Dataset,
    dim_cols: &BTreeSet<String>,
    fraction: f64,
    rng: &mut R,
) -> Vec<(usize, f64)> {
    let columns: Vec<_> = dim_cols
        .iter()
        .filter_map(|name| dataset.column(name))
        .collect();

    let mut groups: BTreeMap<Vec<Option<Cow<'_, str>>>, Vec<usize>> = BTreeMap::new();
    for row in 0..dataset.row_count() {
        let key = columns.iter().map(|col| col.key_at(row)).collect();
        groups.entry(key).or_default().push(row);
    }

    let mut draws = Vec::new();
    for members in groups.values() {
        let count = ((fraction * members.len() as f64).round() as usize).max(1);
        let weight = members.len() as f64 / count as f64;
        draws.extend((0..count).map(|_| (members[rng.gen_range(0..members.len())], weight)));
    }
    draws.sort_unstable_by_key(|&(row, _)| row);
    draws
}

/// Build the sample for one strategy
pub fn build_sample(
    dataset: &Dataset,
    strategy: SamplingStrategy,
    dim_cols: &BTreeSet<String>,
    plan: &SamplePlan,
) -> Sample {
    let n = dataset.row_count();
    let mut rng = rng_for(plan.seed, strategy as u64);

    match strategy {
        SamplingStrategy::Random => {
            let indices = bernoulli_indices(n, plan.fraction, &mut rng);
            Sample::Single(SampleTable::new(
                strategy,
                dataset.take(&indices),
                plan.fraction,
            ))
        }
        SamplingStrategy::Stratified => {
            let (indices, weights): (Vec<usize>, Vec<f64>) =
                stratified_draws(dataset, dim_cols, plan.fraction, &mut rng)
                    .into_iter()
                    .unzip();
            let realized = if n == 0 {
                plan.fraction
            } else {
                indices.len() as f64 / n as f64
            };
            Sample::Single(SampleTable::weighted(
                strategy,
                dataset.take(&indices),
                realized,
                weights,
            ))
        }
        SamplingStrategy::Reservoir => {
            let mut indices = reservoir_sample(0..n, plan.reservoir_size, &mut rng);
            indices.sort_unstable();
            let realized = if n == 0 {
                1.0
            } else {
                indices.len() as f64 / n as f64
            };
            Sample::Single(SampleTable::new(strategy, dataset.take(&indices), realized))
        }
        SamplingStrategy::Adaptive => {
            let (f1, f2) = ADAPTIVE_FRACTIONS;
            let f2 = f2.min(1.0);
            let coarse = bernoulli_indices(n, f1, &mut rng);
            let mut fine_rng = rng_for(plan.seed.map(|s| s.wrapping_add(1)), strategy as u64);
            let fine = bernoulli_indices(n, f2, &mut fine_rng);
            Sample::Adaptive {
                coarse: SampleTable::new(strategy, dataset.take(&coarse), f1),
                fine: SampleTable::new(strategy, dataset.take(&fine), f2),
            }
        }
    }
}
