//! Deduplication and k-means reduction of referenced keyframe values.

use crate::LutKind;
use crate::quantize::{LutVector, quantize};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::collections::HashSet;

/// Lloyd's algorithm settings.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct KMeansParams {
    /// Independent runs from different initial codebooks; the lowest distortion wins.
    pub restarts: u32,
    /// Update steps per run.
    pub max_iterations: u32,
    /// A run stops once the mean distortion improves by no more than this.
    pub threshold: f32,
    pub seed: u64,
}

impl KMeansParams {
    pub const DEFAULT_SEED: u64 = 0x746b_6c5f_6d65_7267;

    pub fn locations() -> Self {
        Self {
            restarts: 5,
            ..Self::default()
        }
    }

    pub fn rotations() -> Self {
        Self {
            restarts: 2,
            ..Self::default()
        }
    }
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            restarts: 5,
            max_iterations: 100,
            threshold: 1e-4,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// Outcome of reducing one LUT.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LutReduction {
    pub lut: LutKind,
    /// Values referenced by the sampled models, duplicates included.
    pub referenced: usize,
    pub unique: usize,
    pub capacity: usize,
    /// Entries in the reduced LUT before padding.
    pub size: usize,
}

impl LutReduction {
    /// Whether distinct values had to be merged to fit the capacity.
    pub fn is_lossy(&self) -> bool {
        self.unique > self.capacity
    }
}

/// Drops exact duplicates (bitwise), keeping first appearances in order.
pub fn dedup_exact<V: LutVector>(values: &[V]) -> Vec<V> {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().copied().filter(|v| seen.insert(v.bits())).collect()
}

/// Reduces `values` to at most `capacity` centroids.
pub fn build_lut<V: LutVector>(
    values: &[V],
    lut: LutKind,
    capacity: usize,
    params: &KMeansParams,
) -> (Vec<V>, LutReduction) {
    let unique = dedup_exact(values);
    let size = unique.len().min(capacity);
    let centroids = kmeans(&unique, size, params);
    let reduction = LutReduction {
        lut,
        referenced: values.len(),
        unique: unique.len(),
        capacity,
        size: centroids.len(),
    };
    (centroids, reduction)
}

/// Clusters `observations` into `k` centroids.
///
/// When `k` covers every observation the observations themselves are the codebook. Otherwise each
/// restart seeds the codebook with `k` distinct observations drawn from a PCG stream seeded with
/// `params.seed`, so results only depend on the inputs and the parameters.
pub fn kmeans<V: LutVector>(observations: &[V], k: usize, params: &KMeansParams) -> Vec<V> {
    if k == 0 || observations.is_empty() {
        return Vec::new();
    }
    if k >= observations.len() {
        return observations.to_vec();
    }

    let mut rng = Pcg64::seed_from_u64(params.seed);
    let mut best: Option<(f64, Vec<V>)> = None;
    for _ in 0..params.restarts.max(1) {
        let initial = sample_distinct(observations, k, &mut rng);
        let (codebook, distortion) = lloyd(observations, initial, params);
        let better = match &best {
            None => true,
            Some((best_distortion, _)) => distortion < *best_distortion,
        };
        if better {
            best = Some((distortion, codebook));
        }
    }
    best.map(|(_, codebook)| codebook).unwrap_or_default()
}

fn sample_distinct<V: Copy, R: Rng>(observations: &[V], k: usize, rng: &mut R) -> Vec<V> {
    let n = observations.len();
    let mut order: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.random_range(i..n);
        order.swap(i, j);
    }
    order[..k].iter().map(|&i| observations[i]).collect()
}

fn lloyd<V: LutVector>(
    observations: &[V],
    mut codebook: Vec<V>,
    params: &KMeansParams,
) -> (Vec<V>, f64) {
    let mut assignment = vec![0usize; observations.len()];
    let mut distortion = assign(observations, &codebook, &mut assignment);
    for _ in 0..params.max_iterations {
        update_means(observations, &assignment, &mut codebook);
        let next = assign(observations, &codebook, &mut assignment);
        let improvement = distortion - next;
        distortion = next;
        if improvement.is_nan() || improvement <= params.threshold as f64 {
            break;
        }
    }
    (codebook, distortion)
}

/// Assigns every observation to its nearest centroid and returns the mean distance.
fn assign<V: LutVector>(observations: &[V], codebook: &[V], assignment: &mut [usize]) -> f64 {
    let mut total = 0.0f64;
    for (slot, &v) in assignment.iter_mut().zip(observations) {
        let i = quantize(v, codebook).unwrap_or(0);
        *slot = i;
        total += (v.distance_squared(codebook[i]) as f64).sqrt();
    }
    total / observations.len().max(1) as f64
}

// Empty clusters keep their previous centroid.
fn update_means<V: LutVector>(observations: &[V], assignment: &[usize], codebook: &mut [V]) {
    let mut sums = vec![V::default(); codebook.len()];
    let mut counts = vec![0u32; codebook.len()];
    for (&v, &i) in observations.iter().zip(assignment) {
        sums[i] = sums[i] + v;
        counts[i] += 1;
    }
    for ((centroid, sum), count) in codebook.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *centroid = sum * (1.0 / count as f32);
        }
    }
}
