//! Outlier models.
//!
//! [`OutlierModel`] is the seam the detector scores through. The default
//! implementation is an isolation forest: random axis-aligned splits isolate
//! unusual rows in fewer steps than ordinary ones, so a short average path
//! length means "anomalous".

use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};

use super::features::{FEATURE_COUNT, Features};

/// Expected anomalous fraction used when none is configured.
pub const DEFAULT_SENSITIVITY: f64 = 0.15;
pub const MIN_SENSITIVITY: f64 = 0.01;
pub const MAX_SENSITIVITY: f64 = 0.4;

pub const DEFAULT_TREES: usize = 200;
pub const DEFAULT_SUBSAMPLE: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

/// Clamp a requested sensitivity into the supported range.
pub fn clamp_sensitivity(sensitivity: f64) -> f64 {
  if sensitivity.is_nan() {
    return DEFAULT_SENSITIVITY;
  }
  sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY)
}

/// Per-row verdicts. Lower scores are more anomalous; a negative score is
/// what makes a row anomalous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
  pub anomalous: Vec<bool>,
  pub scores:    Vec<f64>,
}

/// Fit-and-score strategy over a feature matrix. Implementations must return
/// one verdict per input row, in input order.
pub trait OutlierModel: Send + Sync {
  fn score(&self, features: &[Features]) -> Scores;
}

// ─── Isolation forest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
  pub trees:     usize,
  pub subsample: usize,
  /// Expected fraction of anomalous rows; always within
  /// `[MIN_SENSITIVITY, MAX_SENSITIVITY]`.
  sensitivity:   f64,
  pub seed:      u64,
}

impl Default for IsolationForest {
  fn default() -> Self {
    Self {
      trees:       DEFAULT_TREES,
      subsample:   DEFAULT_SUBSAMPLE,
      sensitivity: DEFAULT_SENSITIVITY,
      seed:        DEFAULT_SEED,
    }
  }
}

impl IsolationForest {
  pub fn new(sensitivity: f64) -> Self {
    Self { sensitivity: clamp_sensitivity(sensitivity), ..Self::default() }
  }

  pub fn with_trees(mut self, trees: usize) -> Self {
    self.trees = trees.max(1);
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = seed;
    self
  }

  pub fn sensitivity(&self) -> f64 { self.sensitivity }

  /// Mean isolation depth of every row across a freshly grown forest.
  fn mean_path_lengths(&self, data: &[Features], sample_size: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(self.seed);
    let height_limit = (sample_size as f64).log2().ceil() as usize;
    let mut totals = vec![0.0; data.len()];

    for _ in 0..self.trees {
      let sample = index::sample(&mut rng, data.len(), sample_size).into_vec();
      let tree = Tree::grow(data, sample, height_limit, &mut rng);
      for (total, row) in totals.iter_mut().zip(data) {
        *total += tree.path_length(row);
      }
    }

    totals.into_iter().map(|t| t / self.trees as f64).collect()
  }
}

impl OutlierModel for IsolationForest {
  fn score(&self, features: &[Features]) -> Scores {
    if features.is_empty() {
      return Scores::default();
    }
    let sample_size = self.subsample.min(features.len()).max(1);
    let normaliser = average_path_length(sample_size);

    // Negated anomaly score: the higher, the more ordinary.
    let raw: Vec<f64> = self
      .mean_path_lengths(features, sample_size)
      .into_iter()
      .map(|depth| {
        let s = if normaliser > 0.0 { 2f64.powf(-depth / normaliser) } else { 0.5 };
        -s
      })
      .collect();

    let offset = percentile(&raw, self.sensitivity * 100.0);
    let scores: Vec<f64> = raw.iter().map(|r| r - offset).collect();
    Scores { anomalous: scores.iter().map(|s| *s < 0.0).collect(), scores }
  }
}

// ─── Trees ───────────────────────────────────────────────────────────────────

enum Node {
  Leaf {
    size: usize,
  },
  Split {
    feature:   usize,
    threshold: f64,
    left:      usize,
    right:     usize,
  },
}

struct Tree {
  nodes: Vec<Node>,
}

impl Tree {
  fn grow(
    data: &[Features],
    sample: Vec<usize>,
    height_limit: usize,
    rng: &mut StdRng,
  ) -> Self {
    let mut tree = Tree { nodes: Vec::new() };
    tree.build(data, sample, 0, height_limit, rng);
    tree
  }

  /// Append the subtree for `rows` and return its root index.
  fn build(
    &mut self,
    data: &[Features],
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
  ) -> usize {
    let index = self.nodes.len();
    self.nodes.push(Node::Leaf { size: rows.len() });
    if rows.len() <= 1 || depth >= height_limit {
      return index;
    }

    // Only features that still vary within the node can split it.
    let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
      .filter_map(|f| {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
          (lo.min(data[r][f]), hi.max(data[r][f]))
        });
        (lo < hi).then_some((f, lo, hi))
      })
      .collect();
    if splittable.is_empty() {
      return index;
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
      rows.into_iter().partition(|&r| data[r][feature] <= threshold);

    let left = self.build(data, left_rows, depth + 1, height_limit, rng);
    let right = self.build(data, right_rows, depth + 1, height_limit, rng);
    self.nodes[index] = Node::Split { feature, threshold, left, right };
    index
  }

  fn path_length(&self, row: &Features) -> f64 {
    let mut node = 0;
    let mut depth = 0.0;
    loop {
      match self.nodes[node] {
        Node::Leaf { size } => return depth + average_path_length(size),
        Node::Split { feature, threshold, left, right } => {
          node = if row[feature] <= threshold { left } else { right };
          depth += 1.0;
        }
      }
    }
  }
}

/// Average path length of an unsuccessful binary-search-tree lookup among
/// `n` points; corrects the depth of leaves that were not fully isolated.
fn average_path_length(n: usize) -> f64 {
  const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
  match n {
    0 | 1 => 0.0,
    2 => 1.0,
    _ => {
      let n = n as f64;
      2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
    }
  }
}

/// Linear-interpolation percentile, `pct` in `[0, 100]`.
fn percentile(values: &[f64], pct: f64) -> f64 {
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  if sorted.is_empty() {
    return 0.0;
  }
  let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let below = rank.floor() as usize;
  let above = rank.ceil() as usize;
  sorted[below] + (sorted[above] - sorted[below]) * (rank - below as f64)
}
