//! Isolation-forest anomaly model with fit-time feature normalization
//!
//! The forest isolates points by random axis-aligned splits; anomalous
//! points need fewer splits, so short average path lengths signal outliers.
//! Raw scores are exposed in [-1, 1] with more negative = more anomalous.
//! All randomness is seeded, so fit-then-score on identical data is
//! reproducible.

use crate::features::FeatureMatrix;
use crate::RiskError;
use rand::rngs::StdRng;
use rand::{seq::index, Rng, SeedableRng};

/// Fixed seed so repeated fits on identical data build identical forests
const MODEL_SEED: u64 = 42;

/// Subsample cap per tree
const MAX_TREE_SAMPLES: usize = 256;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Per-column zero-mean unit-variance scaling with statistics captured at
/// fit time. Zero-variance columns divide by 1.0 so constant features map
/// to 0 instead of NaN.
#[derive(Debug, Clone)]
struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    fn fit(matrix: &FeatureMatrix) -> Self {
        let n = matrix.n_rows() as f64;
        let dim = matrix.dim();

        let mut means = vec![0.0; dim];
        for row in matrix.rows() {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut stds = vec![0.0; dim];
        for row in matrix.rows() {
            for (col, value) in row.iter().enumerate() {
                stds[col] += (value - means[col]).powi(2);
            }
        }
        for std in &mut stds {
            *std = (*std / n).sqrt();
            if *std == 0.0 {
                *std = 1.0;
            }
        }

        Self { means, stds }
    }

    fn transform(&self, matrix: &FeatureMatrix) -> Vec<Vec<f64>> {
        matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(col, value)| (value - self.means[col]) / self.stds[col])
                    .collect()
            })
            .collect()
    }
}

enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(data: &[Vec<f64>], indices: &[usize], height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(data, indices, 0, height_limit, rng),
        }
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *split { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn build_node(
    data: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if indices.len() <= 1 || depth >= height_limit {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Only features that actually vary in this partition can split it
    let dim = data[indices[0]].len();
    let candidates: Vec<usize> = (0..dim)
        .filter(|&feature| {
            let first = data[indices[0]][feature];
            indices.iter().any(|&i| data[i][feature] != first)
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let feature = candidates[rng.gen_range(0..candidates.len())];
    let (min, max) = indices
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &i| {
            let v = data[i][feature];
            (min.min(v), max.max(v))
        });
    let split = rng.gen_range(min..max);

    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.iter().partition(|&&i| data[i][feature] < split);

    Node::Internal {
        feature,
        split,
        left: Box::new(build_node(data, &left, depth + 1, height_limit, rng)),
        right: Box::new(build_node(data, &right, depth + 1, height_limit, rng)),
    }
}

/// Expected path length of an unsuccessful BST search over n points;
/// normalizes path lengths across subsample sizes.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    fn fit(data: &[Vec<f64>], n_estimators: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(MODEL_SEED);
        let sample_size = data.len().min(MAX_TREE_SAMPLES);
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..n_estimators)
            .map(|_| {
                let indices = index::sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::build(data, &indices, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Raw anomaly score in [-1, 1], more negative = more anomalous.
    ///
    /// Derived from the canonical isolation score s = 2^(-E[h]/c(psi)) in
    /// (0, 1] as raw = 1 - 2s, so a maximally isolated point scores -1.
    fn score_sample(&self, point: &[f64]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normalizer = average_path_length(self.sample_size).max(f64::MIN_POSITIVE);
        let isolation = 2.0_f64.powf(-mean_path / normalizer);
        1.0 - 2.0 * isolation
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FitStats {
    anomaly_threshold: f64,
}

struct FittedState {
    scaler: StandardScaler,
    forest: IsolationForest,
    stats: FitStats,
}

/// Anomaly detector wrapping the isolation forest behind an explicit
/// fit/score contract.
///
/// Scoring a detector that was never fitted fails with
/// [`RiskError::ModelNotFitted`]; the pipeline's opt-in fit-on-score mode
/// builds a throwaway detector instead of mutating a shared one. Once
/// fitted, a detector is read-only and safe to share across threads.
pub struct AnomalyDetector {
    contamination: f64,
    n_estimators: usize,
    state: Option<FittedState>,
}

impl AnomalyDetector {
    /// Create an unfit detector.
    ///
    /// `contamination` is the expected anomaly fraction in (0, 1) used to
    /// place the classification threshold; `n_estimators` is the ensemble
    /// size.
    pub fn new(contamination: f64, n_estimators: usize) -> Self {
        Self {
            contamination,
            n_estimators,
            state: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Fit the forest and capture normalization statistics.
    ///
    /// The classification threshold is set at the contamination quantile of
    /// the training scores.
    pub fn fit(&mut self, matrix: &FeatureMatrix) -> Result<(), RiskError> {
        if matrix.n_rows() == 0 {
            return Err(RiskError::InputValidation(
                "cannot fit on an empty feature matrix".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(matrix);
        let scaled = scaler.transform(matrix);
        let forest = IsolationForest::fit(&scaled, self.n_estimators);

        let mut train_scores: Vec<f64> =
            scaled.iter().map(|row| forest.score_sample(row)).collect();
        train_scores.sort_unstable_by(|a, b| a.total_cmp(b));
        let cutoff = ((train_scores.len() as f64) * self.contamination).floor() as usize;
        let anomaly_threshold = train_scores[cutoff.min(train_scores.len() - 1)];

        self.state = Some(FittedState {
            scaler,
            forest,
            stats: FitStats { anomaly_threshold },
        });
        Ok(())
    }

    /// Score each row, using normalization statistics captured at fit time.
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, RiskError> {
        let state = self.state.as_ref().ok_or(RiskError::ModelNotFitted)?;
        let scaled = state.scaler.transform(matrix);
        Ok(scaled
            .iter()
            .map(|row| state.forest.score_sample(row))
            .collect())
    }

    /// Raw-score threshold below which a point is classified anomalous
    pub fn anomaly_threshold(&self) -> Result<f64, RiskError> {
        self.state
            .as_ref()
            .map(|s| s.stats.anomaly_threshold)
            .ok_or(RiskError::ModelNotFitted)
    }

    /// Classify a raw score against the fit-time contamination threshold
    pub fn is_anomaly(&self, raw_score: f64) -> Result<bool, RiskError> {
        Ok(raw_score <= self.anomaly_threshold()?)
    }
}
