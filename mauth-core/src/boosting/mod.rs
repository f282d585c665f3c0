//! Gradient-boosted decision trees for multi-class identity prediction
//!
//! Deviance loss with one regression tree per score column per stage:
//! - two classes: a single log-odds column (binomial deviance)
//! - three or more: one column per class (multinomial deviance / softmax)
//! - one class: no columns, the model always answers that class
//!
//! Each tree is fitted to the negative gradient `y - p`, then its leaves are
//! replaced by a single Newton step `sum(y - p) / sum(p * (1 - p))`.

pub mod tree;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::trace::UserId;
use crate::{Error, Result};
use tree::{RegressionTree, TreeParams};

/// Leaf denominators below this are treated as zero
const MIN_NEWTON_DENOMINATOR: f64 = 1e-150;

/// Ensemble hyperparameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.05,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl BoostingParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Fitted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    classes: Vec<UserId>,
    n_features: usize,
    learning_rate: f64,
    init_scores: Vec<f64>,
    stages: Vec<Vec<RegressionTree>>,
}

impl GradientBoostedClassifier {
    /// Fit on row-major `x` against labels `y`.
    ///
    /// Fails with `TrainingFailed` on empty or ragged input, non-finite
    /// features, or scores that diverge during boosting.
    pub fn fit(x: &[Vec<f64>], y: &[UserId], params: &BoostingParams) -> Result<Self> {
        if x.is_empty() {
            return Err(Error::TrainingFailed("no rows to fit".to_string()));
        }
        if x.len() != y.len() {
            return Err(Error::TrainingFailed(format!(
                "{} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(Error::TrainingFailed("rows have differing widths".to_string()));
        }
        if x.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::TrainingFailed("non-finite feature value".to_string()));
        }

        let mut classes = y.to_vec();
        classes.sort();
        classes.dedup();
        let class_index: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let n = x.len();
        let k = classes.len();
        let n_columns = score_columns(k);

        let mut model = Self {
            classes,
            n_features,
            learning_rate: params.learning_rate,
            init_scores: initial_scores(&class_index, k),
            stages: Vec::with_capacity(params.n_estimators),
        };
        if n_columns == 0 {
            debug!("Single class in training partition; fitted constant model");
            return Ok(model);
        }

        let rows: Vec<usize> = (0..n).collect();
        let tree_params = params.tree_params();
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut feature_order: Vec<usize> = (0..n_features).collect();
        let mut raw: Vec<Vec<f64>> = vec![model.init_scores.clone(); n];

        for stage_no in 0..params.n_estimators {
            let probabilities: Vec<Vec<f64>> = raw.iter().map(|s| column_probabilities(s)).collect();
            let mut stage = Vec::with_capacity(n_columns);

            for column in 0..n_columns {
                let truth: Vec<f64> = class_index
                    .iter()
                    .map(|&c| if column_class(column, k) == c { 1.0 } else { 0.0 })
                    .collect();
                let residuals: Vec<f64> = (0..n)
                    .map(|i| truth[i] - probabilities[i][column])
                    .collect();

                feature_order.shuffle(&mut rng);
                let mut tree = RegressionTree::fit(x, &rows, &residuals, &tree_params, &feature_order);

                let leaves: Vec<usize> = x.iter().map(|row| tree.leaf_index(row)).collect();
                let mut numerators = vec![0.0; tree.nodes().len()];
                let mut denominators = vec![0.0; tree.nodes().len()];
                for i in 0..n {
                    let p = probabilities[i][column];
                    numerators[leaves[i]] += residuals[i];
                    denominators[leaves[i]] += p * (1.0 - p);
                }
                let scale = if k > 2 { (k as f64 - 1.0) / k as f64 } else { 1.0 };
                let mut touched = leaves.clone();
                touched.sort_unstable();
                touched.dedup();
                for leaf in touched {
                    let value = if denominators[leaf].abs() < MIN_NEWTON_DENOMINATOR {
                        0.0
                    } else {
                        scale * numerators[leaf] / denominators[leaf]
                    };
                    tree.set_leaf_value(leaf, value);
                }

                for (i, row) in x.iter().enumerate() {
                    raw[i][column] += params.learning_rate * tree.predict(row);
                }
                stage.push(tree);
            }

            if raw.iter().flatten().any(|v| !v.is_finite()) {
                return Err(Error::TrainingFailed(format!(
                    "scores diverged at stage {}",
                    stage_no
                )));
            }
            model.stages.push(stage);
        }

        debug!(
            classes = model.classes.len(),
            stages = model.stages.len(),
            "Fitted gradient-boosted ensemble"
        );
        Ok(model)
    }

    pub fn classes(&self) -> &[UserId] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Raw additive scores, one per score column
    pub fn decision_function(&self, row: &[f64]) -> Vec<f64> {
        let mut scores = self.init_scores.clone();
        for stage in &self.stages {
            for (column, tree) in stage.iter().enumerate() {
                scores[column] += self.learning_rate * tree.predict(row);
            }
        }
        scores
    }

    /// Class probabilities aligned with `classes()`
    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        match self.classes.len() {
            1 => vec![1.0],
            _ => {
                let p = column_probabilities(&self.decision_function(row));
                if self.classes.len() == 2 {
                    vec![1.0 - p[0], p[0]]
                } else {
                    p
                }
            }
        }
    }

    /// Most probable class and its probability; ties go to the smaller label
    pub fn predict(&self, row: &[f64]) -> (UserId, f64) {
        let proba = self.predict_proba(row);
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        (self.classes[best], proba[best])
    }

    /// Fraction of rows whose prediction matches the label
    pub fn score(&self, x: &[Vec<f64>], y: &[UserId]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let correct = x
            .iter()
            .zip(y)
            .filter(|(row, label)| self.predict(row).0 == **label)
            .count();
        correct as f64 / x.len() as f64
    }

    /// Structural check for models read back from storage
    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::Internal("model has no classes".to_string()));
        }
        let n_columns = score_columns(self.classes.len());
        if self.init_scores.len() != n_columns || self.init_scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::Internal("initial scores do not match class count".to_string()));
        }
        if !self.learning_rate.is_finite() {
            return Err(Error::Internal("non-finite learning rate".to_string()));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.len() != n_columns || !stage.iter().all(|t| t.is_well_formed(self.n_features)) {
                return Err(Error::Internal(format!("malformed stage {}", i)));
            }
        }
        Ok(())
    }
}

fn score_columns(n_classes: usize) -> usize {
    match n_classes {
        0 | 1 => 0,
        2 => 1,
        k => k,
    }
}

/// Class a score column stands for
fn column_class(column: usize, n_classes: usize) -> usize {
    if n_classes == 2 {
        1
    } else {
        column
    }
}

/// Log prior per class, or prior log-odds of the positive class for two classes
fn initial_scores(class_index: &[usize], n_classes: usize) -> Vec<f64> {
    let n = class_index.len() as f64;
    let mut counts = vec![0.0; n_classes];
    for &c in class_index {
        counts[c] += 1.0;
    }
    match score_columns(n_classes) {
        0 => Vec::new(),
        1 => {
            let p = counts[1] / n;
            vec![(p / (1.0 - p)).ln()]
        }
        _ => counts.iter().map(|c| (c / n).ln()).collect(),
    }
}

/// Sigmoid of a single log-odds column, softmax over several
fn column_probabilities(scores: &[f64]) -> Vec<f64> {
    if scores.len() == 1 {
        return vec![sigmoid(scores[0])];
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            ..BoostingParams::default()
        }
    }

    /// Three well-separated blobs on two features
    fn blobs() -> (Vec<Vec<f64>>, Vec<UserId>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for (label, cx, cy) in [(10, 0.0, 0.0), (20, 10.0, 0.0), (30, 0.0, 10.0)] {
            for j in 0..6 {
                let jitter = j as f64 * 0.1;
                x.push(vec![cx + jitter, cy - jitter]);
                y.push(UserId(label));
            }
        }
        (x, y)
    }

    #[test]
    fn test_default_params() {
        let p = BoostingParams::default();
        assert_eq!(p.n_estimators, 200);
        assert_eq!(p.learning_rate, 0.05);
        assert_eq!(p.max_depth, 5);
        assert_eq!(p.seed, 42);
    }

    #[test]
    fn test_multiclass_fits_separable_blobs() {
        let (x, y) = blobs();
        let model = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap();
        assert_eq!(model.classes(), &[UserId(10), UserId(20), UserId(30)]);
        assert_eq!(model.score(&x, &y), 1.0);

        let (label, confidence) = model.predict(&[10.2, -0.2]);
        assert_eq!(label, UserId(20));
        assert!(confidence > 1.0 / 3.0 && confidence <= 1.0);

        let proba = model.predict_proba(&[0.1, 9.9]);
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        model.validate().unwrap();
    }

    #[test]
    fn test_binary_uses_single_column() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y: Vec<UserId> = (0..8).map(|i| UserId(if i < 4 { 1 } else { 2 })).collect();
        let model = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap();
        assert_eq!(model.decision_function(&[0.0]).len(), 1);
        assert_eq!(model.predict(&[0.5]).0, UserId(1));
        assert_eq!(model.predict(&[6.5]).0, UserId(2));
        let proba = model.predict_proba(&[6.5]);
        assert_eq!(proba.len(), 2);
        assert!(proba[1] > 0.5);
    }

    #[test]
    fn test_single_class_is_constant() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![UserId(5), UserId(5)];
        let model = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap();
        assert_eq!(model.n_stages(), 0);
        assert_eq!(model.predict(&[100.0]), (UserId(5), 1.0));
        model.validate().unwrap();
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = blobs();
        let a = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap();
        let b = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_non_finite_features() {
        let x = vec![vec![1.0], vec![f64::INFINITY], vec![3.0]];
        let y = vec![UserId(1), UserId(2), UserId(1)];
        let err = GradientBoostedClassifier::fit(&x, &y, &quick()).unwrap_err();
        assert!(matches!(err, Error::TrainingFailed(_)));
    }

    #[test]
    fn test_rejects_empty_input() {
        let err = GradientBoostedClassifier::fit(&[], &[], &quick()).unwrap_err();
        assert!(matches!(err, Error::TrainingFailed(_)));
    }

    #[test]
    fn test_softmax_is_stable_for_large_scores() {
        let p = column_probabilities(&[1000.0, 999.0, -1000.0]);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[0] > p[1] && p[1] > p[2]);
    }
}
