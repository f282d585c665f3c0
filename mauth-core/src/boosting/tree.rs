//! Least-squares regression tree fitted on boosting residuals

use serde::{Deserialize, Serialize};

/// Two feature values closer than this are treated as equal when splitting
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Binary tree stored as a flat node list; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    proxy: f64,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `x` against `targets` (indexed like `x`).
    ///
    /// Features are tried in `feature_order`; among equally good splits the
    /// first one tried wins.
    pub fn fit(
        x: &[Vec<f64>],
        rows: &[usize],
        targets: &[f64],
        params: &TreeParams,
        feature_order: &[usize],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, rows.to_vec(), targets, params, feature_order, 0);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        rows: Vec<usize>,
        targets: &[f64],
        params: &TreeParams,
        feature_order: &[usize],
        depth: usize,
    ) -> usize {
        let id = self.nodes.len();
        let n = rows.len() as f64;
        let sum: f64 = rows.iter().map(|&r| targets[r]).sum();
        let mean = if rows.is_empty() { 0.0 } else { sum / n };
        self.nodes.push(Node::Leaf { value: mean });

        let impurity = rows.iter().map(|&r| (targets[r] - mean).powi(2)).sum::<f64>() / n;
        let splittable = depth < params.max_depth
            && rows.len() >= params.min_samples_split
            && rows.len() >= 2 * params.min_samples_leaf
            && impurity > f64::EPSILON;
        if !splittable {
            return id;
        }

        let Some(best) = best_split(x, &rows, targets, params, feature_order) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x[r][best.feature] <= best.threshold);

        let left = self.grow(x, left_rows, targets, params, feature_order, depth + 1);
        let right = self.grow(x, right_rows, targets, params, feature_order, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    /// Index of the leaf node `row` falls into
    pub fn leaf_index(&self, row: &[f64]) -> usize {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { .. } => return id,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        match self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => unreachable!("leaf_index always returns a leaf"),
        }
    }

    /// Overwrite the value of a leaf; split nodes are left alone
    pub fn set_leaf_value(&mut self, id: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(id) {
            *value = new_value;
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + depth_of(nodes, *left).max(depth_of(nodes, *right))
                }
            }
        }
        depth_of(&self.nodes, 0)
    }

    /// Structural check for trees read back from disk
    pub fn is_well_formed(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match node {
                Node::Leaf { value } => value.is_finite(),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && *left > id
                        && *right > id
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

/// Best threshold over all features by the Friedman MSE improvement proxy
/// `(n_r * sum_l - n_l * sum_r)^2 / (n_l * n_r)`.
fn best_split(
    x: &[Vec<f64>],
    rows: &[usize],
    targets: &[f64],
    params: &TreeParams,
    feature_order: &[usize],
) -> Option<BestSplit> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| targets[r]).sum();
    let mut best: Option<BestSplit> = None;
    let mut sorted = rows.to_vec();

    for &feature in feature_order {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut sum_left = 0.0;
        for i in 1..n {
            sum_left += targets[sorted[i - 1]];
            let (n_left, n_right) = (i, n - i);
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let lo = x[sorted[i - 1]][feature];
            let hi = x[sorted[i]][feature];
            if hi <= lo + FEATURE_THRESHOLD {
                continue;
            }

            let sum_right = total - sum_left;
            let diff = n_right as f64 * sum_left - n_left as f64 * sum_right;
            let proxy = diff * diff / (n_left as f64 * n_right as f64);

            if best.as_ref().map_or(true, |b| proxy > b.proxy) {
                let mut threshold = lo / 2.0 + hi / 2.0;
                if threshold == hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    proxy,
                });
            }
        }
    }

    best
}
