//! Signature extraction: movement trace → fixed-length feature vector
//!
//! The bin count and epsilons below are part of the model contract. An
//! artifact is only valid against vectors produced with these same constants.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::trace::MovementTrace;
use crate::{Error, Result};

/// Number of features in a signature
pub const FEATURE_COUNT: usize = 11;

/// Canonical feature order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "total_distance",
    "straightness",
    "mean_velocity",
    "velocity_std",
    "max_velocity",
    "mean_acceleration",
    "acceleration_std",
    "mean_angle_change",
    "angle_change_std",
    "x_entropy",
    "y_entropy",
];

/// Added to the path length before dividing
pub const STRAIGHTNESS_EPSILON: f64 = 1e-6;

/// Histogram bins for the coordinate entropies
pub const ENTROPY_BINS: usize = 5;

/// Added to every bin count before computing entropy
pub const ENTROPY_BIN_EPSILON: f64 = 1e-6;

/// Named signature of one trace, in `FEATURE_NAMES` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Look up a feature by name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// Whether every feature is a finite number
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Values reordered to `names`; unknown names and NaN read as 0
    pub fn reindex<S: AsRef<str>>(&self, names: &[S]) -> Vec<f64> {
        names
            .iter()
            .map(|name| self.get(name.as_ref()).filter(|v| !v.is_nan()).unwrap_or(0.0))
            .collect()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Extract the signature of a trace. Never fails: degenerate traces yield 0
/// for every difference-based feature they cannot support.
pub fn extract(trace: &MovementTrace) -> FeatureVector {
    let points = trace.points();
    let xs = trace.xs();
    let ys = trace.ys();

    let steps: Vec<(f64, f64)> = points
        .windows(2)
        .map(|w| (w[1].x - w[0].x, w[1].y - w[0].y))
        .collect();
    let distances: Vec<f64> = steps.iter().map(|(dx, dy)| dx.hypot(*dy)).collect();

    let total_distance: f64 = distances.iter().sum();

    let (first, last) = (points[0], points[points.len() - 1]);
    let displacement = (last.x - first.x).hypot(last.y - first.y);
    let straightness = displacement / (total_distance + STRAIGHTNESS_EPSILON);

    let max_velocity = distances.iter().copied().fold(None, |acc: Option<f64>, d| {
        Some(acc.map_or(d, |m| m.max(d)))
    });

    let (mean_acceleration, acceleration_std) = if distances.len() > 1 {
        let accelerations = diff(&distances);
        (mean(&accelerations), population_std(&accelerations))
    } else {
        (0.0, 0.0)
    };

    let angles: Vec<f64> = steps.iter().map(|(dx, dy)| dy.atan2(*dx)).collect();
    let (mean_angle_change, angle_change_std) = if angles.len() > 1 {
        let changes = diff(&angles);
        let abs_changes: Vec<f64> = changes.iter().map(|c| c.abs()).collect();
        (mean(&abs_changes), population_std(&changes))
    } else {
        (0.0, 0.0)
    };

    FeatureVector::from_values([
        total_distance,
        straightness,
        mean(&distances),
        population_std(&distances),
        max_velocity.unwrap_or(0.0),
        mean_acceleration,
        acceleration_std,
        mean_angle_change,
        angle_change_std,
        histogram_entropy(&xs),
        histogram_entropy(&ys),
    ])
}

/// Extract the signature, rejecting traces whose magnitudes overflow it
pub fn extract_checked(trace: &MovementTrace) -> Result<FeatureVector> {
    let features = extract(trace);
    if let Some((name, value)) = features.iter().find(|(_, v)| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "trace coordinates too large: {} is {}",
            name, value
        )));
    }
    Ok(features)
}

fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Arithmetic mean; 0 for an empty slice
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population (ddof = 0) standard deviation; 0 for an empty slice
fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Equal-width histogram over `[min, max]`, last bin closed on the right.
/// A zero-width range is widened to `[min - 0.5, max + 0.5]`.
fn histogram(values: &[f64], bins: usize) -> Vec<f64> {
    let mut counts = vec![0.0; bins];
    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = hi - lo;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| lo + width * i as f64 / bins as f64)
        .collect();

    for &v in values {
        let mut idx = (((v - lo) / width) * bins as f64) as usize;
        idx = idx.min(bins - 1);
        // Rounding in the scaled index can land one bin off the edge list
        if v < edges[idx] && idx > 0 {
            idx -= 1;
        } else if idx + 1 < bins && v >= edges[idx + 1] {
            idx += 1;
        }
        counts[idx] += 1.0;
    }
    counts
}

/// Natural-log Shannon entropy of the coordinate histogram
fn histogram_entropy(values: &[f64]) -> f64 {
    let counts: Vec<f64> = histogram(values, ENTROPY_BINS)
        .into_iter()
        .map(|c| c + ENTROPY_BIN_EPSILON)
        .collect();
    let total: f64 = counts.iter().sum();
    -counts
        .iter()
        .map(|c| {
            let p = c / total;
            p * p.ln()
        })
        .sum::<f64>()
}
