//! Movement traces and identity labels

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Identity label of a user: the classifier's target class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single pointer position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered pointer positions captured during one movement episode.
///
/// Always non-empty with finite coordinates. Serializes as `[[x, y], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct MovementTrace {
    points: Vec<Point>,
}

impl MovementTrace {
    /// Build a trace, rejecting empty point lists and non-finite coordinates
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidInput("trace must contain at least one point".to_string()));
        }
        if let Some(i) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "trace point {} has a non-finite coordinate",
                i
            )));
        }
        Ok(Self { points })
    }

    /// Parse a trace from its JSON wire form
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::InvalidInput(format!("malformed trace: {}", e)))
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the trace has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }
}

impl TryFrom<Vec<[f64; 2]>> for MovementTrace {
    type Error = Error;

    fn try_from(pairs: Vec<[f64; 2]>) -> Result<Self> {
        Self::new(pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect())
    }
}

impl From<MovementTrace> for Vec<[f64; 2]> {
    fn from(trace: MovementTrace) -> Self {
        trace.points.into_iter().map(|p| [p.x, p.y]).collect()
    }
}
