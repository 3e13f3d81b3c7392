//! Box classification contract consumed by the octree builder.
//!
//! Anything that can bound its signed distance over a box with interval
//! arithmetic and sample it at a point can be turned into an octree. The
//! builder never mutates an evaluator; workers share one through an
//! `Arc<dyn Evaluable>` handle, so every clone is pure.

use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::{DVec3, Result};
use crate::math::{Aabb, Interval};

/// Content of a box, from the sign of its distance interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Occupancy {
    /// Lower bound above zero: entirely outside the shape
    Empty,
    /// Upper bound at or below zero: entirely inside the shape
    Full,
    /// Surface may pass through the box - must subdivide
    Ambiguous,
}

impl Occupancy {
    /// Classify a distance interval (inclusive arithmetic)
    pub fn from_interval(interval: Interval) -> Self {
        if interval.is_positive() {
            Occupancy::Empty
        } else if interval.is_non_positive() {
            Occupancy::Full
        } else {
            Occupancy::Ambiguous
        }
    }

    /// Returns true if this region can be skipped (Empty or Full)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Occupancy::Empty | Occupancy::Full)
    }
}

/// Result of classifying one box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub occupancy: Occupancy,
    /// Distance samples at the 8 box corners (bit 0 = +x, 1 = +y, 2 = +z)
    pub corners: [f64; 8],
}

/// Trait for signed-distance shapes.
///
/// Negative distances are inside, positive outside.
pub trait Evaluable: Send + Sync {
    /// Conservative bound of the distance over `bounds`
    fn interval(&self, bounds: &Aabb) -> Interval;

    /// Distance at a single point
    fn sample(&self, point: DVec3) -> f64;

    /// Optional explanation of why evaluation over `bounds` is invalid,
    /// naming the failing part of the shape.
    fn diagnose(&self, _bounds: &Aabb) -> Option<String> {
        None
    }

    /// Classify a box and sample its corners.
    ///
    /// NaN anywhere is an [`Error::Evaluation`]; it is never treated as
    /// Empty or Full.
    fn classify(&self, bounds: &Aabb) -> Result<Classification> {
        let interval = self.interval(bounds);
        if interval.is_invalid() {
            let detail = self.diagnose(bounds).unwrap_or_else(|| {
                format!("invalid distance interval [{}, {}]", interval.lo, interval.hi)
            });
            return Err(Error::evaluation(*bounds, detail));
        }

        let mut corners = [0.0; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let value = self.sample(bounds.corner(i as u8));
            if value.is_nan() {
                let detail = self.diagnose(bounds)
                    .unwrap_or_else(|| format!("NaN distance at corner {}", i));
                return Err(Error::evaluation(*bounds, detail));
            }
            *corner = value;
        }

        Ok(Classification {
            occupancy: Occupancy::from_interval(interval),
            corners,
        })
    }
}

/// Shared, immutable evaluator handle. Cloning it is the per-worker clone.
pub type ShapeHandle = Arc<dyn Evaluable>;
