//! Shape expressions: primitives and CSG combinators.
//!
//! A shape is a plain tree of variants. Composition is structural, so a
//! `Shape` can be deep-copied (export isolation) and shared across workers
//! without any evaluation state.

use std::sync::Arc;

use crate::core::types::DVec3;
use crate::math::{Aabb, Interval};
use crate::shape::classifier::{Evaluable, ShapeHandle};

/// Signed distance expression
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Sphere { center: DVec3, radius: f64 },
    /// Axis-aligned box
    Cuboid { min: DVec3, max: DVec3 },
    /// Z-aligned cylinder
    Cylinder { center: DVec3, radius: f64, half_height: f64 },
    /// Everything below the plane `dot(normal, p) = offset`; `normal` must be unit length
    HalfSpace { normal: DVec3, offset: f64 },
    Union(Vec<Shape>),
    Intersect(Vec<Shape>),
    /// First shape minus the second
    Subtract(Box<Shape>, Box<Shape>),
    Translate { offset: DVec3, shape: Box<Shape> },
    /// Uniform scale about the origin; `factor` must be positive
    Scale { factor: f64, shape: Box<Shape> },
}

impl Shape {
    pub fn sphere(center: DVec3, radius: f64) -> Self {
        Shape::Sphere { center, radius }
    }

    pub fn cuboid(min: DVec3, max: DVec3) -> Self {
        Shape::Cuboid { min, max }
    }

    pub fn cylinder(center: DVec3, radius: f64, height: f64) -> Self {
        Shape::Cylinder { center, radius, half_height: height * 0.5 }
    }

    pub fn half_space(normal: DVec3, offset: f64) -> Self {
        Shape::HalfSpace { normal: normal.normalize(), offset }
    }

    pub fn union(self, other: Shape) -> Self {
        match self {
            Shape::Union(mut shapes) => {
                shapes.push(other);
                Shape::Union(shapes)
            }
            shape => Shape::Union(vec![shape, other]),
        }
    }

    pub fn intersect(self, other: Shape) -> Self {
        match self {
            Shape::Intersect(mut shapes) => {
                shapes.push(other);
                Shape::Intersect(shapes)
            }
            shape => Shape::Intersect(vec![shape, other]),
        }
    }

    pub fn subtract(self, other: Shape) -> Self {
        Shape::Subtract(Box::new(self), Box::new(other))
    }

    pub fn translate(self, offset: DVec3) -> Self {
        Shape::Translate { offset, shape: Box::new(self) }
    }

    pub fn scale(self, factor: f64) -> Self {
        Shape::Scale { factor, shape: Box::new(self) }
    }

    /// Wrap into a shareable evaluator handle
    pub fn into_handle(self) -> ShapeHandle {
        Arc::new(self)
    }

    /// Short name of the variant, used in error markers
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Sphere { .. } => "sphere",
            Shape::Cuboid { .. } => "cuboid",
            Shape::Cylinder { .. } => "cylinder",
            Shape::HalfSpace { .. } => "half-space",
            Shape::Union(_) => "union",
            Shape::Intersect(_) => "intersect",
            Shape::Subtract(..) => "subtract",
            Shape::Translate { .. } => "translate",
            Shape::Scale { .. } => "scale",
        }
    }

    /// Number of variant nodes in the expression
    pub fn node_count(&self) -> usize {
        1 + match self {
            Shape::Union(shapes) | Shape::Intersect(shapes) => {
                shapes.iter().map(Shape::node_count).sum()
            }
            Shape::Subtract(a, b) => a.node_count() + b.node_count(),
            Shape::Translate { shape, .. } | Shape::Scale { shape, .. } => shape.node_count(),
            _ => 0,
        }
    }

    fn eval_interval(&self, x: Interval, y: Interval, z: Interval) -> Interval {
        match self {
            Shape::Sphere { center, radius } => {
                let d2 = (x - center.x).sqr() + (y - center.y).sqr() + (z - center.z).sqr();
                d2.sqrt() - *radius
            }
            Shape::Cuboid { min, max } => {
                let c = (*min + *max) * 0.5;
                let h = (*max - *min) * 0.5;
                let qx = (x - c.x).abs() - h.x;
                let qy = (y - c.y).abs() - h.y;
                let qz = (z - c.z).abs() - h.z;
                let outside = (qx.positive_part().sqr()
                    + qy.positive_part().sqr()
                    + qz.positive_part().sqr())
                .sqrt();
                let inside = qx.max(qy).max(qz).min(Interval::point(0.0));
                outside + inside
            }
            Shape::Cylinder { center, radius, half_height } => {
                let radial = ((x - center.x).sqr() + (y - center.y).sqr()).sqrt() - *radius;
                let axial = (z - center.z).abs() - *half_height;
                let outside = (radial.positive_part().sqr() + axial.positive_part().sqr()).sqrt();
                let inside = radial.max(axial).min(Interval::point(0.0));
                outside + inside
            }
            Shape::HalfSpace { normal, offset } => {
                x.scale(normal.x) + y.scale(normal.y) + z.scale(normal.z) - *offset
            }
            Shape::Union(shapes) => shapes
                .iter()
                .map(|s| s.eval_interval(x, y, z))
                .reduce(Interval::min)
                .unwrap_or(Interval::point(f64::INFINITY)),
            Shape::Intersect(shapes) => shapes
                .iter()
                .map(|s| s.eval_interval(x, y, z))
                .reduce(Interval::max)
                .unwrap_or(Interval::point(f64::NEG_INFINITY)),
            Shape::Subtract(a, b) => {
                a.eval_interval(x, y, z).max(-b.eval_interval(x, y, z))
            }
            Shape::Translate { offset, shape } => {
                shape.eval_interval(x - offset.x, y - offset.y, z - offset.z)
            }
            Shape::Scale { factor, shape } => {
                let inv = 1.0 / factor;
                shape.eval_interval(x.scale(inv), y.scale(inv), z.scale(inv)).scale(*factor)
            }
        }
    }

    fn eval_point(&self, p: DVec3) -> f64 {
        match self {
            Shape::Sphere { center, radius } => (p - *center).length() - radius,
            Shape::Cuboid { min, max } => {
                let c = (*min + *max) * 0.5;
                let h = (*max - *min) * 0.5;
                let q = (p - c).abs() - h;
                q.max(DVec3::ZERO).length() + q.max_element().min(0.0)
            }
            Shape::Cylinder { center, radius, half_height } => {
                let d = p - *center;
                let radial = (d.x * d.x + d.y * d.y).sqrt() - radius;
                let axial = d.z.abs() - half_height;
                let outside = (radial.max(0.0).powi(2) + axial.max(0.0).powi(2)).sqrt();
                outside + radial.max(axial).min(0.0)
            }
            Shape::HalfSpace { normal, offset } => normal.dot(p) - offset,
            Shape::Union(shapes) => shapes
                .iter()
                .map(|s| s.eval_point(p))
                .fold(f64::INFINITY, nan_min),
            Shape::Intersect(shapes) => shapes
                .iter()
                .map(|s| s.eval_point(p))
                .fold(f64::NEG_INFINITY, nan_max),
            Shape::Subtract(a, b) => nan_max(a.eval_point(p), -b.eval_point(p)),
            Shape::Translate { offset, shape } => shape.eval_point(p - *offset),
            Shape::Scale { factor, shape } => shape.eval_point(p / *factor) * factor,
        }
    }

    /// Walk down to the deepest sub-expression whose interval is invalid
    fn find_invalid(&self, x: Interval, y: Interval, z: Interval) -> Option<String> {
        if !self.eval_interval(x, y, z).is_invalid() {
            return None;
        }
        let nested = match self {
            Shape::Union(shapes) | Shape::Intersect(shapes) => {
                shapes.iter().find_map(|s| s.find_invalid(x, y, z))
            }
            Shape::Subtract(a, b) => a
                .find_invalid(x, y, z)
                .or_else(|| b.find_invalid(x, y, z)),
            Shape::Translate { offset, shape } => {
                shape.find_invalid(x - offset.x, y - offset.y, z - offset.z)
            }
            Shape::Scale { factor, shape } => {
                let inv = 1.0 / factor;
                shape.find_invalid(x.scale(inv), y.scale(inv), z.scale(inv))
            }
            _ => None,
        };
        nested.or_else(|| Some(format!("{} produced an invalid distance", self.kind_name())))
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

impl Evaluable for Shape {
    fn interval(&self, bounds: &Aabb) -> Interval {
        let [x, y, z] = bounds.intervals();
        self.eval_interval(x, y, z)
    }

    fn sample(&self, point: DVec3) -> f64 {
        self.eval_point(point)
    }

    fn diagnose(&self, bounds: &Aabb) -> Option<String> {
        let [x, y, z] = bounds.intervals();
        self.find_invalid(x, y, z)
    }
}
