//! Mathematical utilities and data structures

pub mod aabb;
pub mod interval;

pub use aabb::Aabb;
pub use interval::Interval;
