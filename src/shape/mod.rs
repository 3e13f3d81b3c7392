//! Signed-distance shapes and their box classification

pub mod classifier;
pub mod expr;

pub use classifier::{Classification, Evaluable, Occupancy, ShapeHandle};
pub use expr::Shape;
