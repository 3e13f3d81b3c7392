//! View-driven level of detail
//!
//! Leaves are drawn in flat identifier colours, the resulting histogram gives
//! each leaf's share of the viewport, and the controller turns those shares
//! into refine and collapse actions.

pub mod controller;
pub mod id_render;
pub mod importance;

pub use controller::{LodAction, LodController, LodOp, LodPass, SkipReason};
pub use id_render::{IdBuffer, IdRenderer, SoftwareIdRenderer};
pub use importance::ImportanceSample;
