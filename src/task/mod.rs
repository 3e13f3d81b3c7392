//! Background tasks and the immutable model they produce

pub mod handle;
pub mod model;
pub mod scheduler;

pub use handle::{Task, TaskKind, TaskOutput, TaskSignals};
pub use model::{ModelSnapshot, SubtreeSwap};
pub use scheduler::{ExportRequest, TaskEvent, TaskScheduler};
