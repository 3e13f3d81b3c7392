//! On-disk octree archives
//!
//! Trees are stored as compressed record lists, optionally split across
//! sibling files every few levels so deep models load lazily.

pub mod format;
pub mod store;
pub mod transform;

pub use format::{ArchiveData, NodeRecord, RecordKind, ARCHIVE_VERSION};
pub use store::{load_subtree, load_tree, load_tree_full, read_archive, save_tree, sibling_path, write_atomic};
pub use transform::{offset_file, rescale_file, slice_file_z, SliceCell, SliceFill};
