//! Engine configuration
//!
//! All sections deserialize with defaults, so a config file only needs the
//! values it wants to override:
//!
//! ```json
//! { "lod": { "refine_threshold": 0.08 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Default share of the viewport a leaf must cover before it is refined.
pub const DEFAULT_REFINE_THRESHOLD: f64 = 0.05;

/// Default share of the viewport below which a refined branch is collapsed.
pub const DEFAULT_COLLAPSE_THRESHOLD: f64 = 0.025;

/// Deepest level any node may reach (3 bits per level in a `NodePath`).
pub const MAX_SUPPORTED_DEPTH: u8 = 21;

/// Octree construction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    /// Regions smaller than twice this along an axis are not split on that axis
    pub min_cell_size: f64,
    /// Upper bound on worker threads for the top-level octant fan-out.
    /// Zero means "hardware concurrency".
    pub max_workers: usize,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            min_cell_size: 1e-4,
            max_workers: 8,
        }
    }
}

/// Level-of-detail controller settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Viewport share above which a leaf is refined (0.05 = 5%)
    pub refine_threshold: f64,
    /// Viewport share below which a refined branch is collapsed
    pub collapse_threshold: f64,
    /// Depth of the initial construct; branches shallower than this never collapse
    pub base_depth: u8,
    /// Leaves at this depth are never refined further
    pub max_depth: u8,
    /// Off-screen identifier buffer size in pixels
    pub viewport: (u32, u32),
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            refine_threshold: DEFAULT_REFINE_THRESHOLD,
            collapse_threshold: DEFAULT_COLLAPSE_THRESHOLD,
            base_depth: 4,
            max_depth: 9,
            viewport: (256, 192),
        }
    }
}

/// Archive layout settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Levels stored per file before children spill into sibling files.
    /// `None` keeps the whole tree in one file.
    pub levels_per_file: Option<u8>,
    /// File extension used for archive files
    pub extension: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            levels_per_file: None,
            extension: "sto".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub construction: ConstructionConfig,
    pub lod: LodConfig,
    pub archive: ArchiveConfig,
}

impl EngineConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let lod = &self.lod;
        if !(lod.collapse_threshold >= 0.0 && lod.collapse_threshold < lod.refine_threshold) {
            return Err(Error::Config(format!(
                "collapse_threshold ({}) must be in [0, refine_threshold ({}))",
                lod.collapse_threshold, lod.refine_threshold
            )));
        }
        if lod.refine_threshold > 1.0 {
            return Err(Error::Config("refine_threshold must be at most 1.0".into()));
        }
        if lod.base_depth > lod.max_depth || lod.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(Error::Config(format!(
                "depths must satisfy base_depth <= max_depth <= {} (got {} / {})",
                MAX_SUPPORTED_DEPTH, lod.base_depth, lod.max_depth
            )));
        }
        if lod.viewport.0 == 0 || lod.viewport.1 == 0 {
            return Err(Error::Config("viewport must be non-empty".into()));
        }
        if !(self.construction.min_cell_size > 0.0) {
            return Err(Error::Config("min_cell_size must be positive".into()));
        }
        if self.archive.levels_per_file == Some(0) {
            return Err(Error::Config("levels_per_file must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lod.refine_threshold, 0.05);
        assert_eq!(config.lod.collapse_threshold, 0.025);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "lod": { "max_depth": 6 } }"#).unwrap();
        assert_eq!(config.lod.max_depth, 6);
        assert_eq!(config.lod.base_depth, 4);
        assert_eq!(config.construction, ConstructionConfig::default());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let json = r#"{ "lod": { "refine_threshold": 0.01, "collapse_threshold": 0.02 } }"#;
        assert!(matches!(EngineConfig::from_json_str(json), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(EngineConfig::from_json_str("{ lod: "), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "archive": { "levels_per_file": 2 } }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.archive.levels_per_file, Some(2));
    }
}
