//! Application context handed to the engine components
//!
//! The host application owns the status line, the error markers on the shape
//! definition and the 3D view. The engine only talks to them through
//! [`HostBindings`], and only from the task layer's reap step.

use std::sync::{Arc, Mutex};

use crate::core::config::EngineConfig;
use crate::math::Aabb;

/// Marker placed on the shape definition when evaluation fails.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMarker {
    /// Human readable failure description
    pub message: String,
    /// Region of the model where evaluation failed, when known
    pub region: Option<Aabb>,
}

/// Callbacks into the host application.
pub trait HostBindings: Send + Sync {
    /// Replace the status-bar text.
    fn set_status(&self, text: &str);

    /// Mark the viewport / definition with an error.
    fn mark_error(&self, marker: ErrorMarker);

    /// Remove any error marker.
    fn clear_error(&self);

    /// Whether the 3D view is currently visible. LOD passes only run when it is.
    fn is_view_visible(&self) -> bool;
}

/// Host that ignores everything and always reports a visible view.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHost;

impl HostBindings for NullHost {
    fn set_status(&self, _text: &str) {}
    fn mark_error(&self, _marker: ErrorMarker) {}
    fn clear_error(&self) {}
    fn is_view_visible(&self) -> bool {
        true
    }
}

/// Host that records every call. Used by headless tools and tests.
#[derive(Debug, Default)]
pub struct RecordingHost {
    statuses: Mutex<Vec<String>>,
    error: Mutex<Option<ErrorMarker>>,
    hidden: std::sync::atomic::AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// All status texts in the order they were set
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Most recent status text
    pub fn last_status(&self) -> Option<String> {
        self.statuses().last().cloned()
    }

    /// Currently shown error marker
    pub fn error(&self) -> Option<ErrorMarker> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Toggle the reported view visibility
    pub fn set_view_visible(&self, visible: bool) {
        self.hidden.store(!visible, std::sync::atomic::Ordering::Relaxed);
    }
}

impl HostBindings for RecordingHost {
    fn set_status(&self, text: &str) {
        self.statuses.lock().unwrap_or_else(|e| e.into_inner()).push(text.to_string());
    }

    fn mark_error(&self, marker: ErrorMarker) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(marker);
    }

    fn clear_error(&self) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn is_view_visible(&self) -> bool {
        !self.hidden.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Explicit context value passed to the engine, controller and scheduler
/// constructors.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<EngineConfig>,
    pub host: Arc<dyn HostBindings>,
}

impl AppContext {
    pub fn new(config: EngineConfig, host: Arc<dyn HostBindings>) -> Self {
        Self {
            config: Arc::new(config),
            host,
        }
    }

    /// Default config with a [`NullHost`]
    pub fn headless() -> Self {
        Self::new(EngineConfig::default(), Arc::new(NullHost))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("host", &"<HostBindings>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_host() {
        let host = RecordingHost::new();
        assert!(host.is_view_visible());
        host.set_status("building");
        host.set_status("done");
        assert_eq!(host.last_status().as_deref(), Some("done"));

        host.mark_error(ErrorMarker { message: "bad".into(), region: None });
        assert_eq!(host.error().unwrap().message, "bad");
        host.clear_error();
        assert!(host.error().is_none());

        host.set_view_visible(false);
        assert!(!host.is_view_visible());
    }
}
