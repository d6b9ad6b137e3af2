//! Reconciler configuration and its builder
use serde::{Deserialize, Serialize};

use crate::types::EdgeInsets;

const DEFAULT_WORKER_NAME: &str = "list-reconciler";

/// Static configuration read once when a reconciler is spawned.
///
/// The flags here only seed the binding surface; they can be changed later
/// through the reconciler handle. Deserializable so hosts can keep list
/// defaults next to their other settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Name for the comparison worker thread.
    pub worker_name: String,
    /// Stack size for the worker thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
    /// Animate structural changes.
    pub animate_changes: bool,
    /// Scroll to the first row after every structural apply.
    pub scroll_to_top_on_apply: bool,
    pub content_insets: EdgeInsets,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            stack_size: None,
            animate_changes: false,
            scroll_to_top_on_apply: true,
            content_insets: EdgeInsets::ZERO,
        }
    }
}

impl ReconcilerConfig {
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            worker_name: name.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ReconcilerConfigBuilder {
    config: ReconcilerConfig,
}

impl ReconcilerConfigBuilder {
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn animate_changes(mut self, animate: bool) -> Self {
        self.config.animate_changes = animate;
        self
    }

    pub fn scroll_to_top_on_apply(mut self, scroll: bool) -> Self {
        self.config.scroll_to_top_on_apply = scroll;
        self
    }

    pub fn content_insets(mut self, insets: EdgeInsets) -> Self {
        self.config.content_insets = insets;
        self
    }

    pub fn build(self) -> ReconcilerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scroll_to_top_without_animation() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.worker_name, DEFAULT_WORKER_NAME);
        assert!(config.scroll_to_top_on_apply);
        assert!(!config.animate_changes);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: ReconcilerConfig =
            serde_json::from_str(r#"{ "animate_changes": true, "content_insets": { "top": 8.0, "left": 0.0, "bottom": 8.0, "right": 0.0 } }"#)
                .unwrap();
        assert!(config.animate_changes);
        assert!(config.scroll_to_top_on_apply);
        assert_eq!(config.content_insets.top, 8.0);
        assert_eq!(config.worker_name, DEFAULT_WORKER_NAME);
    }

    #[test]
    fn builder_overrides() {
        let config = ReconcilerConfig::builder()
            .worker_name("feed-list")
            .stack_size(256 * 1024)
            .scroll_to_top_on_apply(false)
            .build();
        assert_eq!(config.worker_name, "feed-list");
        assert_eq!(config.stack_size, Some(256 * 1024));
        assert!(!config.scroll_to_top_on_apply);
    }
}
