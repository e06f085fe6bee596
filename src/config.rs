//! Screen configuration.
//!
//! Plain data deserialized by the host; the core never touches the
//! filesystem itself.

use crate::commands::VTType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("screen size must be at least 1x1, got {columns}x{rows}")]
    InvalidSize { columns: i32, rows: i32 },
    #[error("tab width must not be negative, got {0}")]
    InvalidTabWidth(i32),
}

/// Configuration for a [`crate::screen::Screen`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Initial screen size in cells.
    pub columns: i32,
    pub rows: i32,
    /// Upper bound of the primary buffer's scrollback.
    pub max_history_line_count: usize,
    /// Delimiters for word-wise selection, in addition to whitespace.
    pub word_delimiters: String,
    /// Default tab stop distance; 0 disables default stops.
    pub tab_width: i32,
    /// Conformance level reported by DA1/DECSCL.
    pub terminal_id: VTType,
    /// Snap the viewport back to the live screen on output.
    pub auto_scroll_on_update: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 24,
            max_history_line_count: 10_000,
            word_delimiters: " ,".to_string(),
            tab_width: 8,
            terminal_id: VTType::VT420,
            auto_scroll_on_update: false,
        }
    }
}

impl ScreenConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns < 1 || self.rows < 1 {
            return Err(ConfigError::InvalidSize {
                columns: self.columns,
                rows: self.rows,
            });
        }
        if self.tab_width < 0 {
            return Err(ConfigError::InvalidTabWidth(self.tab_width));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ScreenConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_sizes() {
        let config = ScreenConfig {
            columns: 0,
            ..ScreenConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSize { .. })
        ));
    }

    #[test]
    fn deserializes_partial_config() {
        let config: ScreenConfig = serde_json::from_str(r#"{"columns": 132}"#).unwrap();
        assert_eq!(config.columns, 132);
        assert_eq!(config.rows, 24);
    }
}
