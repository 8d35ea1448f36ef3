//! Progress rendering preferences.

use serde::{Deserialize, Serialize};

/// When to draw the live progress line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    /// Only when stderr is a terminal.
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProgressConfig {
    #[serde(default)]
    pub mode: ProgressMode,
}

impl ProgressConfig {
    /// Resolve the mode against whether the output is interactive.
    ///
    /// `On` still requires a terminal: the live line rewrites itself in place
    /// and would garble redirected output.
    #[must_use]
    pub const fn enabled(&self, is_terminal: bool) -> bool {
        match self.mode {
            ProgressMode::Auto | ProgressMode::On => is_terminal,
            ProgressMode::Off => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_never_renders() {
        let config = ProgressConfig {
            mode: ProgressMode::Off,
        };
        assert!(!config.enabled(true));
    }

    #[test]
    fn auto_follows_terminal() {
        let config = ProgressConfig::default();
        assert!(config.enabled(true));
        assert!(!config.enabled(false));
    }
}
