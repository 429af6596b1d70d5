use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No chat view attached.
    Idle,
    Disabled,
    Active,
    CoolingDown,
    PausedLimitReached,
    PausedError,
}

/// Everything a status surface needs to draw itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub mode: Mode,
    pub count: u32,
    pub ceiling: u32,
    pub continuous: bool,
}

impl StatusView {
    pub fn routine_label(&self) -> &'static str {
        match self.mode {
            Mode::PausedError => "🔴 Paused (Error)",
            Mode::Disabled => "⚫ Disabled",
            Mode::Idle => "⚪ Waiting for chat",
            Mode::PausedLimitReached => "🟡 Paused (Limit Reached)",
            _ if self.continuous => "🔵 Continuous",
            Mode::CoolingDown => "🟢 Active (settling)",
            Mode::Active => "🟢 Active",
        }
    }

    pub fn clicks_label(&self) -> String {
        if self.continuous {
            format!("Clicks: {} (∞)", self.count)
        } else {
            format!("Clicks: {}/{}", self.count, self.ceiling)
        }
    }

    /// CSS colour for the floating toggle.
    pub fn color(&self) -> &'static str {
        match self.mode {
            Mode::PausedError => "rgba(255, 0, 0, 0.9)",
            Mode::Disabled => "rgba(0, 0, 0, 0.8)",
            Mode::Idle => "rgba(128, 128, 128, 0.6)",
            Mode::PausedLimitReached => "rgba(255, 215, 0, 0.6)",
            _ if self.continuous => "rgba(0, 0, 255, 0.6)",
            Mode::Active | Mode::CoolingDown => "rgba(0, 128, 0, 0.6)",
        }
    }
}

/// Receives the status after every state change.
pub trait StatusSink {
    fn render(&mut self, view: &StatusView);
}
