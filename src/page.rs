use serde::{Deserialize, Serialize};

/// Controls the supervisor may click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    /// The "continue cut-off message" affordance.
    Continue,
    /// The alternate send control, used for the stall fallback.
    Send,
}

/// Change notifications the supervisor can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Any structural change in the chat view.
    Mutations,
    /// The input control turned disabled (host started generating).
    InputBusy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
    pub disabled: bool,
    pub text: String,
}

impl InputState {
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// What the page looked like at one instant. Missing elements are `false` /
/// `None`, never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSnapshot {
    pub continue_button: bool,
    pub busy: bool,
    pub send_button: bool,
    pub input: Option<InputState>,
}

impl PageSnapshot {
    /// Continue control present and nothing stands in the way of clicking it.
    pub fn continue_ready(&self) -> bool {
        self.continue_button
            && !self.busy
            && self.input.as_ref().is_some_and(|i| !i.disabled)
    }

    /// Nothing is happening but a message is sitting in the input.
    pub fn stalled(&self) -> bool {
        !self.continue_button
            && !self.busy
            && self
                .input
                .as_ref()
                .is_some_and(|i| !i.disabled && i.has_content())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("page bridge is not installed")]
    BridgeMissing,
    #[error("control {0:?} is not on the page")]
    ControlMissing(Control),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("unexpected page reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The host page as the supervisor sees it.
pub trait Page {
    fn snapshot(&mut self) -> Result<PageSnapshot, PageError>;

    /// Simulate a user click. Implementations must keep the click from being
    /// reported back as user intent.
    fn click(&mut self, control: Control) -> Result<(), PageError>;

    fn subscribe(&mut self, feed: Feed) -> Result<(), PageError>;

    fn unsubscribe(&mut self, feed: Feed);
}
