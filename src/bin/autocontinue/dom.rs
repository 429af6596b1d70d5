use autocontinue::{Control, Feed, Page, PageError, PageSnapshot, StatusView, UserIntent};
use headless_chrome::Tab;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Stable attribute selectors for the host chat page.
#[derive(Debug, Clone, Serialize)]
pub struct Selectors {
    pub continue_button: &'static str,
    pub input: &'static str,
    pub send_button: &'static str,
    pub spinner: &'static str,
    pub regenerate_button: &'static str,
    pub toast_root: &'static str,
    pub error_toast: &'static str,
}

pub const SELECTORS: Selectors = Selectors {
    continue_button: r#"button[aria-label="Continue cut-off message"]"#,
    input: r#"textarea[aria-label="Send message textarea"]"#,
    send_button: r#"button[aria-label="Send message"]"#,
    spinner: r#"button[aria-label="Send message"] div.chakra-spinner"#,
    regenerate_button: r#"button[aria-label="Regenerate"]"#,
    toast_root: "#chakra-toast-manager-top",
    error_toast: r#".chakra-alert[data-status="error"]"#,
};

/// Something the bridge queued since the last drain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEvent {
    Mutation,
    InputBusy,
    HostError,
    User { intent: UserIntent },
    OverlayToggle,
    OverlayLongPress,
}

/// Installed once per document. Keeps an event queue on `window` that the
/// supervisor drains, and never reports clicks made while `synthetic` is set.
///
/// The script:
///   1. Coalesces DOM mutations into one `mutation` event per drain.
///   2. Reports the input turning disabled as `input_busy`.
///   3. Reports Enter (without Shift) in the input and clicks on send,
///      continue and regenerate as user intent.
///   4. Watches the toast container for an error alert.
///   5. Adds the floating round toggle (click vs. 500 ms long press).
const BRIDGE_JS: &str = r#"
(() => {
  if (window.__autoContinue) return 'present';
  const SEL = __SELECTORS__;
  const b = { events: [], dirty: false, synthetic: false, errorShown: false,
              feeds: { mutations: false, input_busy: false } };
  window.__autoContinue = b;
  const push = (e) => { if (b.events.length < 256) b.events.push(e); };

  document.addEventListener('keydown', (e) => {
    if (e.key !== 'Enter' || e.shiftKey || e.isComposing) return;
    if (e.target && e.target.matches && e.target.matches(SEL.input)) {
      push({ kind: 'user', intent: 'submit_key' });
    }
  }, true);

  document.addEventListener('click', (e) => {
    if (b.synthetic || !e.isTrusted || !e.target || !e.target.closest) return;
    if (e.target.closest(SEL.send_button)) push({ kind: 'user', intent: 'send_clicked' });
    else if (e.target.closest(SEL.continue_button)) push({ kind: 'user', intent: 'continue_clicked' });
    else if (e.target.closest(SEL.regenerate_button)) push({ kind: 'user', intent: 'regenerate_clicked' });
  }, true);

  const checkToast = () => {
    const root = document.querySelector(SEL.toast_root);
    const shown = !!(root && root.querySelector(SEL.error_toast));
    if (shown && !b.errorShown) push({ kind: 'host_error' });
    b.errorShown = shown;
  };

  new MutationObserver((records) => {
    if (b.feeds.mutations) b.dirty = true;
    for (const r of records) {
      if (r.type === 'attributes' && r.attributeName === 'disabled'
          && r.target.matches && r.target.matches(SEL.input)
          && r.target.disabled && b.feeds.input_busy) {
        push({ kind: 'input_busy' });
      }
    }
    checkToast();
  }).observe(document.body, { childList: true, subtree: true,
                              attributes: true, attributeFilter: ['disabled'] });

  const btn = document.createElement('button');
  btn.id = '__autoContinueToggle';
  btn.textContent = '>>';
  btn.style.cssText = 'position:fixed;top:10px;left:50%;transform:translateX(-50%);'
    + 'width:40px;height:40px;border-radius:50%;border:2px solid white;color:white;'
    + 'font-size:20px;font-weight:bold;cursor:pointer;z-index:9999;'
    + 'box-shadow:0 2px 5px rgba(0,0,0,0.3);background:rgba(0,0,0,0.8);';
  let pressTimer = null, longPress = false;
  btn.addEventListener('mousedown', (e) => {
    if (e.button !== 0) return;
    longPress = false;
    pressTimer = setTimeout(() => { longPress = true; push({ kind: 'overlay_long_press' }); }, 500);
  });
  btn.addEventListener('mouseup', (e) => {
    if (e.button !== 0) return;
    clearTimeout(pressTimer);
    if (!longPress) push({ kind: 'overlay_toggle' });
    longPress = false;
  });
  btn.addEventListener('mouseleave', () => { clearTimeout(pressTimer); longPress = false; });
  document.body.appendChild(btn);
  checkToast();
  return 'installed';
})()
"#;

const DRAIN_JS: &str = r#"
(() => {
  const b = window.__autoContinue;
  if (!b) return null;
  const out = b.events.splice(0);
  if (b.dirty) { b.dirty = false; out.unshift({ kind: 'mutation' }); }
  return JSON.stringify(out);
})()
"#;

const SNAPSHOT_JS: &str = r#"
(() => {
  const SEL = __SELECTORS__;
  const input = document.querySelector(SEL.input);
  return JSON.stringify({
    continue_button: !!document.querySelector(SEL.continue_button),
    busy: !!document.querySelector(SEL.spinner),
    send_button: !!document.querySelector(SEL.send_button),
    input: input ? { disabled: !!input.disabled, text: input.value || '' } : null,
  });
})()
"#;

const CLICK_JS: &str = r#"
(() => {
  const b = window.__autoContinue;
  const el = document.querySelector(__TARGET__);
  if (!el) return false;
  if (b) b.synthetic = true;
  try { el.click(); } finally { if (b) b.synthetic = false; }
  return true;
})()
"#;

fn with_selectors(js: &str) -> String {
    let json = serde_json::to_string(&SELECTORS).unwrap_or_else(|_| "{}".to_string());
    js.replace("__SELECTORS__", &json)
}

/// Run `js` and return its string result; `None` when it evaluated to
/// something else (usually `null`).
fn eval_string(tab: &Tab, js: &str) -> Result<Option<String>, PageError> {
    let result = tab
        .evaluate(js, false)
        .map_err(|e| PageError::Script(format!("{e:#}")))?;
    Ok(result.value.and_then(|v| v.as_str().map(String::from)))
}

fn eval_bool(tab: &Tab, js: &str) -> Result<bool, PageError> {
    let result = tab
        .evaluate(js, false)
        .map_err(|e| PageError::Script(format!("{e:#}")))?;
    Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
}

/// The chat tab seen through the page bridge.
pub struct ChromePage {
    tab: Arc<Tab>,
}

/// The event side of the page: what the run loop needs besides [`Page`].
pub trait Bridge {
    /// Look for the chat input up to `attempts` times.
    fn wait_for_input(&self, attempts: u32, interval: Duration) -> bool;

    fn install_bridge(&self) -> Result<(), PageError>;

    /// `Ok(None)` means the bridge is gone (reload or navigation).
    fn drain_events(&self) -> Result<Option<Vec<PageEvent>>, PageError>;
}

impl Bridge for ChromePage {
    fn wait_for_input(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 0..attempts {
            if self.input_present() {
                return true;
            }
            if attempt + 1 < attempts {
                std::thread::sleep(interval);
            }
        }
        false
    }

    fn install_bridge(&self) -> Result<(), PageError> {
        let outcome = eval_string(&self.tab, &with_selectors(BRIDGE_JS))?;
        debug!(?outcome, "page bridge");
        Ok(())
    }

    fn drain_events(&self) -> Result<Option<Vec<PageEvent>>, PageError> {
        match eval_string(&self.tab, DRAIN_JS)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn input_present(&self) -> bool {
        let js = format!(
            "!!document.querySelector({})",
            serde_json::json!(SELECTORS.input)
        );
        eval_bool(&self.tab, &js).unwrap_or(false)
    }

    fn set_feed(&self, feed: Feed, on: bool) -> Result<(), PageError> {
        let name = match feed {
            Feed::Mutations => "mutations",
            Feed::InputBusy => "input_busy",
        };
        let js = format!(
            "(() => {{ const b = window.__autoContinue; if (!b) return false; b.feeds.{name} = {on}; return true; }})()"
        );
        if eval_bool(&self.tab, &js)? {
            Ok(())
        } else {
            Err(PageError::BridgeMissing)
        }
    }
}

impl Page for ChromePage {
    fn snapshot(&mut self) -> Result<PageSnapshot, PageError> {
        let raw = eval_string(&self.tab, &with_selectors(SNAPSHOT_JS))?
            .ok_or_else(|| PageError::Script("snapshot returned nothing".into()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn click(&mut self, control: Control) -> Result<(), PageError> {
        let selector = match control {
            Control::Continue => SELECTORS.continue_button,
            Control::Send => SELECTORS.send_button,
        };
        let js = CLICK_JS.replace("__TARGET__", &serde_json::json!(selector).to_string());
        if eval_bool(&self.tab, &js)? {
            Ok(())
        } else {
            Err(PageError::ControlMissing(control))
        }
    }

    fn subscribe(&mut self, feed: Feed) -> Result<(), PageError> {
        self.set_feed(feed, true)
    }

    fn unsubscribe(&mut self, feed: Feed) {
        if let Err(e) = self.set_feed(feed, false) {
            debug!(?feed, "unsubscribe skipped: {e}");
        }
    }
}

/// Repaint the floating toggle. Missing overlay is ignored.
pub fn render_overlay(tab: &Tab, view: &StatusView) {
    let title = format!("Routine: {}\n{}", view.routine_label(), view.clicks_label());
    let js = format!(
        "(() => {{ const el = document.getElementById('__autoContinueToggle'); if (!el) return false; el.style.backgroundColor = {}; el.title = {}; return true; }})()",
        serde_json::json!(view.color()),
        serde_json::json!(title),
    );
    if let Err(e) = tab.evaluate(&js, false) {
        debug!("overlay not updated: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_events_decode() {
        let raw = r#"[{"kind":"mutation"},{"kind":"user","intent":"submit_key"},
                      {"kind":"host_error"},{"kind":"overlay_long_press"}]"#;
        let events: Vec<PageEvent> = serde_json::from_str(raw).unwrap();
        assert_eq!(
            events,
            vec![
                PageEvent::Mutation,
                PageEvent::User {
                    intent: UserIntent::SubmitKey
                },
                PageEvent::HostError,
                PageEvent::OverlayLongPress,
            ]
        );
    }

    #[test]
    fn selectors_are_spliced_as_json() {
        let js = with_selectors(SNAPSHOT_JS);
        assert!(!js.contains("__SELECTORS__"));
        assert!(js.contains(r#"\"Continue cut-off message\""#));
    }
}
