use autocontinue::{Feed, Page, StatusSink, StatusView, Supervisor};
use headless_chrome::Tab;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::dom::{self, Bridge, ChromePage, PageEvent};
use crate::face::UiCommand;

/// How often the page bridge is drained.
const DRAIN_INTERVAL_MS: u64 = 100;
const INPUT_LOOKUP_ATTEMPTS: u32 = 20;
const INPUT_LOOKUP_INTERVAL: Duration = Duration::from_millis(100);
/// Pause between attach attempts while the chat view is not showing.
const ATTACH_BACKOFF_MS: u64 = 2000;

/// Publishes every status change to the web panel and the in-page toggle.
pub struct PanelSink {
    status_tx: watch::Sender<Option<StatusView>>,
    tab: Arc<Tab>,
}

impl PanelSink {
    pub fn new(status_tx: watch::Sender<Option<StatusView>>, tab: Arc<Tab>) -> Self {
        Self { status_tx, tab }
    }
}

impl StatusSink for PanelSink {
    fn render(&mut self, view: &StatusView) {
        info!(
            routine = view.routine_label(),
            clicks = %view.clicks_label(),
            "status"
        );
        self.status_tx.send_replace(Some(*view));
        dom::render_overlay(&self.tab, view);
    }
}

pub type ChatSupervisor = Supervisor<ChromePage, PanelSink>;

/// Drive the supervisor until the command channel closes.
pub fn run(mut sup: ChatSupervisor, commands: Receiver<UiCommand>) {
    let clock = Instant::now();
    let now = || clock.elapsed().as_millis() as u64;
    let mut next_attach = 0;

    loop {
        pass(&mut sup, now());

        if !sup.is_started() && now() >= next_attach && !attach(&mut sup, now()) {
            next_attach = now() + ATTACH_BACKOFF_MS;
        }

        let wait = sup
            .next_deadline()
            .map(|d| d.saturating_sub(now()))
            .unwrap_or(DRAIN_INTERVAL_MS)
            .min(DRAIN_INTERVAL_MS);

        match commands.recv_timeout(Duration::from_millis(wait)) {
            Ok(cmd) => apply(&mut sup, cmd, now()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("status panel gone, stopping");
                return;
            }
        }
    }
}

/// One pass of the loop. Queued page events are dispatched before any due
/// deadline fires, so a user action cancels an automatic action that is
/// already due.
fn pass<P: Page + Bridge, S: StatusSink>(sup: &mut Supervisor<P, S>, now_ms: u64) {
    if sup.is_started() {
        drain(sup, now_ms);
    }
    sup.tick(now_ms);
}

/// Wait for the chat input, install the bridge and start a session.
fn attach<P: Page + Bridge, S: StatusSink>(sup: &mut Supervisor<P, S>, now_ms: u64) -> bool {
    if !sup
        .page()
        .wait_for_input(INPUT_LOOKUP_ATTEMPTS, INPUT_LOOKUP_INTERVAL)
    {
        debug!("chat input not found, will retry");
        return false;
    }
    if let Err(e) = sup.page().install_bridge() {
        warn!("could not install page bridge: {e}");
        return false;
    }
    info!("chat input found, starting session");
    sup.start(now_ms);
    true
}

fn drain<P: Page + Bridge, S: StatusSink>(sup: &mut Supervisor<P, S>, now_ms: u64) {
    let events = match sup.page().drain_events() {
        Ok(Some(events)) => events,
        Ok(None) => {
            sup.suspend("page bridge gone (navigation or reload)");
            return;
        }
        Err(e) => {
            debug!("drain failed: {e}");
            return;
        }
    };

    for event in events {
        dispatch(sup, event, now_ms);
    }
}

fn dispatch<P: Page, S: StatusSink>(sup: &mut Supervisor<P, S>, event: PageEvent, now_ms: u64) {
    match event {
        PageEvent::Mutation => sup.on_notification(Feed::Mutations, now_ms),
        PageEvent::InputBusy => sup.on_notification(Feed::InputBusy, now_ms),
        PageEvent::HostError => sup.on_host_error(),
        PageEvent::User { intent } => sup.on_user_intent(intent, now_ms),
        PageEvent::OverlayToggle => sup.toggle_enabled(now_ms),
        PageEvent::OverlayLongPress => sup.toggle_continuous_mode(now_ms),
    }
}

fn apply<P: Page, S: StatusSink>(sup: &mut Supervisor<P, S>, cmd: UiCommand, now_ms: u64) {
    match cmd {
        UiCommand::Toggle => sup.toggle_enabled(now_ms),
        UiCommand::ToggleContinuous => sup.toggle_continuous_mode(now_ms),
        UiCommand::SetMaxActions(value) => sup.set_max_actions(value, now_ms),
    }
}
