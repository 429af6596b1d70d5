//! The auto-continue state machine.
//!
//! One [`Supervisor`] owns the configuration, the session counters and every
//! timer and subscription. Hosts feed it three kinds of input: the current
//! time via [`Supervisor::tick`], change notifications from the page, and
//! user actions. It never sleeps; the host asks [`Supervisor::next_deadline`]
//! and waits until then.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigStore};
use crate::guard::RapidActionGuard;
use crate::page::{Control, Feed, Page};
use crate::status::{Mode, StatusSink, StatusView};
use crate::timers::{TimerKind, Timers};

pub const CONTINUE_DEBOUNCE_MS: u64 = 50;
pub const SEND_DEBOUNCE_MS: u64 = 500;
pub const SETTLE_INITIAL_DELAY_MS: u64 = 500;
pub const SETTLE_CHECK_INTERVAL_MS: u64 = 100;
pub const SETTLE_MAX_CHECKS: u32 = 20;
pub const RESET_COOLDOWN_MS: u64 = 1000;

/// Deliberate human actions on the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    SubmitKey,
    SendClicked,
    ContinueClicked,
    RegenerateClicked,
}

/// Which timer families and subscriptions are live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Handles {
    pub poll: bool,
    pub stall: bool,
    pub debounce: bool,
    pub settle: bool,
    pub reset_cooldown: bool,
    pub mutations: bool,
    pub input_busy: bool,
}

impl Handles {
    pub fn all_clear(&self) -> bool {
        *self == Handles::default()
    }
}

#[derive(Debug, Default)]
struct Session {
    action_count: u32,
    guard: RapidActionGuard,
    error_active: bool,
    cooling_down: bool,
    pending: Option<Control>,
    // None while the settle wait is in its initial delay
    settle_checks: Option<u32>,
    mutations: bool,
    input_busy: bool,
}

pub struct Supervisor<P, S> {
    config: Config,
    store: Box<dyn ConfigStore>,
    page: P,
    sink: S,
    timers: Timers,
    session: Session,
    started: bool,
    last_view: Option<StatusView>,
}

impl<P: Page, S: StatusSink> Supervisor<P, S> {
    /// Load configuration from `store` and build an idle supervisor.
    pub fn new(store: Box<dyn ConfigStore>, page: P, sink: S) -> Self {
        let config = Config::load(store.as_ref());
        Self::with_config(config, store, page, sink)
    }

    pub fn with_config(config: Config, store: Box<dyn ConfigStore>, page: P, sink: S) -> Self {
        Self {
            config,
            store,
            page,
            sink,
            timers: Timers::new(),
            session: Session::default(),
            started: false,
            last_view: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn action_count(&self) -> u32 {
        self.session.action_count
    }

    pub fn error_active(&self) -> bool {
        self.session.error_active
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn handles(&self) -> Handles {
        Handles {
            poll: self.timers.is_armed(TimerKind::Poll),
            stall: self.timers.is_armed(TimerKind::Stall),
            debounce: self.timers.is_armed(TimerKind::Debounce),
            settle: self.timers.is_armed(TimerKind::Settle),
            reset_cooldown: self.timers.is_armed(TimerKind::ResetCooldown),
            mutations: self.session.mutations,
            input_busy: self.session.input_busy,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.session.error_active {
            Mode::PausedError
        } else if !self.config.enabled {
            Mode::Disabled
        } else if !self.started {
            Mode::Idle
        } else if self.session.action_count >= self.config.effective_ceiling() {
            Mode::PausedLimitReached
        } else if self.session.cooling_down
            || self.timers.is_armed(TimerKind::Debounce)
            || self.timers.is_armed(TimerKind::Settle)
        {
            Mode::CoolingDown
        } else {
            Mode::Active
        }
    }

    pub fn view(&self) -> StatusView {
        StatusView {
            mode: self.mode(),
            count: self.session.action_count,
            ceiling: self.config.effective_ceiling(),
            continuous: self.config.continuous_mode_enabled,
        }
    }

    // ---- lifecycle ----

    /// The host page's input control has been found.
    pub fn start(&mut self, now_ms: u64) {
        info!(config = ?self.config, "session starting");
        self.started = true;
        if self.config.enabled {
            self.full_reset("startup", now_ms);
        } else {
            self.teardown();
            self.render();
        }
    }

    /// The chat view went away; drop everything until the next [`start`].
    ///
    /// [`start`]: Supervisor::start
    pub fn suspend(&mut self, reason: &str) {
        if !self.started {
            return;
        }
        info!(reason, "session suspended");
        self.started = false;
        self.teardown();
        self.render();
    }

    /// Fire every deadline due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) {
        while let Some(kind) = self.timers.pop_due(now_ms) {
            match kind {
                TimerKind::Poll => {
                    self.timers
                        .arm(TimerKind::Poll, now_ms, self.config.poll_interval_ms);
                    if self.gate_open() {
                        self.check(now_ms);
                    }
                }
                TimerKind::Stall => self.on_stall(now_ms),
                TimerKind::Debounce => self.perform_pending(now_ms),
                TimerKind::Settle => self.settle_step(now_ms),
                TimerKind::ResetCooldown => {
                    self.session.cooling_down = false;
                    debug!("reset cooldown over");
                    self.arm(now_ms);
                }
            }
            self.render();
        }
    }

    // ---- inputs ----

    pub fn on_notification(&mut self, feed: Feed, now_ms: u64) {
        match feed {
            Feed::Mutations => {
                if self.session.mutations && self.gate_open() {
                    self.check(now_ms);
                }
            }
            Feed::InputBusy => {
                if !self.session.input_busy {
                    return;
                }
                if self.session.cooling_down
                    || self.timers.is_armed(TimerKind::Debounce)
                    || self.timers.is_armed(TimerKind::Settle)
                {
                    return;
                }
                debug!("input disabled, host is generating");
                self.begin_settle(now_ms);
            }
        }
        self.render();
    }

    /// A deliberate user action always wins over automatic state.
    pub fn on_user_intent(&mut self, intent: UserIntent, now_ms: u64) {
        info!(?intent, "user intent");
        self.clear_error();
        self.full_reset("user intent", now_ms);
    }

    /// The host page reported a failure.
    pub fn on_host_error(&mut self) {
        if self.session.error_active {
            return;
        }
        warn!("host error signal, pausing until user action");
        self.latch_error();
    }

    /// Master switch.
    pub fn toggle_enabled(&mut self, now_ms: u64) {
        self.config.enabled = !self.config.enabled;
        self.config.save(self.store.as_mut());
        info!(enabled = self.config.enabled, "toggled");
        self.clear_error();
        if self.config.enabled {
            self.full_reset("enabled", now_ms);
        } else {
            self.teardown();
            self.render();
        }
    }

    pub fn toggle_continuous_mode(&mut self, now_ms: u64) {
        let on = self.config.toggle_continuous_mode();
        self.config.save(self.store.as_mut());
        info!(
            continuous = on,
            ceiling = self.config.effective_ceiling(),
            "continuous mode toggled"
        );
        self.clear_error();
        self.full_reset("continuous mode toggled", now_ms);
    }

    /// `0` selects continuous mode.
    pub fn set_max_actions(&mut self, value: u32, now_ms: u64) {
        self.config.set_max_actions(value);
        self.config.save(self.store.as_mut());
        info!(
            ceiling = self.config.effective_ceiling(),
            continuous = self.config.continuous_mode_enabled,
            "max actions changed"
        );
        self.clear_error();
        self.full_reset("max actions changed", now_ms);
    }

    // ---- transitions ----

    fn gate_open(&self) -> bool {
        self.started
            && self.config.enabled
            && !self.session.error_active
            && self.session.action_count < self.config.effective_ceiling()
            && !self.session.cooling_down
            && !self.timers.is_armed(TimerKind::Debounce)
            && !self.timers.is_armed(TimerKind::Settle)
    }

    fn clear_error(&mut self) {
        if self.session.error_active {
            info!("error state cleared by user");
            self.session.error_active = false;
        }
    }

    fn latch_error(&mut self) {
        self.session.error_active = true;
        self.teardown();
        self.render();
    }

    /// Cancel every timer and drop both subscriptions.
    fn teardown(&mut self) {
        self.timers.cancel_all();
        self.session.pending = None;
        self.session.settle_checks = None;
        self.session.cooling_down = false;
        self.drop_feed(Feed::Mutations);
        self.drop_feed(Feed::InputBusy);
    }

    fn full_reset(&mut self, reason: &str, now_ms: u64) {
        info!(reason, "counter reset");
        self.teardown();
        self.session.action_count = 0;
        self.session.guard.clear();
        if self.config.enabled && self.started {
            self.session.cooling_down = true;
            self.timers
                .arm(TimerKind::ResetCooldown, now_ms, RESET_COOLDOWN_MS);
        }
        self.render();
    }

    /// Install polling and both subscriptions, unless something else
    /// currently owns the "suppress polling" gate.
    fn arm(&mut self, now_ms: u64) {
        if !self.started || !self.config.enabled || self.session.error_active {
            return;
        }
        if self.session.cooling_down
            || self.timers.is_armed(TimerKind::Debounce)
            || self.timers.is_armed(TimerKind::Settle)
        {
            debug!("arm skipped, cooldown or settle wait in progress");
            return;
        }
        if self.session.action_count >= self.config.effective_ceiling() {
            info!(
                count = self.session.action_count,
                ceiling = self.config.effective_ceiling(),
                "limit reached, waiting for user"
            );
            self.teardown();
            return;
        }

        self.add_feed(Feed::Mutations);
        self.add_feed(Feed::InputBusy);
        self.timers
            .arm(TimerKind::Poll, now_ms, self.config.poll_interval_ms);
        debug!(interval_ms = self.config.poll_interval_ms, "armed");
    }

    fn add_feed(&mut self, feed: Feed) {
        self.drop_feed(feed);
        let ok = match self.page.subscribe(feed) {
            Ok(()) => true,
            Err(e) => {
                debug!(?feed, "subscribe failed, relying on poll: {e}");
                false
            }
        };
        match feed {
            Feed::Mutations => self.session.mutations = ok,
            Feed::InputBusy => self.session.input_busy = ok,
        }
    }

    fn drop_feed(&mut self, feed: Feed) {
        let live = match feed {
            Feed::Mutations => std::mem::take(&mut self.session.mutations),
            Feed::InputBusy => std::mem::take(&mut self.session.input_busy),
        };
        if live {
            self.page.unsubscribe(feed);
        }
    }

    /// One evaluation of the page.
    fn check(&mut self, now_ms: u64) {
        if !self.gate_open() {
            self.timers.cancel(TimerKind::Stall);
            return;
        }
        let snap = match self.page.snapshot() {
            Ok(snap) => snap,
            Err(e) => {
                debug!("page not readable, trying next cycle: {e}");
                return;
            }
        };

        if snap.continue_ready() {
            debug!("continue control ready");
            self.timers.cancel(TimerKind::Stall);
            self.schedule_action(Control::Continue, now_ms, CONTINUE_DEBOUNCE_MS);
        } else if snap.stalled() {
            if self.config.auto_send_enabled && !self.timers.is_armed(TimerKind::Stall) {
                debug!(
                    delay_secs = self.config.auto_send_delay_secs,
                    "message waiting, stall timer armed"
                );
                self.arm_stall(now_ms);
            }
        } else {
            self.timers.cancel(TimerKind::Stall);
        }
    }

    fn arm_stall(&mut self, now_ms: u64) {
        self.timers.arm(
            TimerKind::Stall,
            now_ms,
            self.config.auto_send_delay_secs.saturating_mul(1000),
        );
    }

    fn on_stall(&mut self, now_ms: u64) {
        if !self.gate_open() || !self.config.auto_send_enabled {
            return;
        }
        match self.page.snapshot() {
            Ok(snap) if snap.stalled() && snap.send_button => {
                info!("no response in time, sending");
                self.schedule_action(Control::Send, now_ms, SEND_DEBOUNCE_MS);
            }
            Ok(_) => {
                debug!("stall conditions changed, re-arming");
                self.arm_stall(now_ms);
            }
            Err(e) => {
                debug!("page not readable at stall check, re-arming: {e}");
                self.arm_stall(now_ms);
            }
        }
    }

    fn schedule_action(&mut self, control: Control, now_ms: u64, delay_ms: u64) {
        self.session.cooling_down = true;
        self.session.pending = Some(control);
        self.timers.arm(TimerKind::Debounce, now_ms, delay_ms);
    }

    fn perform_pending(&mut self, now_ms: u64) {
        self.session.cooling_down = false;
        let Some(control) = self.session.pending.take() else {
            return;
        };
        if let Err(e) = self.page.click(control) {
            debug!(?control, "automatic click failed: {e}");
            return;
        }
        self.session.action_count += 1;
        info!(
            ?control,
            count = self.session.action_count,
            ceiling = self.config.effective_ceiling(),
            "automatic action"
        );

        if self.session.guard.record(now_ms) {
            warn!("rapid action pattern detected, pausing until user action");
            self.latch_error();
            return;
        }
        self.begin_settle(now_ms);
    }

    fn begin_settle(&mut self, now_ms: u64) {
        self.timers.cancel(TimerKind::Poll);
        self.timers.cancel(TimerKind::Stall);
        self.drop_feed(Feed::Mutations);
        self.session.settle_checks = None;
        self.timers
            .arm(TimerKind::Settle, now_ms, SETTLE_INITIAL_DELAY_MS);
    }

    fn settle_step(&mut self, now_ms: u64) {
        let Some(checks) = self.session.settle_checks else {
            self.session.settle_checks = Some(0);
            self.timers
                .arm(TimerKind::Settle, now_ms, SETTLE_CHECK_INTERVAL_MS);
            return;
        };

        // an unreadable page counts as "no spinner"
        let busy = self.page.snapshot().map(|s| s.busy).unwrap_or(false);
        let checks = checks + 1;
        if busy && checks < SETTLE_MAX_CHECKS {
            self.session.settle_checks = Some(checks);
            self.timers
                .arm(TimerKind::Settle, now_ms, SETTLE_CHECK_INTERVAL_MS);
            return;
        }
        if busy {
            warn!("busy indicator still present after settle wait, re-arming anyway");
        } else {
            debug!(checks, "settled");
        }
        self.session.settle_checks = None;
        self.timers.cancel(TimerKind::Stall);
        self.arm(now_ms);
    }

    fn render(&mut self) {
        let view = self.view();
        if self.last_view != Some(view) {
            self.last_view = Some(view);
            self.sink.render(&view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_KEY, MemoryStore};
    use crate::page::{InputState, PageError, PageSnapshot};
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakePage {
        snap: PageSnapshot,
        clicks: Vec<Control>,
        feeds: HashSet<Feed>,
        subscribe_calls: usize,
        // continue control reappears right after being clicked
        sticky_continue: bool,
        unreadable: bool,
    }

    impl FakePage {
        fn with_continue() -> Self {
            Self {
                snap: PageSnapshot {
                    continue_button: true,
                    send_button: true,
                    input: Some(InputState::default()),
                    ..Default::default()
                },
                ..Default::default()
            }
        }

        fn with_pending_text(text: &str) -> Self {
            Self {
                snap: PageSnapshot {
                    send_button: true,
                    input: Some(InputState {
                        disabled: false,
                        text: text.to_string(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }
        }
    }

    impl Page for FakePage {
        fn snapshot(&mut self) -> Result<PageSnapshot, PageError> {
            if self.unreadable {
                return Err(PageError::BridgeMissing);
            }
            Ok(self.snap.clone())
        }

        fn click(&mut self, control: Control) -> Result<(), PageError> {
            self.clicks.push(control);
            match control {
                Control::Continue => self.snap.continue_button = self.sticky_continue,
                Control::Send => {
                    if let Some(input) = self.snap.input.as_mut() {
                        input.text.clear();
                    }
                }
            }
            Ok(())
        }

        fn subscribe(&mut self, feed: Feed) -> Result<(), PageError> {
            self.subscribe_calls += 1;
            assert!(self.feeds.insert(feed), "double subscription to {feed:?}");
            Ok(())
        }

        fn unsubscribe(&mut self, feed: Feed) {
            self.feeds.remove(&feed);
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<StatusView>);

    impl StatusSink for Recorder {
        fn render(&mut self, view: &StatusView) {
            self.0.push(*view);
        }
    }

    type TestSupervisor = Supervisor<FakePage, Recorder>;

    fn supervisor(page: FakePage, config: Config) -> TestSupervisor {
        Supervisor::with_config(config, Box::new(MemoryStore::default()), page, Recorder::default())
    }

    /// Fire every deadline up to and including `to`, in order.
    fn advance(sup: &mut TestSupervisor, to: u64) {
        while let Some(deadline) = sup.next_deadline().filter(|d| *d <= to) {
            sup.tick(deadline);
        }
    }

    /// Like `advance`, but also delivers a mutation notification every 10 ms.
    fn pump(sup: &mut TestSupervisor, from: u64, to: u64) {
        let mut now = from;
        while now <= to {
            advance(sup, now);
            sup.on_notification(Feed::Mutations, now);
            now += 10;
        }
    }

    #[test]
    fn startup_waits_for_reset_cooldown_then_arms() {
        let mut sup = supervisor(FakePage::default(), Config::default());
        sup.start(0);
        assert_eq!(sup.mode(), Mode::CoolingDown);
        assert!(sup.handles().reset_cooldown);
        assert!(!sup.handles().poll);

        advance(&mut sup, 1000);
        let h = sup.handles();
        assert!(h.poll && h.mutations && h.input_busy);
        assert!(!h.reset_cooldown);
        assert_eq!(sup.mode(), Mode::Active);
    }

    #[test]
    fn disabled_start_arms_nothing() {
        let config = Config {
            enabled: false,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_continue(), config);
        sup.start(0);
        advance(&mut sup, 10_000);
        assert!(sup.handles().all_clear());
        assert_eq!(sup.mode(), Mode::Disabled);
        assert!(sup.page().clicks.is_empty());
    }

    #[test]
    fn clicks_continue_then_pauses_at_limit() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 2000);
        // poll at 2000 scheduled the click for 2050
        assert_eq!(sup.mode(), Mode::CoolingDown);
        assert!(sup.page().clicks.is_empty());

        advance(&mut sup, 2050);
        assert_eq!(sup.page().clicks, vec![Control::Continue]);
        assert_eq!(sup.action_count(), 1);
        assert!(sup.handles().settle);

        advance(&mut sup, 5000);
        assert_eq!(sup.mode(), Mode::PausedLimitReached);
        assert!(sup.handles().all_clear());
        assert!(sup.page().feeds.is_empty());
    }

    #[test]
    fn mutation_notification_triggers_check() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 1000);
        sup.on_notification(Feed::Mutations, 1200);
        assert!(sup.handles().debounce);
        advance(&mut sup, 1250);
        assert_eq!(sup.action_count(), 1);
    }

    #[test]
    fn notifications_ignored_while_cooling_down() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        sup.on_notification(Feed::Mutations, 500);
        sup.on_notification(Feed::InputBusy, 500);
        assert!(!sup.handles().debounce);
        assert!(!sup.handles().settle);
    }

    #[test]
    fn user_intent_resets_limit_pause() {
        let config = Config {
            max_actions: 2,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_continue(), config);
        sup.start(0);
        advance(&mut sup, 2050);
        assert_eq!(sup.action_count(), 1);

        sup.page_mut().snap.continue_button = true;
        advance(&mut sup, 10_000);
        assert_eq!(sup.action_count(), 2);
        assert_eq!(sup.mode(), Mode::PausedLimitReached);

        sup.on_user_intent(UserIntent::SubmitKey, 10_000);
        assert_eq!(sup.action_count(), 0);
        assert_eq!(sup.mode(), Mode::CoolingDown);
        assert!(!sup.handles().poll);

        advance(&mut sup, 11_000);
        assert_eq!(sup.mode(), Mode::Active);
        assert!(sup.handles().poll);
    }

    #[test]
    fn rapid_actions_latch_error() {
        let mut page = FakePage::with_continue();
        page.sticky_continue = true;
        let config = Config {
            continuous_mode_enabled: true,
            ..Config::default()
        };
        let mut sup = supervisor(page, config);
        sup.start(0);

        pump(&mut sup, 0, 5000);
        assert_eq!(sup.page().clicks.len(), 3);
        assert_eq!(sup.mode(), Mode::PausedError);
        assert!(sup.error_active());
        assert!(sup.handles().all_clear());

        pump(&mut sup, 5000, 20_000);
        assert_eq!(sup.page().clicks.len(), 3);

        sup.on_user_intent(UserIntent::ContinueClicked, 20_000);
        assert!(!sup.error_active());
        assert_eq!(sup.action_count(), 0);
        assert_eq!(sup.mode(), Mode::CoolingDown);
    }

    #[test]
    fn stall_sends_exactly_once() {
        let config = Config {
            max_actions: 5,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_pending_text("still here?"), config);
        sup.start(0);
        advance(&mut sup, 2000);
        // first poll at 2000 armed the stall timer for 12000
        assert!(sup.handles().stall);

        advance(&mut sup, 11_999);
        assert!(sup.page().clicks.is_empty());

        advance(&mut sup, 12_500);
        assert_eq!(sup.page().clicks, vec![Control::Send]);
        assert_eq!(sup.action_count(), 1);

        advance(&mut sup, 60_000);
        assert_eq!(sup.page().clicks, vec![Control::Send]);
        assert_eq!(sup.action_count(), 1);
        assert!(!sup.handles().stall);
    }

    #[test]
    fn stall_rearms_when_conditions_changed() {
        let config = Config {
            poll_interval_ms: 600_000,
            max_actions: 5,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_pending_text("hello"), config);
        sup.start(0);
        advance(&mut sup, 1000);
        sup.on_notification(Feed::Mutations, 1000);
        assert_eq!(sup.timers.deadline(TimerKind::Stall), Some(11_000));

        sup.page_mut().snap.busy = true;
        advance(&mut sup, 11_000);
        assert!(sup.page().clicks.is_empty());
        assert_eq!(sup.timers.deadline(TimerKind::Stall), Some(21_000));
    }

    #[test]
    fn stall_rearms_when_send_control_missing() {
        let config = Config {
            poll_interval_ms: 600_000,
            max_actions: 5,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_pending_text("hello"), config);
        sup.start(0);
        advance(&mut sup, 1000);
        sup.on_notification(Feed::Mutations, 1000);
        assert_eq!(sup.timers.deadline(TimerKind::Stall), Some(11_000));

        sup.page_mut().snap.send_button = false;
        advance(&mut sup, 11_000);
        assert!(sup.page().clicks.is_empty());
        assert!(!sup.handles().debounce);
        assert_eq!(sup.timers.deadline(TimerKind::Stall), Some(21_000));
        assert_eq!(sup.action_count(), 0);
    }

    #[test]
    fn stall_not_armed_when_auto_send_disabled() {
        let config = Config {
            auto_send_enabled: false,
            ..Config::default()
        };
        let mut sup = supervisor(FakePage::with_pending_text("hello"), config);
        sup.start(0);
        advance(&mut sup, 30_000);
        assert!(!sup.handles().stall);
        assert!(sup.page().clicks.is_empty());
    }

    #[test]
    fn rearm_is_idempotent() {
        let mut sup = supervisor(FakePage::default(), Config::default());
        sup.start(0);
        advance(&mut sup, 1000);
        sup.arm(1000);
        sup.arm(1500);
        assert_eq!(sup.page().subscribe_calls, 6);
        assert_eq!(sup.page().feeds.len(), 2);
        assert_eq!(sup.timers.deadline(TimerKind::Poll), Some(2500));
        assert!(sup.handles().poll);
    }

    #[test]
    fn user_intent_cancels_pending_click() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 2000);
        assert!(sup.handles().debounce);

        sup.on_user_intent(UserIntent::SendClicked, 2010);
        assert!(!sup.handles().debounce);
        advance(&mut sup, 2100);
        assert!(sup.page().clicks.is_empty());
    }

    #[test]
    fn host_error_pauses_until_user_acts() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 1000);
        sup.on_host_error();
        assert_eq!(sup.mode(), Mode::PausedError);
        assert!(sup.handles().all_clear());

        advance(&mut sup, 10_000);
        sup.on_notification(Feed::Mutations, 10_000);
        assert!(sup.page().clicks.is_empty());

        sup.on_user_intent(UserIntent::RegenerateClicked, 10_000);
        advance(&mut sup, 12_050);
        assert_eq!(sup.page().clicks, vec![Control::Continue]);
    }

    #[test]
    fn busy_input_starts_settle_wait() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.page_mut().snap.busy = true;
        sup.start(0);
        advance(&mut sup, 1000);
        sup.on_notification(Feed::InputBusy, 1100);
        let h = sup.handles();
        assert!(h.settle && !h.poll && !h.mutations);

        // spinner never clears: 500 ms delay plus 20 checks
        advance(&mut sup, 1100 + 500 + 19 * 100);
        assert!(sup.handles().settle);
        advance(&mut sup, 1100 + 500 + 20 * 100);
        assert!(!sup.handles().settle);
        assert!(sup.handles().poll);
    }

    #[test]
    fn toggle_off_tears_down_and_persists() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 2000);
        sup.toggle_enabled(2010);
        assert_eq!(sup.mode(), Mode::Disabled);
        assert!(sup.handles().all_clear());
        let stored = sup.store().get(CONFIG_KEY).unwrap().unwrap();
        assert_eq!(stored["enabled"], false);

        sup.toggle_enabled(3000);
        assert_eq!(sup.mode(), Mode::CoolingDown);
        advance(&mut sup, 4000);
        assert_eq!(sup.mode(), Mode::Active);
    }

    #[test]
    fn continuous_toggle_round_trip_keeps_finite_ceiling() {
        let mut sup = supervisor(FakePage::default(), Config::default());
        sup.start(0);
        sup.set_max_actions(4, 0);
        assert_eq!(sup.view().ceiling, 4);

        sup.toggle_continuous_mode(10);
        assert!(sup.view().continuous);
        assert_eq!(sup.view().ceiling, 100);

        sup.toggle_continuous_mode(20);
        assert_eq!(sup.view().ceiling, 4);
    }

    #[test]
    fn menu_zero_selects_continuous_and_resets() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 5000);
        assert_eq!(sup.mode(), Mode::PausedLimitReached);

        sup.set_max_actions(0, 5000);
        assert_eq!(sup.action_count(), 0);
        assert!(sup.config().continuous_mode_enabled);
        assert_eq!(sup.view().ceiling, sup.config().continuous_ceiling);
    }

    #[test]
    fn suspend_drops_everything() {
        let mut sup = supervisor(FakePage::with_continue(), Config::default());
        sup.start(0);
        advance(&mut sup, 2000);
        sup.suspend("navigated away");
        assert!(sup.handles().all_clear());
        assert_eq!(sup.mode(), Mode::Idle);
        assert_eq!(sup.sink().0.last().map(|v| v.mode), Some(Mode::Idle));
        assert!(sup.page().feeds.is_empty());
        advance(&mut sup, 20_000);
        assert!(sup.page().clicks.is_empty());
    }

    #[test]
    fn unreadable_page_is_not_an_error() {
        let mut page = FakePage::with_continue();
        page.unreadable = true;
        let mut sup = supervisor(page, Config::default());
        sup.start(0);
        advance(&mut sup, 10_000);
        assert_eq!(sup.mode(), Mode::Active);
        assert!(sup.handles().poll);

        sup.page_mut().unreadable = false;
        advance(&mut sup, 11_050);
        assert_eq!(sup.action_count(), 1);
    }

    #[test]
    fn count_tracks_actions_since_reset() {
        let mut page = FakePage::with_continue();
        page.sticky_continue = true;
        let config = Config {
            max_actions: 50,
            poll_interval_ms: 3000,
            ..Config::default()
        };
        let mut sup = supervisor(page, config);
        sup.start(0);
        advance(&mut sup, 30_000);
        let clicks = sup.page().clicks.len() as u32;
        assert!(clicks > 2);
        assert_eq!(sup.action_count(), clicks);
        assert!(!sup.error_active());

        sup.on_user_intent(UserIntent::SubmitKey, 30_000);
        assert_eq!(sup.action_count(), 0);
    }

    #[test]
    fn renders_only_on_change() {
        let mut sup = supervisor(FakePage::default(), Config::default());
        sup.start(0);
        advance(&mut sup, 10_000);
        let views = &sup.sink().0;
        assert_eq!(views.first().map(|v| v.mode), Some(Mode::CoolingDown));
        assert_eq!(views.last().map(|v| v.mode), Some(Mode::Active));
        assert!(views.windows(2).all(|w| w[0] != w[1]));
    }
}
