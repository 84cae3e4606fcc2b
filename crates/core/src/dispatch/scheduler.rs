use crate::dispatch::window::SendWindow;
use crate::domain::digest::AlertDigest;
use crate::notify::NotificationSink;
use crate::time::Clock;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Last successful delivery date. Lives for the process only; a restart re-arms the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchState {
    pub last_sent_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    Armed,
    Fired,
}

impl DispatchState {
    pub fn phase(&self, today: NaiveDate) -> DispatchPhase {
        if self.last_sent_date == Some(today) {
            DispatchPhase::Fired
        } else {
            DispatchPhase::Armed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Timer or refresh driven; restricted to the send window.
    Scheduled,
    /// Operator "send now"; skips the window check only.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent { date: NaiveDate },
    AlreadySent,
    OutsideWindow,
    DeliveryFailed,
    /// The sink has no credentials; nothing will be delivered until it is configured.
    Disabled,
}

/// At-most-once-per-day gate in front of the notification sink.
///
/// The gate check, the delivery, and the state transition happen under a single lock, so two
/// triggers racing inside the window cannot both deliver.
pub struct DispatchScheduler {
    state: Mutex<DispatchState>,
    window: SendWindow,
    clock: Arc<dyn Clock>,
}

impl DispatchScheduler {
    pub fn new(window: SendWindow, clock: Arc<dyn Clock>) -> Self {
        Self::with_state(DispatchState::default(), window, clock)
    }

    pub fn with_state(state: DispatchState, window: SendWindow, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(state),
            window,
            clock,
        }
    }

    pub fn window(&self) -> SendWindow {
        self.window
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub async fn state(&self) -> DispatchState {
        *self.state.lock().await
    }

    /// Scheduled-trigger gate: armed for `now`'s date and inside the send window.
    pub async fn may_dispatch(&self, now: NaiveDateTime) -> bool {
        let state = self.state.lock().await;
        self.check(&state, now, Trigger::Scheduled).is_ok()
    }

    fn check(
        &self,
        state: &DispatchState,
        now: NaiveDateTime,
        trigger: Trigger,
    ) -> Result<(), DispatchOutcome> {
        if state.phase(now.date()) == DispatchPhase::Fired {
            return Err(DispatchOutcome::AlreadySent);
        }
        if trigger == Trigger::Scheduled && !self.window.contains(now.time()) {
            return Err(DispatchOutcome::OutsideWindow);
        }
        Ok(())
    }

    pub async fn dispatch(
        &self,
        trigger: Trigger,
        digest: &AlertDigest,
        sink: &dyn NotificationSink,
    ) -> DispatchOutcome {
        if !sink.is_configured() {
            tracing::debug!(?trigger, "notification sink not configured; dispatch disabled");
            return DispatchOutcome::Disabled;
        }

        let mut state = self.state.lock().await;

        let now = self.clock.now();
        if let Err(blocked) = self.check(&state, now, trigger) {
            tracing::debug!(?trigger, ?blocked, %now, window = %self.window, "dispatch not permitted");
            return blocked;
        }

        if !sink.deliver(digest).await {
            tracing::warn!(?trigger, %now, "alert delivery failed; gate stays armed");
            return DispatchOutcome::DeliveryFailed;
        }

        // Record the date the send was confirmed, which can differ from the decision date
        // when a delivery straddles midnight.
        let date = self.clock.now().date();
        state.last_sent_date = Some(date);
        tracing::info!(?trigger, %date, entries = digest.entries.len(), "alert delivered");
        DispatchOutcome::Sent { date }
    }
}
