//! Recurring "advance simulation, then re-fetch shuttles" task for one campus.
//!
//! `Idle -> Scheduled -> Firing -> Scheduled -> ... -> Cancelled`. Ticks run
//! one after another inside a single spawned task, so two ticks never write
//! to the view concurrently; an overdue tick is skipped rather than queued.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    api::ShuttleSource,
    error::{Error, Result},
    structs::Campus,
    view::SharedView,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scheduled,
    Firing,
    Cancelled,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Scheduled => "scheduled",
            LoopState::Firing => "firing",
            LoopState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What became of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// Shuttle list written to the view; holds the number of shuttles.
    Applied(usize),
    /// Simulate or fetch failed; the view was left untouched.
    Failed(Error),
    /// Result arrived too late to be used.
    Stale(Error),
}

type SharedState = Arc<Mutex<LoopState>>;

fn lock(state: &Mutex<LoopState>) -> MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RefreshLoop<P> {
    source: Arc<P>,
    view: SharedView,
    period: Duration,
    state: SharedState,
    task: Option<JoinHandle<()>>,
}

impl<P: ShuttleSource + 'static> RefreshLoop<P> {
    pub fn new(source: Arc<P>, view: SharedView, period: Duration) -> Self {
        Self {
            source,
            view,
            period,
            state: Arc::new(Mutex::new(LoopState::Idle)),
            task: None,
        }
    }

    pub fn state(&self) -> LoopState {
        *lock(&self.state)
    }

    /// Schedules the first tick one period from now. A loop starts at most
    /// once; campus changes get a fresh loop.
    pub fn start(&mut self, campus: Campus) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if *state != LoopState::Idle {
                return Err(Error::AlreadyStarted(*state));
            }
            *state = LoopState::Scheduled;
        }

        let source = Arc::clone(&self.source);
        let view = self.view.clone();
        let state = Arc::clone(&self.state);
        let period = self.period;

        info!("Refreshing {campus} shuttles every {period:?}");
        self.task = Some(tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                match fire(source.as_ref(), &view, &state, campus).await {
                    TickOutcome::Applied(n) => debug!("{campus}: applied {n} shuttles"),
                    TickOutcome::Failed(e) => warn!("{campus}: refresh skipped: {e}"),
                    TickOutcome::Stale(e) => {
                        debug!("{campus}: dropped tick: {e}");
                        if *lock(&state) == LoopState::Cancelled {
                            break;
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    /// Cancels the loop. Once this returns no tick can write to the view,
    /// even one whose requests are still in flight.
    pub fn stop(&mut self) {
        let previous = std::mem::replace(&mut *lock(&self.state), LoopState::Cancelled);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if previous != LoopState::Cancelled {
            debug!("Refresh loop cancelled (was {previous})");
        }
    }
}

impl<P> Drop for RefreshLoop<P> {
    fn drop(&mut self) {
        *lock(&self.state) = LoopState::Cancelled;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One tick: advance the simulation, fetch shuttles, and write them back if
/// the loop is still live. The write happens under the state lock, which is
/// the same lock `stop()` takes to cancel.
pub async fn fire<P: ShuttleSource>(
    source: &P,
    view: &SharedView,
    state: &Mutex<LoopState>,
    campus: Campus,
) -> TickOutcome {
    let ticket = {
        let mut state = lock(state);
        if *state == LoopState::Cancelled {
            return TickOutcome::Stale(Error::StaleResult("loop cancelled before firing".to_string()));
        }
        *state = LoopState::Firing;
        view.lock().begin_fetch(campus)
    };

    let result = async {
        source.simulate(campus).await?;
        source.shuttles(campus).await
    }
    .await;

    let mut state = lock(state);
    if *state == LoopState::Cancelled {
        return TickOutcome::Stale(Error::StaleResult(format!(
            "tick #{} resolved after cancellation",
            ticket.seq
        )));
    }
    *state = LoopState::Scheduled;

    let shuttles = match result {
        Ok(shuttles) => shuttles,
        Err(e) => return TickOutcome::Failed(e),
    };
    let count = shuttles.len();
    let applied = view.lock().apply_shuttles(ticket, shuttles, Utc::now());
    match applied {
        Ok(()) => {
            view.notify();
            TickOutcome::Applied(count)
        }
        Err(e) => TickOutcome::Stale(e),
    }
}
