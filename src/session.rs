use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::{
    api::ShuttleSource,
    error::Result,
    refresh::{LoopState, RefreshLoop},
    structs::Campus,
    view::{SharedView, Ticket},
};

/// Owns the live view for whichever campus is selected: the initial stop +
/// shuttle load and the refresh loop that keeps shuttles current.
pub struct Session<P> {
    source: Arc<P>,
    view: SharedView,
    period: Duration,
    refresh: Option<RefreshLoop<P>>,
    loader: Option<JoinHandle<()>>,
}

impl<P: ShuttleSource + 'static> Session<P> {
    pub fn new(source: Arc<P>, campus: Campus, period: Duration) -> Self {
        Self {
            source,
            view: SharedView::new(campus),
            period,
            refresh: None,
            loader: None,
        }
    }

    pub fn view(&self) -> &SharedView {
        &self.view
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn campus(&self) -> Campus {
        self.view.lock().campus()
    }

    /// State of the live refresh loop, `None` once live updates are stopped.
    pub fn live_state(&self) -> Option<LoopState> {
        self.refresh.as_ref().map(RefreshLoop::state)
    }

    pub fn is_live(&self) -> bool {
        self.refresh.is_some()
    }

    /// Cancels everything bound to the current campus, clears the view and
    /// starts loading `campus`. Safe to call with the current campus to force
    /// a reload.
    pub fn select_campus(&mut self, campus: Campus) -> Result<()> {
        self.halt();

        let ticket = self.view.lock().set_campus(campus);
        self.view.notify();
        info!("Loading {campus}");

        let source = Arc::clone(&self.source);
        let view = self.view.clone();
        self.loader = Some(tokio::spawn(async move {
            load_campus(source.as_ref(), &view, ticket).await;
        }));

        let mut refresh = RefreshLoop::new(Arc::clone(&self.source), self.view.clone(), self.period);
        refresh.start(campus)?;
        self.refresh = Some(refresh);
        Ok(())
    }

    /// Restarts live updates for the current campus without touching the
    /// view. A no-op while live updates are running.
    pub fn resume_live(&mut self) -> Result<()> {
        if self.refresh.is_some() {
            return Ok(());
        }
        let campus = self.campus();
        let mut refresh = RefreshLoop::new(Arc::clone(&self.source), self.view.clone(), self.period);
        refresh.start(campus)?;
        self.refresh = Some(refresh);
        info!("Live updates resumed for {campus}");
        Ok(())
    }

    /// Stops live updates. The view keeps its last snapshot.
    pub fn stop_live(&mut self) {
        if let Some(mut refresh) = self.refresh.take() {
            refresh.stop();
            info!("Live updates stopped for {}", self.campus());
        }
    }

    fn halt(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        self.stop_live();
    }
}

impl<P> Drop for Session<P> {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
    }
}

/// Fetches stops and shuttles together and applies them as one snapshot.
/// Failures are logged and leave the view as it was.
pub async fn load_campus<P: ShuttleSource>(source: &P, view: &SharedView, ticket: Ticket) {
    let campus = ticket.campus;
    let (stops, shuttles) = tokio::join!(source.stops(campus), source.shuttles(campus));

    let (stops, shuttles) = match (stops, shuttles) {
        (Ok(stops), Ok(shuttles)) => (stops, shuttles),
        (Err(e), _) | (_, Err(e)) => {
            warn!("{campus}: initial load failed: {e}");
            return;
        }
    };

    let (n_stops, n_shuttles) = (stops.len(), shuttles.len());
    let applied = view.lock().apply_snapshot(ticket, stops, shuttles, Utc::now());
    match applied {
        Ok(()) => {
            view.notify();
            info!("{campus}: {n_stops} stops, {n_shuttles} shuttles");
        }
        Err(e) => debug!("{campus}: dropped initial load: {e}"),
    }
}
