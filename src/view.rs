use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    geo::haversine_km,
    projector::{compute_extent, Canvas, Extent, ProjectedPoint},
    structs::{Campus, Georeferenced, Shuttle, Stop},
};

/// Issued before a fetch starts and presented again when its result is
/// written back. A ticket is only honoured while the view is still on the
/// same campus generation and nothing newer has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub campus: Campus,
    pub generation: u64,
    pub seq: u64,
}

/// Stops and shuttles for the selected campus.
#[derive(Debug, Clone)]
pub struct ViewModel {
    campus: Campus,
    stops: Vec<Stop>,
    shuttles: Vec<Shuttle>,
    last_updated: Option<DateTime<Utc>>,
    generation: u64,
    next_seq: u64,
    stops_seq: u64,
    shuttles_seq: u64,
}

/// Two views are equal when they would render the same; ticket bookkeeping
/// is ignored.
impl PartialEq for ViewModel {
    fn eq(&self, other: &Self) -> bool {
        self.campus == other.campus
            && self.stops == other.stops
            && self.shuttles == other.shuttles
            && self.last_updated == other.last_updated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedStop {
    pub code: String,
    pub name: String,
    pub point: ProjectedPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedShuttle {
    pub id: String,
    pub identifier: String,
    pub point: ProjectedPoint,
}

/// Distance from the anchor stop to one shuttle; `None` when the shuttle has no fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceEntry {
    pub identifier: String,
    pub distance_km: Option<f64>,
}

/// Everything the renderer needs for one draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub campus: Campus,
    pub extent: Extent,
    pub stops: Vec<ProjectedStop>,
    pub shuttles: Vec<ProjectedShuttle>,
    pub distances: Vec<DistanceEntry>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ViewModel {
    pub fn new(campus: Campus) -> Self {
        Self {
            campus,
            stops: vec![],
            shuttles: vec![],
            last_updated: None,
            generation: 0,
            next_seq: 1,
            stops_seq: 0,
            shuttles_seq: 0,
        }
    }

    pub fn campus(&self) -> Campus {
        self.campus
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn shuttles(&self) -> &[Shuttle] {
        &self.shuttles
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Switches campus and clears both collections straight away, so data
    /// from the previous campus is never shown next to the new one. Returns
    /// the ticket for the initial load.
    pub fn set_campus(&mut self, campus: Campus) -> Ticket {
        self.campus = campus;
        self.generation += 1;
        self.stops.clear();
        self.shuttles.clear();
        self.last_updated = None;
        self.stops_seq = 0;
        self.shuttles_seq = 0;
        self.begin_fetch(campus)
    }

    /// Hands out the ticket for a fetch about to be initiated for `campus`.
    pub fn begin_fetch(&mut self, campus: Campus) -> Ticket {
        let seq = self.next_seq;
        self.next_seq += 1;
        Ticket {
            campus,
            generation: self.generation,
            seq,
        }
    }

    pub fn replace_stops(&mut self, stops: Vec<Stop>) {
        self.stops = stops;
    }

    pub fn replace_shuttles(&mut self, shuttles: Vec<Shuttle>) {
        self.shuttles = shuttles;
    }

    fn check_campus(&self, ticket: Ticket) -> Result<()> {
        if ticket.generation != self.generation || ticket.campus != self.campus {
            return Err(Error::StaleResult(format!(
                "fetch #{} for {} outlived a campus change (now {})",
                ticket.seq, ticket.campus, self.campus
            )));
        }
        Ok(())
    }

    fn superseded(ticket: Ticket, applied: u64) -> Error {
        Error::StaleResult(format!("fetch #{} superseded by #{applied}", ticket.seq))
    }

    /// Applies the initial stop + shuttle snapshot for a campus.
    ///
    /// Stops and shuttles are sequenced separately: refresh ticks only ever
    /// supersede the shuttle half, so the stop set lands whenever the initial
    /// load resolves. Fails only when neither half is newer than what the
    /// view already holds.
    pub fn apply_snapshot(
        &mut self,
        ticket: Ticket,
        stops: Vec<Stop>,
        shuttles: Vec<Shuttle>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check_campus(ticket)?;
        let fresh_stops = ticket.seq > self.stops_seq;
        let fresh_shuttles = ticket.seq > self.shuttles_seq;
        if !fresh_stops && !fresh_shuttles {
            return Err(Self::superseded(ticket, self.stops_seq.max(self.shuttles_seq)));
        }

        if fresh_stops {
            self.replace_stops(stops);
            self.stops_seq = ticket.seq;
        }
        if fresh_shuttles {
            self.replace_shuttles(shuttles);
            self.shuttles_seq = ticket.seq;
            self.last_updated = Some(at);
        }
        if self.last_updated.is_none() {
            self.last_updated = Some(at);
        }
        Ok(())
    }

    /// Applies a refreshed shuttle list. Stops are left as they are.
    pub fn apply_shuttles(&mut self, ticket: Ticket, shuttles: Vec<Shuttle>, at: DateTime<Utc>) -> Result<()> {
        self.check_campus(ticket)?;
        if ticket.seq <= self.shuttles_seq {
            return Err(Self::superseded(ticket, self.shuttles_seq));
        }
        self.replace_shuttles(shuttles);
        self.shuttles_seq = ticket.seq;
        self.last_updated = Some(at);
        Ok(())
    }

    /// Extent of the current stops. Shuttles never widen it.
    pub fn extent(&self) -> Extent {
        compute_extent(&self.stops)
    }

    /// Nothing is projected until there are stops to bound the map.
    pub fn projected_stops(&self, canvas: &Canvas) -> Vec<ProjectedStop> {
        if self.stops.is_empty() {
            return vec![];
        }
        let extent = self.extent();
        self.stops
            .iter()
            .filter_map(|stop| {
                stop.geo_point().map(|p| ProjectedStop {
                    code: stop.code.clone(),
                    name: stop.name.clone(),
                    point: canvas.project(p, &extent),
                })
            })
            .collect()
    }

    pub fn projected_shuttles(&self, canvas: &Canvas) -> Vec<ProjectedShuttle> {
        if self.stops.is_empty() {
            return vec![];
        }
        let extent = self.extent();
        self.shuttles
            .iter()
            .filter_map(|shuttle| {
                shuttle.geo_point().map(|p| ProjectedShuttle {
                    id: shuttle.id.clone(),
                    identifier: shuttle.identifier.clone(),
                    point: canvas.project(p, &extent),
                })
            })
            .collect()
    }

    /// Distances from the first stop to the first `limit` shuttles, in list
    /// order. Empty when there are no stops.
    pub fn nearest_distances(&self, limit: usize) -> Vec<DistanceEntry> {
        let Some(anchor) = self.stops.first() else {
            return vec![];
        };

        self.shuttles
            .iter()
            .take(limit)
            .map(|shuttle| DistanceEntry {
                identifier: shuttle.identifier.clone(),
                distance_km: shuttle
                    .geo_point()
                    .map(|p| haversine_km(anchor.latitude, anchor.longitude, p.lat, p.lon)),
            })
            .collect()
    }

    pub fn frame(&self, canvas: &Canvas, distance_limit: usize) -> Frame {
        Frame {
            campus: self.campus,
            extent: self.extent(),
            stops: self.projected_stops(canvas),
            shuttles: self.projected_shuttles(canvas),
            distances: self.nearest_distances(distance_limit),
            last_updated: self.last_updated,
        }
    }
}

/// The view shared between the front-end, the initial loader and the
/// refresh loop. Every successful write bumps a change counter that renderers
/// can wait on.
#[derive(Clone)]
pub struct SharedView {
    inner: Arc<Mutex<ViewModel>>,
    changes: Arc<watch::Sender<u64>>,
}

impl SharedView {
    pub fn new(campus: Campus) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(ViewModel::new(campus))),
            changes: Arc::new(tx),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ViewModel> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn notify(&self) {
        self.changes.send_modify(|n| *n += 1);
    }

    pub fn snapshot(&self) -> ViewModel {
        self.lock().clone()
    }
}
