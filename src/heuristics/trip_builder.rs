//! Sequential trip construction for one vehicle.
//!
//! The builder walks `AtDepot -> Serving(last) -> ... -> RouteClosed`. The
//! selection policy (which request to visit next) lives with the caller; the
//! builder only answers which candidates are reachable in time and, through
//! [`TripBuilder::budget_check`], whether a chosen request still fits in the
//! active trip.

use crate::evaluation::{self, EPS};
use crate::instance::{Instance, DEPOT};
use crate::solution::Trip;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    AtDepot,
    Serving { last: usize },
    RouteClosed,
}

/// Outcome of the budget check for a chosen next request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    ContinueSameTrip,
    CloseAndOpenNewTrip,
    /// Trip cap reached
    CloseAndStop,
}

pub struct TripBuilder<'a> {
    instance: &'a Instance,
    pub vehicle: usize,
    state: TripState,
    closed: Vec<Trip>,
    active: Vec<usize>,
    /// Distance from the depot to the last stop of the active trip
    distance: f64,
    departure: f64,
    /// Service start at the last stop
    clock: f64,
    /// Return time of the last closed trip
    ready: f64,
}

impl<'a> TripBuilder<'a> {
    pub fn new(instance: &'a Instance, vehicle: usize) -> Self {
        TripBuilder {
            instance,
            vehicle,
            state: TripState::AtDepot,
            closed: Vec::new(),
            active: Vec::new(),
            distance: 0.0,
            departure: 0.0,
            clock: 0.0,
            ready: 0.0,
        }
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == TripState::RouteClosed
    }

    /// Last visited node (the depot between trips)
    pub fn position(&self) -> usize {
        match self.state {
            TripState::Serving { last } => last,
            _ => DEPOT,
        }
    }

    /// Service start at `j` if it were visited next, with the departure
    /// time of the trip it would belong to.
    fn projected_start(&self, j: usize) -> (f64, f64) {
        let inst = self.instance;
        let request = inst.request(j);
        match self.state {
            TripState::Serving { last } => {
                let arrival = self.clock + inst.service_time(last) + inst.time(last, j);
                (self.departure, arrival.max(request.earliest))
            }
            _ => {
                let lead = inst.service_time(DEPOT) + inst.time(DEPOT, j);
                let departure = self.ready.max(request.earliest - lead);
                (departure, (departure + lead).max(request.earliest))
            }
        }
    }

    fn fits_duration(&self, departure: f64, start: f64, j: usize) -> bool {
        match self.instance.max_trip_duration {
            Some(limit) => {
                start + self.instance.service_time(j) + self.instance.time(j, DEPOT) - departure <= limit + EPS
            }
            None => true,
        }
    }

    /// Whether `j` can be visited next on time. From the depot the request
    /// must also fit a dedicated trip.
    pub fn reachable(&self, j: usize) -> bool {
        if self.is_closed() || self.instance.request(j).passengers > self.instance.vehicle_capacity {
            return false;
        }
        let (departure, start) = self.projected_start(j);
        if start > self.instance.request(j).latest + EPS {
            return false;
        }
        match self.state {
            TripState::AtDepot => {
                self.instance.round_trip_distance(j) <= self.instance.max_trip_distance + EPS
                    && self.fits_duration(departure, start, j)
            }
            _ => true,
        }
    }

    /// Requests of `remaining` reachable next
    pub fn candidates(&self, remaining: &[usize]) -> Vec<usize> {
        remaining.iter().copied().filter(|&j| self.reachable(j)).collect()
    }

    /// Whether serving `j` after the current stop leaves enough budget to
    /// return to the depot.
    pub fn budget_check(&self, j: usize) -> BudgetDecision {
        if let TripState::Serving { last } = self.state {
            let inst = self.instance;
            let projected = self.distance + inst.distance(last, j) + inst.distance(j, DEPOT);
            let (departure, start) = self.projected_start(j);
            if projected <= inst.max_trip_distance + EPS && self.fits_duration(departure, start, j) {
                return BudgetDecision::ContinueSameTrip;
            }
            if self.closed.len() + 1 < inst.max_trips {
                BudgetDecision::CloseAndOpenNewTrip
            } else {
                BudgetDecision::CloseAndStop
            }
        } else if self.is_closed() {
            BudgetDecision::CloseAndStop
        } else {
            BudgetDecision::ContinueSameTrip
        }
    }

    /// Append `j` to the active trip, opening one if at the depot.
    pub fn visit(&mut self, j: usize) {
        let (departure, start) = self.projected_start(j);
        if self.state == TripState::AtDepot {
            self.departure = departure;
        }
        self.distance += self.instance.distance(self.position(), j);
        self.clock = start;
        self.active.push(j);
        self.state = TripState::Serving { last: j };
    }

    /// Return to the depot. Reaching the trip cap closes the route.
    pub fn close_trip(&mut self) {
        if !self.active.is_empty() {
            let trip = evaluation::time_trip(self.instance, &self.active, self.ready);
            self.ready = trip.return_time;
            self.closed.push(trip);
            self.active.clear();
            self.distance = 0.0;
        }
        self.state = if self.closed.len() >= self.instance.max_trips {
            TripState::RouteClosed
        } else {
            TripState::AtDepot
        };
    }

    /// Close the active trip and the route
    pub fn stop(&mut self) {
        self.close_trip();
        self.state = TripState::RouteClosed;
    }

    /// Close everything and hand back the trips
    pub fn finish(mut self) -> Vec<Trip> {
        self.stop();
        self.closed
    }
}
