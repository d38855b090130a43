//! Problem instance for the multi-trip Dial-a-Ride problem with time windows.
//!
//! Node 0 is the depot (the bus garage); node `i` for `i in 1..=n` is request
//! `i`, a coupled collection at a gate and drop at an aircraft stand that is
//! routed as a single stop. Distance and travel-time matrices are indexed by
//! node and are `(n + 1) x (n + 1)`.
//!
//! An [`Instance`] is immutable once built and shared read-only by every
//! search component.

use crate::error::InstanceError;
use serde::{Deserialize, Serialize};

/// Index of the depot node in every matrix.
pub const DEPOT: usize = 0;

/// A transport request (one routed stop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request identifier, equal to its node index (1-based)
    pub id: usize,
    /// Collection point (boarding gate) identifier
    pub pickup: usize,
    /// Drop point (aircraft stand) identifier
    pub delivery: usize,
    /// Earliest service start
    pub earliest: f64,
    /// Latest service start
    pub latest: f64,
    /// Service duration at the stop
    pub service_time: f64,
    /// Number of passengers carried
    pub passengers: u32,
}

impl Request {
    pub fn new(id: usize, earliest: f64, latest: f64, service_time: f64, passengers: u32) -> Self {
        Request {
            id,
            pickup: id,
            delivery: id,
            earliest,
            latest,
            service_time,
            passengers,
        }
    }

    /// Width of the time window
    pub fn window_width(&self) -> f64 {
        self.latest - self.earliest
    }
}

/// A complete instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Name of the instance
    pub name: String,
    /// Requests, `requests[i - 1].id == i`
    pub requests: Vec<Request>,
    /// Fleet size K
    pub num_vehicles: usize,
    /// Maximum number of trips per vehicle (r)
    pub max_trips: usize,
    /// Maximum travel distance of a single trip (Dmax)
    pub max_trip_distance: f64,
    /// Optional maximum duration of a single trip, departure to return
    #[serde(default)]
    pub max_trip_duration: Option<f64>,
    /// Passenger capacity of every vehicle
    pub vehicle_capacity: u32,
    /// Service time spent at the depot before each departure
    #[serde(default)]
    pub depot_service_time: f64,
    /// Symmetric distance matrix over {depot} ∪ requests
    pub distance_matrix: Vec<Vec<f64>>,
    /// Travel-time matrix over {depot} ∪ requests
    pub travel_time: Vec<Vec<f64>>,
}

impl Instance {
    /// Build and validate an instance from explicit matrices.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        requests: Vec<Request>,
        num_vehicles: usize,
        max_trips: usize,
        max_trip_distance: f64,
        vehicle_capacity: u32,
        distance_matrix: Vec<Vec<f64>>,
        travel_time: Vec<Vec<f64>>,
    ) -> Result<Self, InstanceError> {
        let instance = Instance {
            name: name.to_string(),
            requests,
            num_vehicles,
            max_trips,
            max_trip_distance,
            max_trip_duration: None,
            vehicle_capacity,
            depot_service_time: 0.0,
            distance_matrix,
            travel_time,
        };
        instance.validate()?;
        Ok(instance)
    }

    /// Set the optional per-trip duration gate.
    pub fn with_max_trip_duration(mut self, duration: Option<f64>) -> Self {
        self.max_trip_duration = duration;
        self
    }

    /// Set the depot service time applied before each departure.
    pub fn with_depot_service_time(mut self, service_time: f64) -> Self {
        self.depot_service_time = service_time;
        self
    }

    /// Check structural consistency. Instances deserialized from JSON should
    /// be passed through this before solving.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.requests.is_empty() {
            return Err(InstanceError::NoRequests);
        }
        if self.num_vehicles == 0 {
            return Err(InstanceError::NoVehicles);
        }
        if self.max_trips == 0 {
            return Err(InstanceError::NoTrips);
        }
        if !(self.max_trip_distance > 0.0) {
            return Err(InstanceError::NonPositiveDistanceBudget(self.max_trip_distance));
        }

        for (position, request) in self.requests.iter().enumerate() {
            if request.id != position + 1 {
                return Err(InstanceError::RequestIdMismatch { position, id: request.id });
            }
            if request.earliest > request.latest {
                return Err(InstanceError::InvertedWindow {
                    request: request.id,
                    earliest: request.earliest,
                    latest: request.latest,
                });
            }
            if request.service_time < 0.0 {
                return Err(InstanceError::NegativeServiceTime { request: request.id });
            }
        }

        let dim = self.dimension();
        for (label, matrix) in [("distance", &self.distance_matrix), ("travel time", &self.travel_time)] {
            if matrix.len() != dim {
                return Err(InstanceError::MatrixDimension { matrix: label, expected: dim, found: matrix.len() });
            }
            for (i, row) in matrix.iter().enumerate() {
                if row.len() != dim {
                    return Err(InstanceError::MatrixDimension { matrix: label, expected: dim, found: row.len() });
                }
                if let Some(j) = row.iter().position(|&v| v < 0.0) {
                    return Err(InstanceError::NegativeEntry { matrix: label, from: i, to: j });
                }
            }
        }

        Ok(())
    }

    /// Number of nodes including the depot
    #[inline]
    pub fn dimension(&self) -> usize {
        self.requests.len() + 1
    }

    /// Number of requests n
    #[inline]
    pub fn num_requests(&self) -> usize {
        self.requests.len()
    }

    /// Request ids `1..=n`
    pub fn request_ids(&self) -> impl Iterator<Item = usize> {
        1..=self.requests.len()
    }

    /// Get a request by id (1-based)
    #[inline]
    pub fn request(&self, id: usize) -> &Request {
        &self.requests[id - 1]
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance_matrix[i][j]
    }

    #[inline]
    pub fn time(&self, i: usize, j: usize) -> f64 {
        self.travel_time[i][j]
    }

    /// Service time at a node (depot included)
    #[inline]
    pub fn service_time(&self, node: usize) -> f64 {
        if node == DEPOT {
            self.depot_service_time
        } else {
            self.requests[node - 1].service_time
        }
    }

    /// Distance of the trip depot -> request -> depot
    pub fn round_trip_distance(&self, id: usize) -> f64 {
        self.distance(DEPOT, id) + self.distance(id, DEPOT)
    }

    /// Whether `j` can directly follow `i` without breaking `j`'s window,
    /// assuming `i` is served as early as possible.
    pub fn can_follow(&self, i: usize, j: usize) -> bool {
        if i == DEPOT || j == DEPOT {
            return true;
        }
        let ri = self.request(i);
        self.request(j).latest >= ri.earliest + ri.service_time + self.time(i, j)
    }

    /// Whether a request can be served at all: fits in a vehicle and a
    /// dedicated trip leaving at time zero meets its window and budgets.
    pub fn is_admissible(&self, id: usize) -> bool {
        let request = self.request(id);
        if request.passengers > self.vehicle_capacity {
            return false;
        }
        if self.round_trip_distance(id) > self.max_trip_distance {
            return false;
        }
        let lead = self.depot_service_time + self.time(DEPOT, id);
        let departure = (request.earliest - lead).max(0.0);
        let start = (departure + lead).max(request.earliest);
        if start > request.latest {
            return false;
        }
        match self.max_trip_duration {
            Some(limit) => start + request.service_time + self.time(id, DEPOT) - departure <= limit,
            None => true,
        }
    }

    /// Total cost of a sequence of nodes (no implicit depot edges)
    pub fn path_distance(&self, path: &[usize]) -> f64 {
        path.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.num_requests();
        let total_passengers: u32 = self.requests.iter().map(|r| r.passengers).sum();
        let widths: Vec<f64> = self.requests.iter().map(Request::window_width).collect();
        let avg_window = widths.iter().sum::<f64>() / n as f64;
        let min_window = widths.iter().cloned().fold(f64::INFINITY, f64::min);

        let mut distances: Vec<f64> = Vec::new();
        for i in 0..self.dimension() {
            for j in i + 1..self.dimension() {
                distances.push(self.distance(i, j));
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);

        let horizon_start = self.requests.iter().map(|r| r.earliest).fold(f64::INFINITY, f64::min);
        let horizon_end = self.requests.iter().map(|r| r.latest).fold(f64::NEG_INFINITY, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            num_requests: n,
            num_vehicles: self.num_vehicles,
            max_trips: self.max_trips,
            max_trip_distance: self.max_trip_distance,
            vehicle_capacity: self.vehicle_capacity,
            total_passengers,
            avg_window,
            min_window,
            horizon: (horizon_start, horizon_end),
            avg_distance,
            max_distance,
            inadmissible: self.request_ids().filter(|&id| !self.is_admissible(id)).collect(),
        }
    }
}

/// Convenience builder for Euclidean instances (tests, demos).
///
/// Travel time is distance divided by `speed`.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    name: String,
    depot: (f64, f64),
    depot_service_time: f64,
    stops: Vec<(f64, f64)>,
    requests: Vec<Request>,
    num_vehicles: usize,
    max_trips: usize,
    max_trip_distance: f64,
    max_trip_duration: Option<f64>,
    vehicle_capacity: u32,
    speed: f64,
}

impl InstanceBuilder {
    pub fn new(name: &str) -> Self {
        InstanceBuilder {
            name: name.to_string(),
            depot: (0.0, 0.0),
            depot_service_time: 0.0,
            stops: Vec::new(),
            requests: Vec::new(),
            num_vehicles: 1,
            max_trips: 1,
            max_trip_distance: f64::MAX,
            max_trip_duration: None,
            vehicle_capacity: u32::MAX,
            speed: 1.0,
        }
    }

    pub fn depot(mut self, x: f64, y: f64) -> Self {
        self.depot = (x, y);
        self
    }

    pub fn depot_service_time(mut self, service_time: f64) -> Self {
        self.depot_service_time = service_time;
        self
    }

    /// Add a request located at `(x, y)`; its id is the next free index.
    pub fn request(mut self, x: f64, y: f64, earliest: f64, latest: f64, service_time: f64) -> Self {
        let id = self.requests.len() + 1;
        self.stops.push((x, y));
        self.requests.push(Request::new(id, earliest, latest, service_time, 1));
        self
    }

    /// Set the passenger count of the most recently added request.
    pub fn passengers(mut self, passengers: u32) -> Self {
        if let Some(last) = self.requests.last_mut() {
            last.passengers = passengers;
        }
        self
    }

    pub fn vehicles(mut self, count: usize) -> Self {
        self.num_vehicles = count;
        self
    }

    pub fn max_trips(mut self, trips: usize) -> Self {
        self.max_trips = trips;
        self
    }

    pub fn max_trip_distance(mut self, distance: f64) -> Self {
        self.max_trip_distance = distance;
        self
    }

    pub fn max_trip_duration(mut self, duration: f64) -> Self {
        self.max_trip_duration = Some(duration);
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.vehicle_capacity = capacity;
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn build(self) -> Result<Instance, InstanceError> {
        let mut points = Vec::with_capacity(self.stops.len() + 1);
        points.push(self.depot);
        points.extend(self.stops.iter().copied());

        let distance_matrix = compute_distance_matrix(&points);
        let travel_time = distance_matrix
            .iter()
            .map(|row| row.iter().map(|d| d / self.speed).collect())
            .collect();

        Instance::new(
            &self.name,
            self.requests,
            self.num_vehicles,
            self.max_trips,
            self.max_trip_distance,
            self.vehicle_capacity,
            distance_matrix,
            travel_time,
        )
        .map(|instance| {
            instance
                .with_max_trip_duration(self.max_trip_duration)
                .with_depot_service_time(self.depot_service_time)
        })
    }
}

fn compute_distance_matrix(points: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i + 1..n {
            let dx = points[i].0 - points[j].0;
            let dy = points[i].1 - points[j].1;
            let dist = (dx * dx + dy * dy).sqrt();
            matrix[i][j] = dist;
            matrix[j][i] = dist;
        }
    }

    matrix
}

/// Statistics about an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_requests: usize,
    pub num_vehicles: usize,
    pub max_trips: usize,
    pub max_trip_distance: f64,
    pub vehicle_capacity: u32,
    pub total_passengers: u32,
    pub avg_window: f64,
    pub min_window: f64,
    pub horizon: (f64, f64),
    pub avg_distance: f64,
    pub max_distance: f64,
    /// Requests no vehicle can serve even on a dedicated trip
    pub inadmissible: Vec<usize>,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Requests: {}", self.num_requests)?;
        writeln!(f, "  Fleet: {} vehicles x {} trips", self.num_vehicles, self.max_trips)?;
        writeln!(f, "  Trip distance budget: {:.2}", self.max_trip_distance)?;
        writeln!(f, "  Vehicle capacity: {}", self.vehicle_capacity)?;
        writeln!(f, "  Total passengers: {}", self.total_passengers)?;
        writeln!(f, "  Window width: avg {:.2}, min {:.2}", self.avg_window, self.min_window)?;
        writeln!(f, "  Horizon: [{:.2}, {:.2}]", self.horizon.0, self.horizon.1)?;
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        writeln!(f, "  Max distance: {:.2}", self.max_distance)?;
        if self.inadmissible.is_empty() {
            writeln!(f, "  Inadmissible requests: none")
        } else {
            writeln!(f, "  Inadmissible requests: {:?}", self.inadmissible)
        }
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Instance({}, n={}, K={}, r={}, Dmax={:.1})",
            self.name,
            self.num_requests(),
            self.num_vehicles,
            self.max_trips,
            self.max_trip_distance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_instance() -> Instance {
        InstanceBuilder::new("line")
            .request(3.0, 4.0, 0.0, 100.0, 1.0)
            .request(6.0, 8.0, 10.0, 20.0, 1.0)
            .vehicles(2)
            .max_trips(2)
            .max_trip_distance(50.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_distance_calculation() {
        let instance = line_instance();
        assert!((instance.distance(0, 1) - 5.0).abs() < 1e-10);
        assert!((instance.distance(1, 0) - 5.0).abs() < 1e-10);
        assert!((instance.distance(1, 2) - 5.0).abs() < 1e-10);
        assert!((instance.round_trip_distance(2) - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_window_compatibility() {
        let instance = line_instance();
        // 0 + 1 + 5 <= 20
        assert!(instance.can_follow(1, 2));
        // 10 + 1 + 5 <= 100
        assert!(instance.can_follow(2, 1));
        assert!(instance.can_follow(DEPOT, 2));
    }

    #[test]
    fn test_admissibility() {
        let instance = InstanceBuilder::new("adm")
            .request(10.0, 0.0, 0.0, 5.0, 0.0) // unreachable before window closes
            .request(1.0, 0.0, 0.0, 5.0, 0.0)
            .request(1.0, 0.0, 0.0, 5.0, 0.0)
            .passengers(40)
            .capacity(30)
            .build()
            .unwrap();

        assert!(!instance.is_admissible(1));
        assert!(instance.is_admissible(2));
        assert!(!instance.is_admissible(3));
        assert_eq!(instance.statistics().inadmissible, vec![1, 3]);
    }

    #[test]
    fn test_validation_errors() {
        let err = InstanceBuilder::new("bad")
            .request(1.0, 0.0, 10.0, 5.0, 0.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, InstanceError::InvertedWindow { request: 1, .. }));

        let err = InstanceBuilder::new("empty").build().unwrap_err();
        assert_eq!(err, InstanceError::NoRequests);

        let err = Instance::new("dims", vec![Request::new(1, 0.0, 1.0, 0.0, 1)], 1, 1, 10.0, 1, vec![vec![0.0]], vec![vec![0.0]])
            .unwrap_err();
        assert!(matches!(err, InstanceError::MatrixDimension { expected: 2, .. }));
    }
}
