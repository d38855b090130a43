//! Pheromone state of one ant-colony run.
//!
//! Two matrices: assignment pheromone over `(request, vehicle)` and routing
//! pheromone over `(node, node)`. Ants never write to the shared model while
//! an iteration runs. Each ant records its local updates in a [`LocalTrail`]
//! and reads through it; trails are merged at the iteration barrier. A cell
//! hit `c` times in total becomes `tau (1 - xi)^c + tau0 (1 - (1 - xi)^c)`,
//! capped at its current value so a choice never gains pheromone locally.
//! The result does not depend on the order of the hits.

use crate::instance::{Instance, DEPOT};
use crate::solution::{PheromoneSnapshot, Solution};
use std::collections::HashMap;

/// Lower bound applied after every global update
pub const TAU_MIN: f64 = 1e-12;

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq)]
pub struct PheromoneMatrix {
    cols: usize,
    cells: Vec<f64>,
}

impl PheromoneMatrix {
    pub fn new(rows: usize, cols: usize, value: f64) -> Self {
        PheromoneMatrix { cols, cells: vec![value; rows * cols] }
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[self.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let idx = self.index(row, col);
        self.cells[idx] = value;
    }

    fn scale(&mut self, factor: f64) {
        for cell in self.cells.iter_mut() {
            *cell = (*cell * factor).max(TAU_MIN);
        }
    }

    fn to_rows(&self) -> Vec<Vec<f64>> {
        self.cells.chunks(self.cols.max(1)).map(|row| row.to_vec()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Assignment,
    Routing,
}

/// Local updates of one ant, applied on read and merged at the barrier
#[derive(Debug, Clone, Default)]
pub struct LocalTrail {
    hits: HashMap<(Layer, usize), u32>,
}

impl LocalTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self, layer: Layer, index: usize) -> u32 {
        self.hits.get(&(layer, index)).copied().unwrap_or(0)
    }

    pub fn record(&mut self, layer: Layer, index: usize) {
        *self.hits.entry((layer, index)).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Both pheromone matrices plus the parameters of the local rule
#[derive(Debug, Clone)]
pub struct PheromoneModel {
    pub assignment: PheromoneMatrix,
    pub routing: PheromoneMatrix,
    pub tau0: f64,
    /// Local decay (xi)
    pub local_decay: f64,
}

impl PheromoneModel {
    /// Uniform `tau0` everywhere except routing cells between requests that
    /// cannot follow each other, which start at the floor.
    pub fn new(instance: &Instance, tau0: f64, local_decay: f64) -> Self {
        let dim = instance.dimension();
        let assignment = PheromoneMatrix::new(dim, instance.num_vehicles, tau0);
        let mut routing = PheromoneMatrix::new(dim, dim, tau0);
        for i in 0..dim {
            for j in 0..dim {
                if i == j || !instance.can_follow(i, j) {
                    routing.set(i, j, TAU_MIN);
                }
            }
        }
        PheromoneModel { assignment, routing, tau0, local_decay }
    }

    fn locally_decayed(&self, base: f64, hits: u32) -> f64 {
        if hits == 0 {
            return base;
        }
        let keep = (1.0 - self.local_decay).powi(hits as i32);
        (base * keep + self.tau0 * (1.0 - keep)).min(base)
    }

    /// Assignment pheromone as seen by an ant
    pub fn assignment_value(&self, request: usize, vehicle: usize, trail: &LocalTrail) -> f64 {
        let idx = self.assignment.index(request, vehicle);
        self.locally_decayed(self.assignment.cells[idx], trail.hits(Layer::Assignment, idx))
    }

    /// Routing pheromone as seen by an ant
    pub fn routing_value(&self, from: usize, to: usize, trail: &LocalTrail) -> f64 {
        let idx = self.routing.index(from, to);
        self.locally_decayed(self.routing.cells[idx], trail.hits(Layer::Routing, idx))
    }

    pub fn touch_assignment(&self, trail: &mut LocalTrail, request: usize, vehicle: usize) {
        trail.record(Layer::Assignment, self.assignment.index(request, vehicle));
    }

    pub fn touch_routing(&self, trail: &mut LocalTrail, from: usize, to: usize) {
        trail.record(Layer::Routing, self.routing.index(from, to));
    }

    /// Fold the local updates of every ant of an iteration into the model
    pub fn merge(&mut self, trails: &[LocalTrail]) {
        let mut totals: HashMap<(Layer, usize), u32> = HashMap::new();
        for trail in trails {
            for (&key, &count) in &trail.hits {
                *totals.entry(key).or_insert(0) += count;
            }
        }
        for ((layer, idx), hits) in totals {
            let matrix = match layer {
                Layer::Assignment => &self.assignment,
                Layer::Routing => &self.routing,
            };
            let value = self.locally_decayed(matrix.cells[idx], hits);
            match layer {
                Layer::Assignment => self.assignment.cells[idx] = value,
                Layer::Routing => self.routing.cells[idx] = value,
            }
        }
    }

    /// Multiply every cell by `1 - rho`
    pub fn evaporate(&mut self, rho: f64) {
        self.assignment.scale(1.0 - rho);
        self.routing.scale(1.0 - rho);
    }

    /// Add `amount` along the assignments and edges a solution uses
    pub fn reinforce(&mut self, solution: &Solution, amount: f64) {
        self.for_each_choice(solution, |cell| *cell += amount);
    }

    /// Multiply the cells a solution uses by `factor`
    pub fn attenuate(&mut self, solution: &Solution, factor: f64) {
        self.for_each_choice(solution, |cell| *cell = (*cell * factor).max(TAU_MIN));
    }

    fn for_each_choice(&mut self, solution: &Solution, mut update: impl FnMut(&mut f64)) {
        for route in &solution.routes {
            for trip in &route.trips {
                let mut prev = DEPOT;
                for &r in &trip.requests {
                    let a = self.assignment.index(r, route.vehicle);
                    update(&mut self.assignment.cells[a]);
                    let e = self.routing.index(prev, r);
                    update(&mut self.routing.cells[e]);
                    prev = r;
                }
                let e = self.routing.index(prev, DEPOT);
                update(&mut self.routing.cells[e]);
            }
        }
    }

    pub fn snapshot(&self) -> PheromoneSnapshot {
        PheromoneSnapshot {
            assignment: self.assignment.to_rows(),
            routing: self.routing.to_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;

    fn instance() -> Instance {
        InstanceBuilder::new("p")
            .request(1.0, 0.0, 0.0, 5.0, 0.0)
            .request(2.0, 0.0, 50.0, 60.0, 0.0)
            .vehicles(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_incompatible_edges_start_at_floor() {
        let model = PheromoneModel::new(&instance(), 0.5, 0.1);
        let trail = LocalTrail::new();
        // 2 opens at 50, 1 closes at 5
        assert_eq!(model.routing_value(2, 1, &trail), TAU_MIN);
        assert_eq!(model.routing_value(1, 2, &trail), 0.5);
        assert_eq!(model.routing_value(1, 1, &trail), TAU_MIN);
        assert_eq!(model.assignment_value(1, 1, &trail), 0.5);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let inst = instance();
        let mut base = PheromoneModel::new(&inst, 1.0, 0.2);
        base.assignment.set(1, 0, 3.0);

        let mut a = LocalTrail::new();
        base.touch_assignment(&mut a, 1, 0);
        base.touch_assignment(&mut a, 1, 0);
        let mut b = LocalTrail::new();
        base.touch_assignment(&mut b, 1, 0);

        // the ant sees its own two hits
        let seen = base.assignment_value(1, 0, &a);
        assert!((seen - (3.0 * 0.64 + 1.0 * 0.36)).abs() < 1e-12);

        let mut ab = base.clone();
        ab.merge(&[a.clone(), b.clone()]);
        let mut ba = base.clone();
        ba.merge(&[b, a]);
        assert_eq!(ab.assignment, ba.assignment);
        let expected = 3.0 * 0.8f64.powi(3) + (1.0 - 0.8f64.powi(3));
        assert!((ab.assignment.get(1, 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_local_update_never_raises_evaporated_cell() {
        let inst = instance();
        let mut model = PheromoneModel::new(&inst, 1.0, 0.1);
        model.evaporate(0.5);
        let before = model.assignment.get(1, 0);
        assert!(before < model.tau0);

        let mut trail = LocalTrail::new();
        model.touch_assignment(&mut trail, 1, 0);
        model.touch_routing(&mut trail, 1, 2);
        assert!(model.assignment_value(1, 0, &trail) <= before);

        let edge_before = model.routing.get(1, 2);
        model.merge(&[trail]);
        assert!(model.assignment.get(1, 0) <= before);
        assert!(model.routing.get(1, 2) <= edge_before);
        // untouched cells keep their value
        assert_eq!(model.assignment.get(1, 1), before);
    }

    #[test]
    fn test_global_update() {
        let inst = instance();
        let mut model = PheromoneModel::new(&inst, 1.0, 0.1);
        let solution = Solution::from_sequences(&inst, &[vec![vec![1, 2]], vec![]], "t");
        model.evaporate(0.5);
        model.reinforce(&solution, 0.25);

        assert!((model.assignment.get(1, 0) - 0.75).abs() < 1e-12);
        assert!((model.assignment.get(1, 1) - 0.5).abs() < 1e-12);
        assert!((model.routing.get(0, 1) - 0.75).abs() < 1e-12);
        assert!((model.routing.get(2, 0) - 0.75).abs() < 1e-12);

        model.attenuate(&solution, 0.0);
        assert_eq!(model.routing.get(1, 2), TAU_MIN);
        assert_eq!(model.snapshot().assignment.len(), inst.dimension());
    }
}
