use std::collections::BTreeMap;

use crate::common::{Agent, AgentPath, ConstraintTreeNode, LocationVertex};

/// Cost-to-go estimate between two vertices of the same kind.
pub trait Heuristic<V> {
    fn calculate_cost(&self, from: &V, to: Option<&V>) -> f64;
}

/// Straight-line distance between two cells. Time is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanDistance;

impl EuclideanDistance {
    pub fn between(from: (i32, i32), to: (i32, i32)) -> f64 {
        let dx = (to.0 - from.0) as f64;
        let dy = (to.1 - from.1) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Heuristic<LocationVertex> for EuclideanDistance {
    fn calculate_cost(&self, from: &LocationVertex, to: Option<&LocationVertex>) -> f64 {
        to.map_or(0.0, |to| {
            EuclideanDistance::between(from.location().cell(), to.location().cell())
        })
    }
}

/// Sum over agents of the timestep at which each one settles on its goal.
/// Waiting on the goal after arrival is free.
#[derive(Debug, Clone)]
pub struct SumInCosts {
    goals: BTreeMap<usize, (i32, i32)>,
}

impl SumInCosts {
    pub fn new(agents: &[Agent]) -> Self {
        SumInCosts {
            goals: agents.iter().map(|a| (a.id, a.goal)).collect(),
        }
    }

    pub fn evaluate(&self, solution: &BTreeMap<usize, AgentPath>) -> f64 {
        solution
            .iter()
            .map(|(agent, path)| match self.goals.get(agent) {
                Some(&goal) => path.arrival_time(goal),
                None => path.len(),
            })
            .sum::<usize>() as f64
    }
}

impl Heuristic<ConstraintTreeNode> for SumInCosts {
    fn calculate_cost(&self, from: &ConstraintTreeNode, _to: Option<&ConstraintTreeNode>) -> f64 {
        self.evaluate(from.solution())
    }
}
