mod highlevel;
mod lowlevel;

pub use highlevel::{
    build_jump_point_constraints, Conflict, Constraint, ConstraintTreeNode, GraphObject,
    JumpKind, JumpPointConstraint,
};
pub use lowlevel::{GraphVertex, LocationVertex, OpenList, VertexId};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::map::ObstacleMap;

/// A grid cell at a timestep. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
    pub t: usize,
}

impl Location {
    pub fn new(x: i32, y: i32, t: usize) -> Self {
        Location { x, y, t }
    }

    pub fn cell(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn same_cell(&self, other: &Location) -> bool {
        self.x == other.x && self.y == other.y
    }

    pub fn at(&self, t: usize) -> Location {
        Location { t, ..*self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (i32, i32),
    pub goal: (i32, i32),
}

impl Agent {
    /// Start and goal must both lie on a free cell of `map`.
    pub fn verify(&self, map: &ObstacleMap) -> bool {
        !map.is_blocked_xy(self.start.0, self.start.1) && !map.is_blocked_xy(self.goal.0, self.goal.1)
    }
}

/// Time-indexed route of one agent: `steps[i].t == i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentPath {
    steps: Vec<Location>,
}

impl AgentPath {
    pub fn new(steps: Vec<Location>) -> Self {
        AgentPath { steps }
    }

    /// Walks parent links from `goal` back to the root stored in `arena`.
    pub(crate) fn reconstruct(arena: &[LocationVertex], goal: &LocationVertex) -> Self {
        let mut steps = vec![goal.location()];
        let mut parent = goal.parent();
        while let Some(id) = parent {
            let vertex = &arena[id];
            steps.push(vertex.location());
            parent = vertex.parent();
        }
        steps.reverse();
        AgentPath { steps }
    }

    pub fn steps(&self) -> &[Location] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<&Location> {
        self.steps.first()
    }

    pub fn last(&self) -> Option<&Location> {
        self.steps.last()
    }

    pub fn last_timestep(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Position at `t`. Past the end of the path the agent waits on its last cell.
    pub fn at(&self, t: usize) -> Option<Location> {
        match self.steps.get(t) {
            Some(step) => Some(*step),
            None => self.steps.last().map(|last| last.at(t)),
        }
    }

    /// Repeats the final vertex until the path ends at `last_timestep`.
    pub fn pad_to(&mut self, last_timestep: usize) {
        if let Some(&last) = self.steps.last() {
            let mut t = last.t;
            while self.steps.len() <= last_timestep {
                t += 1;
                self.steps.push(last.at(t));
            }
        }
    }

    /// First timestep from which the agent stays on `goal` for good, or the
    /// path length if it never settles there.
    pub fn arrival_time(&self, goal: (i32, i32)) -> usize {
        match self.steps.iter().rposition(|step| step.cell() != goal) {
            Some(idx) => idx + 1,
            None => 0,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Location> {
        self.steps.iter()
    }
}

/// Shared flag used to stop a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Paths of every agent plus the cost reported by the search that made them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub cost: f64,
    pub paths: BTreeMap<usize, AgentPath>,
}

impl Solution {
    /// Checks endpoints, timing, obstacle clearance, unit moves and that no
    /// two agents conflict.
    pub fn verify(&self, map: &ObstacleMap, agents: &[Agent]) -> bool {
        for agent in agents {
            let Some(path) = self.paths.get(&agent.id) else {
                return false;
            };
            let (Some(first), Some(last)) = (path.first(), path.last()) else {
                return false;
            };
            if first.cell() != agent.start || last.cell() != agent.goal {
                return false;
            }
            for (idx, step) in path.iter().enumerate() {
                if step.t != idx || map.is_blocked_xy(step.x, step.y) {
                    return false;
                }
            }
            let unit_moves = path
                .steps()
                .windows(2)
                .all(|w| (w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1);
            if !unit_moves {
                return false;
            }
        }

        crate::solver::SolutionValidator
            .validate(&self.paths)
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(cells: &[(i32, i32)]) -> AgentPath {
        AgentPath::new(
            cells
                .iter()
                .enumerate()
                .map(|(t, &(x, y))| Location::new(x, y, t))
                .collect(),
        )
    }

    #[test]
    fn test_pad_to_repeats_last_vertex() {
        let mut p = path(&[(0, 0), (1, 0)]);
        p.pad_to(3);
        assert_eq!(p.len(), 4);
        assert_eq!(p.steps()[3], Location::new(1, 0, 3));
        for (idx, step) in p.iter().enumerate() {
            assert_eq!(step.t, idx);
        }

        // Already long enough.
        p.pad_to(1);
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn test_at_falls_back_to_last_vertex() {
        let p = path(&[(0, 0), (1, 1)]);
        assert_eq!(p.at(0), Some(Location::new(0, 0, 0)));
        assert_eq!(p.at(5), Some(Location::new(1, 1, 5)));
        assert_eq!(AgentPath::default().at(0), None);
    }

    #[test]
    fn test_arrival_time_ignores_trailing_waits() {
        assert_eq!(path(&[(0, 0), (1, 0), (2, 0), (2, 0)]).arrival_time((2, 0)), 2);
        assert_eq!(path(&[(2, 0), (1, 0), (2, 0)]).arrival_time((2, 0)), 2);
        assert_eq!(path(&[(2, 0), (2, 0)]).arrival_time((2, 0)), 0);
        assert_eq!(path(&[(0, 0), (1, 0)]).arrival_time((2, 0)), 2);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_solution_verify() {
        let map = ObstacleMap::from_blocked(2, 3, &[]).unwrap();
        let agents = vec![
            Agent {
                id: 0,
                start: (0, 0),
                goal: (2, 0),
            },
            Agent {
                id: 1,
                start: (2, 1),
                goal: (0, 1),
            },
        ];
        let mut solution = Solution {
            cost: 4.0,
            paths: BTreeMap::from([
                (0, path(&[(0, 0), (1, 0), (2, 0)])),
                (1, path(&[(2, 1), (1, 1), (0, 1)])),
            ]),
        };
        assert!(solution.verify(&map, &agents));

        // Both agents in the middle column at t = 1 after a swap of rows.
        solution.paths.insert(1, path(&[(2, 1), (1, 0), (0, 1)]));
        assert!(!solution.verify(&map, &agents));

        // Teleporting is not a unit move.
        solution.paths.insert(1, path(&[(2, 1), (0, 1), (0, 1)]));
        assert!(!solution.verify(&map, &agents));
    }
}
