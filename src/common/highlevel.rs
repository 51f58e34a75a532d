use serde::Serialize;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::lowlevel::VertexId;
use super::{AgentPath, Location};
use crate::error::{SearchError, SearchResult};
use crate::stat::SearchPerformance;

/// Forbids `agent` from occupying `vertex` at exactly `vertex.t`.
///
/// `next_vertices` holds where the other implicated agents were heading, so a
/// replan can tell an edge conflict from a vertex conflict. It takes no part
/// in equality.
#[derive(Debug, Clone, Serialize)]
pub struct Constraint {
    pub agent: usize,
    pub vertex: Location,
    pub next_vertices: Vec<Location>,
}

impl Constraint {
    pub fn new(agent: usize, vertex: Location, next_vertices: Vec<Location>) -> Self {
        Constraint {
            agent,
            vertex,
            next_vertices,
        }
    }

    pub fn applies(&self, location: &Location) -> bool {
        self.vertex == *location
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.agent == other.agent && self.vertex == other.vertex
    }
}

impl Eq for Constraint {}

impl Hash for Constraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.agent.hash(state);
        self.vertex.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Time,
    Horizontal,
    Vertical,
    Diagonal,
}

/// One straight, diagonal or stationary stretch of another agent's path.
///
/// The segment starts at `origin` and covers `origin + k * step` at time
/// `origin.t + k` for every `k` up to its length. A time segment covers the
/// origin cell for `[origin.t, origin.t + dt]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpPointConstraint {
    origin: Location,
    dx: i32,
    dy: i32,
    dt: usize,
    kind: JumpKind,
}

impl JumpPointConstraint {
    pub fn new(from: Location, to: Location) -> SearchResult<Self> {
        if to.t < from.t {
            return Err(SearchError::NegativeElapsedTime {
                from: from.t,
                to: to.t,
            });
        }
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let kind = match (dx, dy) {
            (0, 0) => JumpKind::Time,
            (0, _) => JumpKind::Vertical,
            (_, 0) => JumpKind::Horizontal,
            _ => JumpKind::Diagonal,
        };
        Ok(JumpPointConstraint {
            origin: from,
            dx,
            dy,
            dt: to.t - from.t,
            kind,
        })
    }

    pub fn origin(&self) -> Location {
        self.origin
    }

    pub fn kind(&self) -> JumpKind {
        self.kind
    }

    pub fn end_time(&self) -> usize {
        self.origin.t + self.dt
    }

    /// Whether an agent standing at `from` can still touch this segment,
    /// counting the swap step just after its end.
    pub fn reachable_from(&self, from: &Location) -> bool {
        let gap = |lo: i32, hi: i32, v: i32| (lo - v).max(v - hi).max(0) as usize;
        let (end_x, end_y) = (self.origin.x + self.dx, self.origin.y + self.dy);
        let distance = gap(self.origin.x.min(end_x), self.origin.x.max(end_x), from.x).max(gap(
            self.origin.y.min(end_y),
            self.origin.y.max(end_y),
            from.y,
        ));
        from.t + distance <= self.end_time() + 1
    }

    /// Whether an agent arriving at `test` while moving in direction
    /// `(dir_x, dir_y)` collides with this segment.
    pub fn applies(&self, test: &Location, dir_x: i32, dir_y: i32) -> SearchResult<bool> {
        if !(-1..=1).contains(&dir_x) || !(-1..=1).contains(&dir_y) {
            return Err(SearchError::InvalidDirection {
                dx: dir_x,
                dy: dir_y,
            });
        }

        let tdx = test.x - self.origin.x;
        let tdy = test.y - self.origin.y;
        let test_t = test.t as i64;
        let origin_t = self.origin.t as i64;

        let applies = match self.kind {
            JumpKind::Time => {
                tdx == 0 && tdy == 0 && (0..=self.dt as i64).contains(&(test_t - origin_t))
            }
            JumpKind::Horizontal => {
                tdy == 0
                    && along(tdx, self.dx)
                    && occupied(
                        origin_t + tdx.abs() as i64,
                        test_t,
                        self.dx.signum() == -dir_x,
                    )
            }
            JumpKind::Vertical => {
                tdx == 0
                    && along(tdy, self.dy)
                    && occupied(
                        origin_t + tdy.abs() as i64,
                        test_t,
                        self.dy.signum() == -dir_y,
                    )
            }
            JumpKind::Diagonal => {
                tdx.abs() == tdy.abs()
                    && along(tdx, self.dx)
                    && along(tdy, self.dy)
                    && occupied(
                        origin_t + tdx.abs() as i64,
                        test_t,
                        self.dx.signum() == -dir_x && self.dy.signum() == -dir_y,
                    )
            }
        };
        Ok(applies)
    }
}

// `offset` lies on the segment `[0, length]` and points the same way.
fn along(offset: i32, length: i32) -> bool {
    offset * length >= 0 && offset.abs() <= length.abs()
}

// The segment holds the cell at `segment_t`. Moving against it one step
// before or after that time is a swap.
fn occupied(segment_t: i64, test_t: i64, opposite: bool) -> bool {
    segment_t == test_t || (opposite && (segment_t == test_t + 1 || segment_t == test_t - 1))
}

/// Splits `path` into constant-direction segments, then reserves the final
/// cell up to `last_timestep`.
pub fn build_jump_point_constraints(
    path: &AgentPath,
    last_timestep: usize,
) -> Vec<JumpPointConstraint> {
    let steps = path.steps();
    let mut constraints = Vec::new();
    if steps.len() <= 1 {
        return constraints;
    }

    let mut segment_start = steps[0];
    let mut direction = (steps[1].x - steps[0].x, steps[1].y - steps[0].y);
    for pair in steps.windows(2).skip(1) {
        let step = (pair[1].x - pair[0].x, pair[1].y - pair[0].y);
        if step != direction {
            constraints.extend(JumpPointConstraint::new(segment_start, pair[0]));
            segment_start = pair[0];
            direction = step;
        }
    }

    let last = steps[steps.len() - 1];
    constraints.extend(JumpPointConstraint::new(segment_start, last));
    constraints.extend(JumpPointConstraint::new(
        last,
        last.at(last_timestep.max(last.t)),
    ));
    constraints
}

/// Vertex or undirected edge on which agents collide. Edges are stored with
/// the smaller cell first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphObject {
    Vertex((i32, i32)),
    Edge((i32, i32), (i32, i32)),
}

impl GraphObject {
    pub fn edge(a: (i32, i32), b: (i32, i32)) -> Self {
        if a <= b {
            GraphObject::Edge(a, b)
        } else {
            GraphObject::Edge(b, a)
        }
    }

    pub(crate) fn rank(&self) -> u8 {
        match self {
            GraphObject::Vertex(_) => 0,
            GraphObject::Edge(..) => 1,
        }
    }
}

/// Collision at `time`. `agents` maps every implicated agent to its vertex at
/// `time + 1`.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub time: usize,
    pub object: GraphObject,
    pub agents: BTreeMap<usize, Location>,
}

impl PartialEq for Conflict {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.object == other.object
    }
}

impl Eq for Conflict {}

/// Node of the CBS constraint tree.
#[derive(Debug, Clone, Default)]
pub struct ConstraintTreeNode {
    parent: Option<VertexId>,
    constraint: Option<Constraint>,
    solution: BTreeMap<usize, AgentPath>,
    jump_point_constraints: BTreeMap<usize, Vec<JumpPointConstraint>>,
    performance: BTreeMap<usize, SearchPerformance>,
    g: Option<f64>,
    conflict_count: usize,
}

impl ConstraintTreeNode {
    pub(crate) fn root() -> Self {
        ConstraintTreeNode::default()
    }

    /// Copy of this node carrying one extra constraint, with its cost reset.
    pub(crate) fn child(&self, parent: VertexId, constraint: Constraint) -> Self {
        ConstraintTreeNode {
            parent: Some(parent),
            constraint: Some(constraint),
            solution: self.solution.clone(),
            jump_point_constraints: self.jump_point_constraints.clone(),
            performance: self.performance.clone(),
            g: None,
            conflict_count: 0,
        }
    }

    pub fn parent(&self) -> Option<VertexId> {
        self.parent
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn solution(&self) -> &BTreeMap<usize, AgentPath> {
        &self.solution
    }

    pub fn into_solution(self) -> BTreeMap<usize, AgentPath> {
        self.solution
    }

    pub fn jump_point_constraints(&self) -> &BTreeMap<usize, Vec<JumpPointConstraint>> {
        &self.jump_point_constraints
    }

    pub fn performance(&self) -> &BTreeMap<usize, SearchPerformance> {
        &self.performance
    }

    /// Cost is the g-score alone; tree nodes carry no heuristic.
    pub fn cost(&self) -> Option<f64> {
        self.g
    }

    pub fn conflict_count(&self) -> usize {
        self.conflict_count
    }

    pub(crate) fn set_score(&mut self, g: f64, conflict_count: usize) {
        self.g = Some(g);
        self.conflict_count = conflict_count;
    }

    pub fn last_timestep(&self) -> usize {
        self.solution
            .values()
            .map(AgentPath::last_timestep)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn set_path(&mut self, agent: usize, path: AgentPath, performance: SearchPerformance) {
        self.solution.insert(agent, path);
        self.performance.insert(agent, performance);
    }

    /// Pads every path to the makespan and rebuilds all jump point constraints.
    pub(crate) fn align_paths(&mut self) {
        let last_timestep = self.last_timestep();
        for path in self.solution.values_mut() {
            path.pad_to(last_timestep);
        }
        self.jump_point_constraints = self
            .solution
            .iter()
            .map(|(&agent, path)| (agent, build_jump_point_constraints(path, last_timestep)))
            .collect();
    }
}
