mod astar;
mod jps;

pub(crate) use astar::AStarSuccessors;
pub(crate) use jps::JpsSuccessors;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::common::{
    AgentPath, CancelToken, Constraint, GraphVertex, JumpPointConstraint, Location,
    LocationVertex, OpenList,
};
use crate::error::{SearchError, SearchResult};
use crate::heuristic::{EuclideanDistance, Heuristic};
use crate::map::ObstacleMap;
use crate::solver::{GraphSearch, SearchSolution, SingleAgentConfig};

/// The 8 compass moves plus waiting in place.
pub(crate) const DIRECTIONS: [(i32, i32); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Read-only state every successor strategy queries while expanding.
#[derive(Debug)]
pub(crate) struct LowLevelContext {
    pub(crate) agent_id: usize,
    pub(crate) map: Arc<ObstacleMap>,
    pub(crate) goal: (i32, i32),
    pub(crate) goal_time: Option<usize>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) enforce_constraints: bool,
    pub(crate) jump_point_constraints: Vec<JumpPointConstraint>,
    pub(crate) horizon: usize,
    pub(crate) cancel: CancelToken,
}

impl LowLevelContext {
    pub(crate) fn check_if_blocked(&self, x: i32, y: i32, t: usize) -> bool {
        if t > self.horizon || self.map.is_blocked_xy(x, y) {
            return true;
        }
        let location = Location::new(x, y, t);
        self.enforce_constraints
            && self
                .constraints
                .iter()
                .any(|c| c.agent == self.agent_id && c.applies(&location))
    }

    pub(crate) fn check_if_diagonal(dx: i32, dy: i32) -> bool {
        dx.abs() == 1 && dy.abs() == 1
    }

    pub(crate) fn is_goal_cell(&self, x: i32, y: i32) -> bool {
        (x, y) == self.goal
    }

    /// True if arriving at `location` with direction `(dx, dy)` runs into a
    /// segment reserved by another agent.
    pub(crate) fn blocked_by_jump_point(&self, location: &Location, dx: i32, dy: i32) -> bool {
        self.jump_point_constraints
            .iter()
            .any(|jp| matches!(jp.applies(location, dx, dy), Ok(true)))
    }

    /// True while an enforced constraint or another agent's segment can still
    /// be reached from `from`. Past that point the map is static again.
    pub(crate) fn time_blocks_ahead(&self, from: &Location) -> bool {
        let constraint_ahead = self.enforce_constraints
            && self.constraints.iter().any(|c| {
                let (x, y) = c.vertex.cell();
                let distance = (x - from.x).unsigned_abs().max((y - from.y).unsigned_abs());
                c.agent == self.agent_id && from.t + distance as usize <= c.vertex.t
            });
        constraint_ahead
            || self
                .jump_point_constraints
                .iter()
                .any(|jp| jp.reachable_from(from))
    }

    fn is_goal(&self, location: &Location) -> bool {
        self.is_goal_cell(location.x, location.y)
            && self.goal_time.map_or(true, |t| location.t >= t)
    }
}

/// How a single-agent search turns one vertex into its successors.
pub(crate) trait SuccessorStrategy {
    const NAME: &'static str;

    fn find_successors(&self, ctx: &LowLevelContext, current: &LocationVertex) -> Vec<Location>;

    fn calculate_g_score(
        &self,
        ctx: &LowLevelContext,
        current: &LocationVertex,
        successor: &Location,
    ) -> f64;

    fn optionally_pad_path(&self, path: AgentPath) -> AgentPath {
        path
    }
}

/// Best-first single-agent search over `(x, y, t)`, parameterised by its
/// successor strategy.
pub(crate) struct SingleAgentSearch<S> {
    ctx: LowLevelContext,
    strategy: S,
    root: LocationVertex,
    heuristic: EuclideanDistance,
    arena: Vec<LocationVertex>,
    closed: HashSet<Location>,
    goal_vertex: Option<LocationVertex>,
    debug: bool,
}

impl<S: SuccessorStrategy> SingleAgentSearch<S> {
    pub(crate) fn new(config: SingleAgentConfig, strategy: S) -> SearchResult<Self> {
        let map = config.map;
        for (what, (x, y)) in [("start", config.start), ("goal", config.goal)] {
            if !map.contains_xy(x, y) {
                return Err(SearchError::OutOfBounds { what, x, y });
            }
        }

        let latest = config
            .constraints
            .iter()
            .map(|c| c.vertex.t)
            .chain(config.jump_point_constraints.iter().map(|jp| jp.end_time()))
            .chain(config.goal_time)
            .max()
            .unwrap_or(0);
        let horizon = config
            .max_time_step
            .unwrap_or(map.rows() * map.cols() + latest);

        let root = LocationVertex::new(Location::new(config.start.0, config.start.1, 0));
        Ok(SingleAgentSearch {
            ctx: LowLevelContext {
                agent_id: config.agent_id,
                map,
                goal: config.goal,
                goal_time: config.goal_time,
                constraints: config.constraints,
                enforce_constraints: config.enforce_constraints,
                jump_point_constraints: config.jump_point_constraints,
                horizon,
                cancel: config.cancel,
            },
            strategy,
            root,
            heuristic: EuclideanDistance,
            arena: Vec::new(),
            closed: HashSet::new(),
            goal_vertex: None,
            debug: config.debug,
        })
    }

    fn goal_marker(&self) -> LocationVertex {
        LocationVertex::new(Location::new(self.ctx.goal.0, self.ctx.goal.1, 0))
    }
}

impl<S: SuccessorStrategy> GraphSearch for SingleAgentSearch<S> {
    fn initialize(&mut self) -> SearchResult<Option<GraphVertex>> {
        let goal = self.goal_marker();
        let h = self.heuristic.calculate_cost(&self.root, Some(&goal));
        self.root.set_scores(0.0, h);
        self.root.set_parent(None);
        Ok(Some(GraphVertex::Location(self.root.clone())))
    }

    fn needs_to_run(&mut self) -> bool {
        let (gx, gy) = self.ctx.goal;
        if self.ctx.map.is_blocked_xy(gx, gy) {
            // Unreachable goal: claim the start cell for one step and stop.
            debug!(agent = self.ctx.agent_id, "goal ({gx}, {gy}) is blocked");
            let root_id = self.arena.len();
            self.arena.push(self.root.clone());
            let mut stay = LocationVertex::new(self.root.location().at(1));
            stay.set_parent(Some(root_id));
            stay.set_scores(1.0, 0.0);
            self.goal_vertex = Some(stay);
            return false;
        }
        if self.root.location().cell() == self.ctx.goal
            && self.ctx.goal_time.map_or(true, |t| t == 0)
        {
            self.goal_vertex = Some(self.root.clone());
            return false;
        }
        true
    }

    fn expand(&mut self, current: GraphVertex, open: &mut OpenList) -> SearchResult<bool> {
        let current = current.into_location()?;
        if !self.closed.insert(current.location()) {
            return Ok(false);
        }
        if self.debug {
            debug!(
                "{} expand {:?} f={:?}",
                S::NAME,
                current.location(),
                current.cost()
            );
        }

        let goal = self.goal_marker();
        let id = self.arena.len();
        self.arena.push(current);
        let current = &self.arena[id];

        let successors = self.strategy.find_successors(&self.ctx, current);
        trace!("{} successors", successors.len());
        for location in successors {
            if self.closed.contains(&location) {
                continue;
            }
            let mut successor = LocationVertex::new(location);
            successor.set_parent(Some(id));
            let g = self.strategy.calculate_g_score(&self.ctx, current, &location);
            let h = self.heuristic.calculate_cost(&successor, Some(&goal));
            successor.set_scores(g, h);

            if self.ctx.is_goal(&location) {
                if self.debug {
                    debug!("goal reached at {location:?} g={g}");
                }
                self.goal_vertex = Some(successor);
                return Ok(true);
            }
            open.push(GraphVertex::Location(successor))?;
        }
        Ok(false)
    }

    fn solution(&self) -> Option<SearchSolution> {
        let goal = self.goal_vertex.as_ref()?;
        let path = AgentPath::reconstruct(&self.arena, goal);
        Some(SearchSolution::Path(self.strategy.optionally_pad_path(path)))
    }

    fn solution_cost(&self) -> Option<f64> {
        self.goal_vertex.as_ref().and_then(LocationVertex::g)
    }

    fn closed_list_size(&self) -> usize {
        self.closed.len()
    }
}
