mod cbs;
mod validator;

pub use cbs::Cbs;
pub use validator::SolutionValidator;

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::algorithm::{AStarSuccessors, JpsSuccessors, SingleAgentSearch};
use crate::common::{
    Agent, AgentPath, CancelToken, Constraint, ConstraintTreeNode, GraphVertex,
    JumpPointConstraint, OpenList,
};
use crate::error::SearchResult;
use crate::map::ObstacleMap;
use crate::stat::SearchPerformance;

/// A best-first search the driver can run.
pub trait GraphSearch {
    /// Builds the root vertex. `None` means there is nothing to search.
    fn initialize(&mut self) -> SearchResult<Option<GraphVertex>>;

    /// `false` when the answer is already known without running the loop.
    fn needs_to_run(&mut self) -> bool {
        true
    }

    /// Expands `current` into `open`. Returns `true` once a goal is found.
    fn expand(&mut self, current: GraphVertex, open: &mut OpenList) -> SearchResult<bool>;

    fn solution(&self) -> Option<SearchSolution>;

    fn solution_cost(&self) -> Option<f64>;

    fn closed_list_size(&self) -> usize;

    fn is_high_level(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub enum SearchSolution {
    Path(AgentPath),
    ConstraintTree(ConstraintTreeNode),
}

impl SearchSolution {
    pub fn into_path(self) -> Option<AgentPath> {
        match self {
            SearchSolution::Path(path) => Some(path),
            SearchSolution::ConstraintTree(_) => None,
        }
    }

    pub fn into_tree_node(self) -> Option<ConstraintTreeNode> {
        match self {
            SearchSolution::ConstraintTree(node) => Some(node),
            SearchSolution::Path(_) => None,
        }
    }

    /// Path length, or the summed path lengths for a joint solution.
    pub fn length(&self) -> usize {
        match self {
            SearchSolution::Path(path) => path.len(),
            SearchSolution::ConstraintTree(node) => {
                node.solution().values().map(AgentPath::len).sum()
            }
        }
    }
}

/// Inputs of one single-agent search.
#[derive(Debug, Clone)]
pub struct SingleAgentConfig {
    pub agent_id: usize,
    pub map: Arc<ObstacleMap>,
    pub start: (i32, i32),
    pub goal: (i32, i32),
    /// Earliest acceptable arrival time. `None` accepts any arrival.
    pub goal_time: Option<usize>,
    pub use_jps: bool,
    pub constraints: Vec<Constraint>,
    pub jump_point_constraints: Vec<JumpPointConstraint>,
    pub enforce_constraints: bool,
    pub max_time_step: Option<usize>,
    pub cancel: CancelToken,
    pub debug: bool,
}

impl SingleAgentConfig {
    pub fn new(agent: &Agent, map: Arc<ObstacleMap>) -> Self {
        SingleAgentConfig {
            agent_id: agent.id,
            map,
            start: agent.start,
            goal: agent.goal,
            goal_time: None,
            use_jps: false,
            constraints: Vec::new(),
            jump_point_constraints: Vec::new(),
            enforce_constraints: false,
            max_time_step: None,
            cancel: CancelToken::new(),
            debug: false,
        }
    }
}

/// Inputs of one CBS run. The low level always uses JPS.
#[derive(Debug, Clone)]
pub struct CbsConfig {
    pub agents: Vec<Agent>,
    pub map: Arc<ObstacleMap>,
    pub enforce_constraints: bool,
    pub max_time_step: Option<usize>,
    pub cancel: CancelToken,
    pub debug: bool,
}

impl CbsConfig {
    pub fn new(agents: Vec<Agent>, map: Arc<ObstacleMap>) -> Self {
        CbsConfig {
            agents,
            map,
            enforce_constraints: false,
            max_time_step: None,
            cancel: CancelToken::new(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineConfig {
    SingleAgent(SingleAgentConfig),
    Cbs(CbsConfig),
}

/// Runs a [`GraphSearch`] to completion and records how it went.
pub struct GraphSearchEngine {
    search: Box<dyn GraphSearch + Send>,
    open: OpenList,
    performance: SearchPerformance,
    cancel: CancelToken,
}

impl GraphSearchEngine {
    pub fn new(config: EngineConfig) -> SearchResult<Self> {
        let (search, cancel): (Box<dyn GraphSearch + Send>, CancelToken) = match config {
            EngineConfig::SingleAgent(config) => {
                let cancel = config.cancel.clone();
                if config.use_jps {
                    (Box::new(SingleAgentSearch::new(config, JpsSuccessors)?), cancel)
                } else {
                    (Box::new(SingleAgentSearch::new(config, AStarSuccessors)?), cancel)
                }
            }
            EngineConfig::Cbs(config) => {
                let cancel = config.cancel.clone();
                (Box::new(Cbs::new(config)?), cancel)
            }
        };
        Ok(GraphSearchEngine {
            search,
            open: OpenList::new(),
            performance: SearchPerformance::default(),
            cancel,
        })
    }

    pub fn performance(&self) -> &SearchPerformance {
        &self.performance
    }

    /// Runs the search. `None` covers exhaustion, cancellation and aborts.
    #[instrument(skip_all, name = "plan", fields(high_level = self.search.is_high_level()), level = "debug")]
    pub fn plan(&mut self) -> Option<SearchSolution> {
        let start = Instant::now();
        self.open.clear();

        let root = match self.search.initialize() {
            Ok(Some(root)) => root,
            Ok(None) => {
                debug!("no root vertex, nothing to search");
                self.record(start, None);
                return None;
            }
            Err(err) => {
                error!("search aborted during initialization: {err}");
                self.record(start, None);
                return None;
            }
        };
        if let Err(err) = self.open.push(root) {
            error!("search aborted: {err}");
            self.record(start, None);
            return None;
        }

        if !self.search.needs_to_run() {
            let solution = self.search.solution();
            self.record(start, solution.as_ref());
            return solution;
        }

        while let Some(current) = self.open.pop() {
            if self.cancel.is_cancelled() {
                debug!("search cancelled");
                break;
            }
            match self.search.expand(current, &mut self.open) {
                Ok(true) => {
                    let solution = self.search.solution();
                    self.record(start, solution.as_ref());
                    return solution;
                }
                Ok(false) => {}
                Err(err) => {
                    error!("search aborted: {err}");
                    break;
                }
            }
        }

        self.record(start, None);
        None
    }

    fn record(&mut self, start: Instant, solution: Option<&SearchSolution>) {
        self.performance = SearchPerformance {
            time_ms: start.elapsed().as_millis() as u64,
            high_level: self.search.is_high_level(),
            ..SearchPerformance::default()
        };
        if let Some(solution) = solution {
            self.performance.nodes_expanded = Some(self.open.len() + self.search.closed_list_size());
            self.performance.solution_length = Some(solution.length());
            self.performance.solution_cost = self.search.solution_cost();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Location, LocationVertex};
    use crate::error::SearchError;

    fn agent(start: (i32, i32), goal: (i32, i32)) -> Agent {
        Agent { id: 0, start, goal }
    }

    #[test]
    fn test_out_of_bounds_configuration_fails_fast() {
        let map = Arc::new(ObstacleMap::new(3, 3));
        let config = SingleAgentConfig::new(&agent((0, 0), (3, 0)), map);
        let err = GraphSearchEngine::new(EngineConfig::SingleAgent(config)).err();
        assert_eq!(
            err,
            Some(SearchError::OutOfBounds {
                what: "goal",
                x: 3,
                y: 0
            })
        );
    }

    #[test]
    fn test_blocked_goal_stays_at_start() {
        let map = ObstacleMap::from_blocked(3, 3, &[(2, 2)]).unwrap();
        let mut config = SingleAgentConfig::new(&agent((0, 0), (2, 2)), Arc::new(map));
        config.use_jps = true;
        let mut engine = GraphSearchEngine::new(EngineConfig::SingleAgent(config)).unwrap();
        let path = engine.plan().and_then(SearchSolution::into_path).unwrap();

        assert_eq!(
            path.steps(),
            &[Location::new(0, 0, 0), Location::new(0, 0, 1)]
        );
        // The root is still sitting in the open list.
        assert_eq!(engine.performance().nodes_expanded, Some(1));
        assert_eq!(engine.performance().solution_length, Some(2));
        assert!(!engine.performance().high_level);
    }

    #[test]
    fn test_start_equals_goal() {
        let map = Arc::new(ObstacleMap::new(2, 2));
        let config = SingleAgentConfig::new(&agent((1, 1), (1, 1)), map);
        let mut engine = GraphSearchEngine::new(EngineConfig::SingleAgent(config)).unwrap();
        let path = engine.plan().and_then(SearchSolution::into_path).unwrap();
        assert_eq!(path.steps(), &[Location::new(1, 1, 0)]);
        assert_eq!(engine.performance().solution_cost, Some(0.0));
    }

    #[test]
    fn test_no_solution_leaves_counts_unset() {
        let map = ObstacleMap::from_blocked(1, 3, &[(1, 0)]).unwrap();
        let config = SingleAgentConfig::new(&agent((0, 0), (2, 0)), Arc::new(map));
        let mut engine = GraphSearchEngine::new(EngineConfig::SingleAgent(config)).unwrap();
        assert!(engine.plan().is_none());

        let performance = engine.performance();
        assert!(!performance.found_solution());
        assert_eq!(performance.nodes_expanded, None);
        assert_eq!(performance.solution_cost, None);
    }

    struct MixedUpSearch;

    impl GraphSearch for MixedUpSearch {
        fn initialize(&mut self) -> SearchResult<Option<GraphVertex>> {
            let mut root = LocationVertex::new(Location::new(0, 0, 0));
            root.set_scores(0.0, 0.0);
            Ok(Some(GraphVertex::Location(root)))
        }

        fn expand(&mut self, current: GraphVertex, _open: &mut OpenList) -> SearchResult<bool> {
            current.into_tree_node()?;
            Ok(true)
        }

        fn solution(&self) -> Option<SearchSolution> {
            Some(SearchSolution::Path(AgentPath::default()))
        }

        fn solution_cost(&self) -> Option<f64> {
            None
        }

        fn closed_list_size(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_wrong_vertex_kind_aborts_plan() {
        let mut engine = GraphSearchEngine {
            search: Box::new(MixedUpSearch),
            open: OpenList::new(),
            performance: SearchPerformance::default(),
            cancel: CancelToken::new(),
        };
        assert!(engine.plan().is_none());
        assert!(!engine.performance().found_solution());
    }
}
