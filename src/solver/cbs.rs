use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{EngineConfig, GraphSearch, GraphSearchEngine, SearchSolution, SingleAgentConfig};
use super::{CbsConfig, SolutionValidator};
use crate::common::{
    Agent, AgentPath, CancelToken, Conflict, Constraint, ConstraintTreeNode, GraphObject,
    GraphVertex, JumpPointConstraint, Location, OpenList, VertexId,
};
use crate::error::{SearchError, SearchResult};
use crate::heuristic::{Heuristic, SumInCosts};
use crate::map::ObstacleMap;
use crate::stat::SearchPerformance;

/// Conflict-Based Search over a tree of joint solutions.
pub struct Cbs {
    agents: Vec<Agent>,
    map: Arc<ObstacleMap>,
    validator: SolutionValidator,
    heuristic: SumInCosts,
    tree: Vec<ConstraintTreeNode>,
    goal: Option<VertexId>,
    enforce_constraints: bool,
    max_time_step: Option<usize>,
    cancel: CancelToken,
    debug: bool,
}

impl Cbs {
    pub fn new(config: CbsConfig) -> SearchResult<Self> {
        let mut ids = HashSet::new();
        let mut goals: Vec<(usize, (i32, i32))> = Vec::new();
        for agent in &config.agents {
            if !ids.insert(agent.id) {
                return Err(SearchError::DuplicateAgent(agent.id));
            }
            for (what, (x, y)) in [("start", agent.start), ("goal", agent.goal)] {
                if !config.map.contains_xy(x, y) {
                    return Err(SearchError::OutOfBounds { what, x, y });
                }
            }
            if let Some(&(first, _)) = goals.iter().find(|(_, goal)| *goal == agent.goal) {
                return Err(SearchError::DuplicateGoal {
                    first,
                    second: agent.id,
                });
            }
            goals.push((agent.id, agent.goal));
        }

        let mut agents = config.agents;
        agents.sort_by_key(|a| a.id);
        Ok(Cbs {
            heuristic: SumInCosts::new(&agents),
            agents,
            map: config.map,
            validator: SolutionValidator,
            tree: Vec::new(),
            goal: None,
            enforce_constraints: config.enforce_constraints,
            max_time_step: config.max_time_step,
            cancel: config.cancel,
            debug: config.debug,
        })
    }

    fn agent(&self, id: usize) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Runs JPS for one agent under the given constraints.
    #[instrument(skip_all, name = "cbs_low_level", fields(agent = agent.id, goal_time = ?goal_time), level = "debug")]
    fn plan_agent(
        &self,
        agent: &Agent,
        goal_time: Option<usize>,
        constraints: Vec<Constraint>,
        jump_point_constraints: Vec<JumpPointConstraint>,
    ) -> SearchResult<(Option<AgentPath>, SearchPerformance)> {
        let mut config = SingleAgentConfig::new(agent, Arc::clone(&self.map));
        config.goal_time = goal_time;
        config.use_jps = true;
        config.constraints = constraints;
        config.jump_point_constraints = jump_point_constraints;
        config.enforce_constraints = self.enforce_constraints;
        config.max_time_step = self.max_time_step;
        config.cancel = self.cancel.clone();
        config.debug = self.debug;

        let mut engine = GraphSearchEngine::new(EngineConfig::SingleAgent(config))?;
        let path = engine.plan().and_then(SearchSolution::into_path);
        Ok((path, engine.performance().clone()))
    }

    /// Every constraint on the way from `node` up to the root.
    fn branch_constraints(&self, mut node: Option<VertexId>) -> Vec<Constraint> {
        let mut constraints = Vec::new();
        while let Some(id) = node {
            let tree_node = &self.tree[id];
            if let Some(constraint) = tree_node.constraint() {
                constraints.push(constraint.clone());
            }
            node = tree_node.parent();
        }
        constraints
    }

    /// Constraint keeping `agent` out of `conflict`.
    fn constraint_for(conflict: &Conflict, agent: usize) -> Constraint {
        let others = conflict
            .agents
            .iter()
            .filter(|(&other, _)| other != agent)
            .map(|(_, &next)| next);

        match conflict.object {
            GraphObject::Vertex((x, y)) => {
                Constraint::new(agent, Location::new(x, y, conflict.time), others.collect())
            }
            GraphObject::Edge(a, b) => {
                // Forbid stepping onto the cell the other agent is leaving.
                let other_next = others.into_iter().next();
                let (x, y) = match other_next {
                    Some(next) if next.cell() == a => b,
                    _ => a,
                };
                Constraint::new(
                    agent,
                    Location::new(x, y, conflict.time + 1),
                    other_next.into_iter().collect(),
                )
            }
        }
    }

    fn score(&self, node: &mut ConstraintTreeNode) {
        let g = self.heuristic.calculate_cost(node, None);
        let conflicts = self.validator.validate(node.solution()).len();
        node.set_score(g, conflicts);
    }

    /// Replans `agent` inside `child`. Returns `false` when it has no path.
    fn update_solution(
        &self,
        child: &mut ConstraintTreeNode,
        agent: &Agent,
        constraints: Vec<Constraint>,
    ) -> SearchResult<bool> {
        let makespan = child.last_timestep();
        let reservations: Vec<JumpPointConstraint> = child
            .jump_point_constraints()
            .iter()
            .filter(|(&other, _)| other != agent.id)
            .flat_map(|(_, segments)| segments.iter().cloned())
            .collect();

        let (path, performance) =
            self.plan_agent(agent, Some(makespan), constraints, reservations)?;
        let Some(path) = path else {
            debug!(agent = agent.id, "replan failed, dropping branch");
            return Ok(false);
        };

        child.set_path(agent.id, path, performance);
        child.align_paths();
        self.score(child);
        Ok(true)
    }
}

impl GraphSearch for Cbs {
    fn initialize(&mut self) -> SearchResult<Option<GraphVertex>> {
        self.tree.clear();
        self.goal = None;

        let mut root = ConstraintTreeNode::root();
        for agent in &self.agents {
            let (path, performance) = self.plan_agent(agent, None, Vec::new(), Vec::new())?;
            match path {
                Some(path) => root.set_path(agent.id, path, performance),
                None => {
                    debug!(agent = agent.id, "no path without constraints");
                    return Ok(None);
                }
            }
        }
        root.align_paths();
        self.score(&mut root);
        debug!(
            "root cost {:?} with {} conflicts",
            root.cost(),
            root.conflict_count()
        );
        Ok(Some(GraphVertex::TreeNode(Box::new(root))))
    }

    fn expand(&mut self, current: GraphVertex, open: &mut OpenList) -> SearchResult<bool> {
        let node = current.into_tree_node()?;
        let id = self.tree.len();
        self.tree.push(node);

        let conflicts = self.validator.validate(self.tree[id].solution());
        let Some(conflict) = conflicts.first() else {
            self.goal = Some(id);
            return Ok(true);
        };
        if self.debug {
            debug!(
                "node {id} cost {:?}: {} conflicts, first {conflict:?}",
                self.tree[id].cost(),
                conflicts.len()
            );
        }

        let inherited = self.branch_constraints(Some(id));
        let implicated: BTreeSet<usize> = conflict.agents.keys().copied().collect();
        for agent_id in implicated {
            let constraint = Self::constraint_for(conflict, agent_id);
            if inherited.contains(&constraint) {
                debug!(agent = agent_id, "constraint already on branch: {constraint:?}");
                continue;
            }
            let Some(agent) = self.agent(agent_id) else {
                continue;
            };

            let mut child = self.tree[id].child(id, constraint.clone());
            let mut constraints = inherited.clone();
            constraints.push(constraint);
            if self.update_solution(&mut child, agent, constraints)? {
                open.push(GraphVertex::TreeNode(Box::new(child)))?;
            }
        }
        Ok(false)
    }

    fn solution(&self) -> Option<SearchSolution> {
        let id = self.goal?;
        Some(SearchSolution::ConstraintTree(self.tree[id].clone()))
    }

    fn solution_cost(&self) -> Option<f64> {
        self.goal.and_then(|id| self.tree[id].cost())
    }

    fn closed_list_size(&self) -> usize {
        self.tree.len()
    }

    fn is_high_level(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Solution;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn agent(id: usize, start: (i32, i32), goal: (i32, i32)) -> Agent {
        Agent { id, start, goal }
    }

    fn run(agents: Vec<Agent>, map: ObstacleMap) -> (Option<ConstraintTreeNode>, SearchPerformance) {
        let config = CbsConfig::new(agents, Arc::new(map));
        let mut engine = GraphSearchEngine::new(EngineConfig::Cbs(config)).unwrap();
        let node = engine.plan().and_then(SearchSolution::into_tree_node);
        (node, engine.performance().clone())
    }

    #[test]
    fn test_cbs_swap_passes_on_second_row() {
        init_tracing();
        let agents = vec![agent(0, (0, 0), (2, 0)), agent(1, (2, 0), (0, 0))];
        let map = ObstacleMap::new(2, 3);

        // The unconstrained paths meet in the middle cell.
        let mut root_search = Cbs::new(CbsConfig::new(agents.clone(), Arc::new(map.clone()))).unwrap();
        let root = root_search.initialize().unwrap().unwrap().into_tree_node().unwrap();
        assert!(!SolutionValidator.validate(root.solution()).is_empty());
        assert_eq!(root.conflict_count(), 1);

        let (node, performance) = run(agents.clone(), map.clone());
        let node = node.unwrap();
        assert!(SolutionValidator.validate(node.solution()).is_empty());

        // Agent 0 replans through (1,1); nobody has to wait.
        assert_eq!(
            node.solution()[&0].iter().map(|l| l.cell()).collect::<Vec<_>>(),
            vec![(0, 0), (1, 1), (2, 0)]
        );
        let lengths: BTreeSet<usize> = node.solution().values().map(AgentPath::len).collect();
        assert_eq!(lengths, BTreeSet::from([3]));
        assert_eq!(node.cost(), Some(4.0));

        let solution = Solution {
            cost: node.cost().unwrap_or_default(),
            paths: node.solution().clone(),
        };
        assert!(solution.verify(&map, &agents));
        assert!(performance.high_level);
        assert_eq!(performance.solution_cost, Some(4.0));
        assert_eq!(performance.solution_length, Some(6));
    }

    #[test]
    fn test_cbs_corridor_swap_is_infeasible() {
        init_tracing();
        let agents = vec![agent(0, (0, 0), (2, 0)), agent(1, (2, 0), (0, 0))];
        let (node, performance) = run(agents, ObstacleMap::new(1, 3));
        assert!(node.is_none());
        assert!(performance.high_level);
        assert!(!performance.found_solution());
    }

    #[test]
    fn test_cbs_independent_agents() {
        init_tracing();
        let agents = vec![agent(0, (0, 0), (3, 0)), agent(1, (0, 2), (3, 2))];
        let (node, _) = run(agents.clone(), ObstacleMap::new(3, 4));
        let node = node.unwrap();

        assert_eq!(node.parent(), None);
        assert!(node.constraint().is_none());
        assert_eq!(node.cost(), Some(6.0));
        assert_eq!(node.performance().len(), 2);
    }

    #[test]
    fn test_cbs_room_map() {
        init_tracing();
        let map = ObstacleMap::from_file("map_file/test/room-5-5.map").unwrap();
        let agents = crate::scenario::Scenario::load_agents_from_yaml(
            "map_file/test/agents-room-5-5.yaml",
        )
        .unwrap();
        let (node, _) = run(agents.clone(), map.clone());
        let node = node.unwrap();

        let solution = Solution {
            cost: node.cost().unwrap_or_default(),
            paths: node.into_solution(),
        };
        assert!(solution.verify(&map, &agents));
    }

    #[test]
    fn test_cbs_rejects_bad_configuration() {
        let map = Arc::new(ObstacleMap::new(3, 3));
        let duplicate_id = CbsConfig::new(
            vec![agent(0, (0, 0), (1, 1)), agent(0, (2, 2), (0, 2))],
            map.clone(),
        );
        assert_eq!(
            Cbs::new(duplicate_id).err().map(|e| e.to_string()),
            Some(SearchError::DuplicateAgent(0).to_string())
        );

        let shared_goal = CbsConfig::new(
            vec![agent(0, (0, 0), (1, 1)), agent(1, (2, 2), (1, 1))],
            map.clone(),
        );
        assert!(matches!(
            Cbs::new(shared_goal),
            Err(SearchError::DuplicateGoal { first: 0, second: 1 })
        ));

        let outside = CbsConfig::new(vec![agent(0, (0, 0), (1, 5))], map);
        assert!(matches!(
            Cbs::new(outside),
            Err(SearchError::OutOfBounds { what: "goal", .. })
        ));
    }

    #[test]
    fn test_duplicate_constraints_are_not_branched_twice() {
        let agents = vec![agent(0, (0, 0), (2, 0)), agent(1, (2, 0), (0, 0))];
        let mut cbs = Cbs::new(CbsConfig::new(agents, Arc::new(ObstacleMap::new(2, 3)))).unwrap();
        let root = cbs.initialize().unwrap().unwrap().into_tree_node().unwrap();
        let conflict = SolutionValidator.validate(root.solution())[0].clone();

        // Pretend agent 0 was already constrained for this conflict further up.
        let constraint = Cbs::constraint_for(&conflict, 0);
        cbs.tree.push(root.clone());
        let mut constrained = root.child(0, constraint.clone());
        cbs.score(&mut constrained);
        assert!(cbs.branch_constraints(Some(0)).is_empty());

        let mut open = OpenList::new();
        assert!(!cbs
            .expand(GraphVertex::TreeNode(Box::new(constrained)), &mut open)
            .unwrap());

        // Only agent 1 gets a new child; agent 0's constraint is already on the branch.
        assert_eq!(cbs.branch_constraints(Some(1)), vec![constraint]);
        assert_eq!(open.len(), 1);
        let child = open.pop().unwrap().into_tree_node().unwrap();
        assert_eq!(child.constraint().map(|c| c.agent), Some(1));
    }

    #[test]
    fn test_edge_conflict_constraint_targets_other_agents_cell() {
        let conflict = Conflict {
            time: 3,
            object: GraphObject::edge((1, 0), (0, 0)),
            agents: [(0, Location::new(1, 0, 4)), (1, Location::new(0, 0, 4))]
                .into_iter()
                .collect(),
        };
        let c0 = Cbs::constraint_for(&conflict, 0);
        assert_eq!(c0.vertex, Location::new(1, 0, 4));
        assert_eq!(c0.next_vertices, vec![Location::new(0, 0, 4)]);

        let c1 = Cbs::constraint_for(&conflict, 1);
        assert_eq!(c1.vertex, Location::new(0, 0, 4));
    }
}
