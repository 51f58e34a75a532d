use std::collections::BTreeMap;
use tracing::trace;

use crate::common::{AgentPath, Conflict, GraphObject, Location};

/// Finds vertex and swap conflicts in a joint solution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolutionValidator;

impl SolutionValidator {
    /// Conflicts ordered by time, vertex conflicts before edge conflicts.
    /// Agents whose paths end early are treated as waiting on their last cell.
    pub fn validate(&self, solution: &BTreeMap<usize, AgentPath>) -> Vec<Conflict> {
        let last_timestep = solution
            .values()
            .map(AgentPath::last_timestep)
            .max()
            .unwrap_or(0);

        let mut conflicts = Vec::new();
        for t in 0..=last_timestep {
            let positions: Vec<(usize, Location, Location)> = solution
                .iter()
                .filter_map(|(&agent, path)| Some((agent, path.at(t)?, path.at(t + 1)?)))
                .collect();

            let mut occupants: BTreeMap<(i32, i32), BTreeMap<usize, Location>> = BTreeMap::new();
            for &(agent, current, next) in &positions {
                occupants
                    .entry(current.cell())
                    .or_default()
                    .insert(agent, next);
            }
            for (cell, agents) in occupants {
                if agents.len() > 1 {
                    conflicts.push(Conflict {
                        time: t,
                        object: GraphObject::Vertex(cell),
                        agents,
                    });
                }
            }

            if t == last_timestep {
                break;
            }

            // Agents crossing the same edge, split by travel direction.
            let mut crossings: BTreeMap<GraphObject, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
            for &(agent, current, next) in &positions {
                if current.same_cell(&next) {
                    continue;
                }
                let edge = GraphObject::edge(current.cell(), next.cell());
                let entry = crossings.entry(edge).or_default();
                if current.cell() < next.cell() {
                    entry.0.push(agent);
                } else {
                    entry.1.push(agent);
                }
            }
            for (edge, (forward, backward)) in crossings {
                if forward.is_empty() || backward.is_empty() {
                    continue;
                }
                let agents = positions
                    .iter()
                    .filter(|(agent, _, _)| forward.contains(agent) || backward.contains(agent))
                    .map(|&(agent, _, next)| (agent, next))
                    .collect();
                conflicts.push(Conflict {
                    time: t,
                    object: edge,
                    agents,
                });
            }
        }

        conflicts.sort_by_key(|c| (c.time, c.object.rank()));
        trace!("found {} conflicts", conflicts.len());
        conflicts
    }
}
