use std::f64::consts::SQRT_2;

use super::{LowLevelContext, SuccessorStrategy, DIRECTIONS};
use crate::common::{Location, LocationVertex};

/// Plain spacetime A*: every compass move or a wait, one timestep each.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AStarSuccessors;

impl SuccessorStrategy for AStarSuccessors {
    const NAME: &'static str = "a_star";

    fn find_successors(&self, ctx: &LowLevelContext, current: &LocationVertex) -> Vec<Location> {
        let t = current.t() + 1;
        DIRECTIONS
            .iter()
            .map(|&(dx, dy)| Location::new(current.x() + dx, current.y() + dy, t))
            .filter(|next| !ctx.check_if_blocked(next.x, next.y, next.t))
            .collect()
    }

    fn calculate_g_score(
        &self,
        _ctx: &LowLevelContext,
        current: &LocationVertex,
        successor: &Location,
    ) -> f64 {
        let step = if LowLevelContext::check_if_diagonal(
            successor.x - current.x(),
            successor.y - current.y(),
        ) {
            SQRT_2
        } else {
            1.0
        };
        current.g().unwrap_or(0.0) + step
    }
}
