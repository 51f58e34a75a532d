//! Jump Point Search over `(x, y, t)`.
//!
//! Besides the usual straight and diagonal jumps, a jump with direction
//! `(0, 0)` waits in place until some spatial jump becomes available. Other
//! agents' reservations arrive as jump point constraints and are checked
//! against every cell a jump passes through. While such a reservation, or an
//! enforced constraint, can still be reached, expansion takes unit steps.

use std::f64::consts::SQRT_2;

use super::{LowLevelContext, SuccessorStrategy, DIRECTIONS};
use crate::common::{AgentPath, Location, LocationVertex};

/// Deepest nesting of jump helpers before a jump gives up.
pub(crate) const MAX_JUMP_DEPTH: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct JpsSuccessors;

impl SuccessorStrategy for JpsSuccessors {
    const NAME: &'static str = "jps";

    fn find_successors(&self, ctx: &LowLevelContext, current: &LocationVertex) -> Vec<Location> {
        let from = current.location();
        // Jumps skip cells, so a detour or a wait can be missed while some
        // timed block is still in range.
        if ctx.time_blocks_ahead(&from) {
            return unit_steps(ctx, from);
        }

        let mut successors: Vec<Location> = Vec::new();
        for &(dx, dy) in DIRECTIONS.iter() {
            if let Some(jump_point) = jump(ctx, from, dx, dy, 0) {
                if !successors.contains(&jump_point) {
                    successors.push(jump_point);
                }
            }
        }
        if successors.is_empty() {
            return unit_steps(ctx, from);
        }
        successors
    }

    fn calculate_g_score(
        &self,
        ctx: &LowLevelContext,
        current: &LocationVertex,
        successor: &Location,
    ) -> f64 {
        let dx = (successor.x - current.x()).unsigned_abs() as usize;
        let dy = (successor.y - current.y()).unsigned_abs() as usize;
        let dt = successor.t.saturating_sub(current.t());

        let diagonal = dx.min(dy);
        let straight = dx.max(dy) - diagonal;
        let waits = if ctx.is_goal_cell(successor.x, successor.y) {
            0
        } else {
            dt.saturating_sub(dx.max(dy))
        };
        current.g().unwrap_or(0.0) + diagonal as f64 * SQRT_2 + (straight + waits) as f64
    }

    fn optionally_pad_path(&self, path: AgentPath) -> AgentPath {
        pad_path(path)
    }
}

/// Every single move or wait out of `from` that nothing blocks.
fn unit_steps(ctx: &LowLevelContext, from: Location) -> Vec<Location> {
    DIRECTIONS
        .iter()
        .map(|&(dx, dy)| (Location::new(from.x + dx, from.y + dy, from.t + 1), dx, dy))
        .filter(|(next, dx, dy)| {
            !ctx.check_if_blocked(next.x, next.y, next.t)
                && !ctx.blocked_by_jump_point(next, *dx, *dy)
        })
        .map(|(next, _, _)| next)
        .collect()
}

/// Re-inserts the unit steps a jump skipped. Moves come first, then waits.
pub(crate) fn pad_path(path: AgentPath) -> AgentPath {
    let steps = path.steps();
    let Some(&last) = steps.last() else {
        return path;
    };

    let mut padded = Vec::with_capacity(last.t + 1);
    for pair in steps.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let step_x = (to.x - from.x).signum();
        let step_y = (to.y - from.y).signum();
        let mut cursor = from;
        while cursor.t < to.t {
            padded.push(cursor);
            if cursor.x != to.x {
                cursor.x += step_x;
            }
            if cursor.y != to.y {
                cursor.y += step_y;
            }
            cursor.t += 1;
        }
    }
    padded.push(last);
    AgentPath::new(padded)
}

fn stopped(ctx: &LowLevelContext, depth: usize) -> bool {
    depth > MAX_JUMP_DEPTH || ctx.cancel.is_cancelled()
}

/// Jumps from `from` in direction `(dx, dy)`. Returns the next jump point.
fn jump(ctx: &LowLevelContext, from: Location, dx: i32, dy: i32, depth: usize) -> Option<Location> {
    if stopped(ctx, depth) {
        return None;
    }

    let next = Location::new(from.x + dx, from.y + dy, from.t + 1);
    if ctx.check_if_blocked(next.x, next.y, next.t) || ctx.blocked_by_jump_point(&next, dx, dy) {
        return None;
    }

    if ctx.is_goal_cell(next.x, next.y) {
        return match ctx.goal_time {
            None => Some(next),
            Some(_) => check_time(ctx, next, from, depth + 1),
        };
    }

    match (dx, dy) {
        (0, 0) => check_time(ctx, next, from, depth + 1),
        (0, _) => check_vertical(ctx, next, dy, depth + 1),
        (_, 0) => check_horizontal(ctx, next, dx, depth + 1),
        _ => check_diagonal(ctx, next, dx, dy, depth + 1),
    }
}

/// Waits on `next`'s cell until a spatial jump opens up, the cell is
/// reserved, or the goal time passes.
fn check_time(
    ctx: &LowLevelContext,
    next: Location,
    from: Location,
    depth: usize,
) -> Option<Location> {
    if stopped(ctx, depth) {
        return None;
    }

    let mut last = from;
    let mut offset = next;
    while !ctx.check_if_blocked(offset.x, offset.y, offset.t) {
        let can_move = DIRECTIONS
            .iter()
            .filter(|&&dir| dir != (0, 0))
            .any(|&(dx, dy)| jump(ctx, offset, dx, dy, depth + 1).is_some());
        if can_move {
            return Some(offset);
        }

        last = offset;
        let t = offset.t + 1;
        if ctx.goal_time.is_some_and(|goal_t| t > goal_t) {
            break;
        }
        if ctx.cancel.is_cancelled() {
            return None;
        }

        offset = offset.at(t);
        if ctx.blocked_by_jump_point(&offset, 0, 0) {
            return Some(last);
        }
        if ctx.is_goal_cell(offset.x, offset.y) && ctx.goal_time == Some(t) {
            return Some(offset);
        }
    }
    Some(last)
}

fn check_horizontal(
    ctx: &LowLevelContext,
    next: Location,
    dx: i32,
    depth: usize,
) -> Option<Location> {
    if stopped(ctx, depth) {
        return None;
    }

    let mut offset = next;
    while ctx.map.contains_xy(offset.x, offset.y) {
        let (x, y, t) = (offset.x, offset.y, offset.t);
        // Forced neighbours above and below the travel axis.
        if !ctx.check_if_blocked(x + dx, y + 1, t + 1) && ctx.check_if_blocked(x, y + 1, t) {
            return Some(offset);
        }
        if !ctx.check_if_blocked(x + dx, y - 1, t + 1) && ctx.check_if_blocked(x, y - 1, t) {
            return Some(offset);
        }
        if ctx.cancel.is_cancelled() {
            return None;
        }

        let last = offset;
        offset = Location::new(x + dx, y, t + 1);
        if let Some(stop) = step_outcome(ctx, last, offset, dx, 0) {
            return stop;
        }
    }
    None
}

fn check_vertical(
    ctx: &LowLevelContext,
    next: Location,
    dy: i32,
    depth: usize,
) -> Option<Location> {
    if stopped(ctx, depth) {
        return None;
    }

    let mut offset = next;
    while ctx.map.contains_xy(offset.x, offset.y) {
        let (x, y, t) = (offset.x, offset.y, offset.t);
        if !ctx.check_if_blocked(x + 1, y + dy, t + 1) && ctx.check_if_blocked(x + 1, y, t) {
            return Some(offset);
        }
        if !ctx.check_if_blocked(x - 1, y + dy, t + 1) && ctx.check_if_blocked(x - 1, y, t) {
            return Some(offset);
        }
        if ctx.cancel.is_cancelled() {
            return None;
        }

        let last = offset;
        offset = Location::new(x, y + dy, t + 1);
        if let Some(stop) = step_outcome(ctx, last, offset, 0, dy) {
            return stop;
        }
    }
    None
}

fn check_diagonal(
    ctx: &LowLevelContext,
    next: Location,
    dx: i32,
    dy: i32,
    depth: usize,
) -> Option<Location> {
    if stopped(ctx, depth) {
        return None;
    }

    let mut offset = next;
    while ctx.map.contains_xy(offset.x, offset.y) {
        let (x, y, t) = (offset.x, offset.y, offset.t);
        if !ctx.check_if_blocked(x - dx, y + dy, t + 1) && ctx.check_if_blocked(x - dx, y, t) {
            return Some(offset);
        }
        if !ctx.check_if_blocked(x + dx, y - dy, t + 1) && ctx.check_if_blocked(x, y - dy, t) {
            return Some(offset);
        }
        // A straight jump out of this cell finding something makes it a jump point.
        if jump(ctx, offset, dx, 0, depth + 1).is_some()
            || jump(ctx, offset, 0, dy, depth + 1).is_some()
        {
            return Some(offset);
        }
        if ctx.cancel.is_cancelled() {
            return None;
        }

        let last = offset;
        offset = Location::new(x + dx, y + dy, t + 1);
        if let Some(stop) = step_outcome(ctx, last, offset, dx, dy) {
            return stop;
        }
    }
    None
}

// What happens after stepping from `last` onto `offset`. `None` means keep going.
fn step_outcome(
    ctx: &LowLevelContext,
    last: Location,
    offset: Location,
    dx: i32,
    dy: i32,
) -> Option<Option<Location>> {
    if !ctx.map.contains_xy(offset.x, offset.y) {
        return Some(None);
    }
    if ctx.check_if_blocked(offset.x, offset.y, offset.t)
        || ctx.blocked_by_jump_point(&offset, dx, dy)
    {
        return Some(Some(last));
    }
    if ctx.is_goal_cell(offset.x, offset.y) {
        return Some(Some(offset));
    }
    None
}
