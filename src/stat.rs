use serde::Serialize;
use tracing::info;

/// Figures recorded by the search driver for one `plan()` call.
///
/// Everything except the run time stays `None` when no solution was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPerformance {
    pub time_ms: u64,
    pub nodes_expanded: Option<usize>,
    pub solution_length: Option<usize>,
    pub solution_cost: Option<f64>,
    pub high_level: bool,
}

impl SearchPerformance {
    pub fn found_solution(&self) -> bool {
        self.solution_length.is_some()
    }

    pub fn print(&self) {
        let level = if self.high_level { "high" } else { "low" };
        info!(
            "{level} level search: time(ms) {} expanded nodes {:?} solution length {:?} cost {:?}",
            self.time_ms, self.nodes_expanded, self.solution_length, self.solution_cost
        );
    }
}
