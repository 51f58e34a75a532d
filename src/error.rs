use std::fmt;

/// Errors raised while building or running a search.
///
/// Configuration variants are returned from constructors. The vertex-kind
/// variants can only surface inside a running search and abort `plan()`.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    OutOfBounds { what: &'static str, x: i32, y: i32 },
    DuplicateAgent(usize),
    DuplicateGoal { first: usize, second: usize },
    NegativeElapsedTime { from: usize, to: usize },
    InvalidDirection { dx: i32, dy: i32 },
    WrongVertexKind {
        expected: &'static str,
        found: &'static str,
    },
    UnscoredVertex,
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::OutOfBounds { what, x, y } => {
                write!(f, "Bad configuration: {what} ({x}, {y}) is outside the map")
            }
            SearchError::DuplicateAgent(id) => {
                write!(f, "Bad configuration: agent id {id} is used more than once")
            }
            SearchError::DuplicateGoal { first, second } => {
                write!(f, "Bad configuration: agents {first} and {second} share a goal cell")
            }
            SearchError::NegativeElapsedTime { from, to } => write!(
                f,
                "Jump point segment runs backwards in time (t={from} to t={to})"
            ),
            SearchError::InvalidDirection { dx, dy } => {
                write!(f, "Direction ({dx}, {dy}) is not a unit step")
            }
            SearchError::WrongVertexKind { expected, found } => {
                write!(f, "Expected a {expected} vertex, got a {found} vertex")
            }
            SearchError::UnscoredVertex => {
                write!(f, "Vertex pushed to the open list before its cost was set")
            }
        }
    }
}

impl std::error::Error for SearchError {}

pub type SearchResult<T> = Result<T, SearchError>;
