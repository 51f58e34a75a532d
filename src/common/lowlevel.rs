use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use super::highlevel::ConstraintTreeNode;
use super::Location;
use crate::error::{SearchError, SearchResult};

/// Index of an expanded vertex inside the arena of the search that owns it.
pub type VertexId = usize;

/// Spacetime search vertex for the single-agent searches.
///
/// Equality and hashing only look at the cell. Use
/// [`LocationVertex::equals_with_time`] when the timestep matters.
#[derive(Debug, Clone)]
pub struct LocationVertex {
    location: Location,
    g: Option<f64>,
    h: Option<f64>,
    parent: Option<VertexId>,
}

impl LocationVertex {
    pub fn new(location: Location) -> Self {
        LocationVertex {
            location,
            g: None,
            h: None,
            parent: None,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn x(&self) -> i32 {
        self.location.x
    }

    pub fn y(&self) -> i32 {
        self.location.y
    }

    pub fn t(&self) -> usize {
        self.location.t
    }

    pub fn g(&self) -> Option<f64> {
        self.g
    }

    pub fn h(&self) -> Option<f64> {
        self.h
    }

    /// `f = g + h`, or `None` until both scores are set.
    pub fn cost(&self) -> Option<f64> {
        Some(self.g? + self.h?)
    }

    pub fn set_scores(&mut self, g: f64, h: f64) {
        self.g = Some(g);
        self.h = Some(h);
    }

    pub fn parent(&self) -> Option<VertexId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<VertexId>) {
        self.parent = parent;
    }

    pub fn equals_with_time(&self, other: &LocationVertex) -> bool {
        self.location == other.location
    }
}

impl PartialEq for LocationVertex {
    fn eq(&self, other: &Self) -> bool {
        self.location.same_cell(&other.location)
    }
}

impl Eq for LocationVertex {}

impl Hash for LocationVertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.cell().hash(state);
    }
}

/// Anything the generic driver can hold in its open list.
#[derive(Debug, Clone)]
pub enum GraphVertex {
    Location(LocationVertex),
    TreeNode(Box<ConstraintTreeNode>),
}

impl GraphVertex {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphVertex::Location(_) => "location",
            GraphVertex::TreeNode(_) => "constraint tree",
        }
    }

    pub fn cost(&self) -> Option<f64> {
        match self {
            GraphVertex::Location(v) => v.cost(),
            GraphVertex::TreeNode(node) => node.cost(),
        }
    }

    pub fn parent(&self) -> Option<VertexId> {
        match self {
            GraphVertex::Location(v) => v.parent(),
            GraphVertex::TreeNode(node) => node.parent(),
        }
    }

    // Secondary key among equal costs. Tree nodes with fewer conflicts come first.
    fn tie_break(&self) -> usize {
        match self {
            GraphVertex::Location(_) => 0,
            GraphVertex::TreeNode(node) => node.conflict_count(),
        }
    }

    pub fn into_location(self) -> SearchResult<LocationVertex> {
        match self {
            GraphVertex::Location(v) => Ok(v),
            other => Err(SearchError::WrongVertexKind {
                expected: "location",
                found: other.kind(),
            }),
        }
    }

    pub fn into_tree_node(self) -> SearchResult<ConstraintTreeNode> {
        match self {
            GraphVertex::TreeNode(node) => Ok(*node),
            other => Err(SearchError::WrongVertexKind {
                expected: "constraint tree",
                found: other.kind(),
            }),
        }
    }
}

#[derive(Debug)]
struct OpenEntry {
    cost: OrderedFloat<f64>,
    tie_break: usize,
    seq: u64,
    vertex: GraphVertex,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .cmp(&other.cost)
            .then_with(|| self.tie_break.cmp(&other.tie_break))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Min-ordered open list: cost, then the vertex tie-break, then insertion order.
#[derive(Debug, Default)]
pub struct OpenList {
    entries: BTreeSet<OpenEntry>,
    next_seq: u64,
}

impl OpenList {
    pub fn new() -> Self {
        OpenList::default()
    }

    pub fn push(&mut self, vertex: GraphVertex) -> SearchResult<()> {
        let cost = vertex.cost().ok_or(SearchError::UnscoredVertex)?;
        let entry = OpenEntry {
            cost: OrderedFloat(cost),
            tie_break: vertex.tie_break(),
            seq: self.next_seq,
            vertex,
        };
        self.next_seq += 1;
        self.entries.insert(entry);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<GraphVertex> {
        self.entries.pop_first().map(|entry| entry.vertex)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(x: i32, g: f64, h: f64) -> GraphVertex {
        let mut v = LocationVertex::new(Location::new(x, 0, 0));
        v.set_scores(g, h);
        GraphVertex::Location(v)
    }

    #[test]
    fn test_equality_ignores_time() {
        let a = LocationVertex::new(Location::new(1, 2, 0));
        let b = LocationVertex::new(Location::new(1, 2, 7));
        assert_eq!(a, b);
        assert!(!a.equals_with_time(&b));
        assert!(a.equals_with_time(&a.clone()));
    }

    #[test]
    fn test_cost_is_uninitialized_until_scored() {
        let mut v = LocationVertex::new(Location::new(0, 0, 0));
        assert_eq!(v.cost(), None);
        v.set_scores(1.5, 2.0);
        assert_eq!(v.cost(), Some(3.5));
    }

    #[test]
    fn test_open_list_orders_by_cost_then_fifo() {
        let mut open = OpenList::new();
        open.push(scored(0, 3.0, 1.0)).unwrap();
        open.push(scored(1, 1.0, 1.0)).unwrap();
        open.push(scored(2, 2.0, 0.0)).unwrap();
        open.push(scored(3, 0.5, 0.0)).unwrap();
        assert_eq!(open.len(), 4);

        let order: Vec<i32> = std::iter::from_fn(|| open.pop())
            .map(|v| v.into_location().unwrap().x())
            .collect();
        // x=1 and x=2 tie on cost 2.0; x=1 was pushed first.
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert!(open.is_empty());
    }

    #[test]
    fn test_open_list_rejects_unscored_vertex() {
        let mut open = OpenList::new();
        let v = GraphVertex::Location(LocationVertex::new(Location::new(0, 0, 0)));
        assert_eq!(open.push(v), Err(SearchError::UnscoredVertex));
    }

    #[test]
    fn test_wrong_vertex_kind() {
        let v = scored(0, 0.0, 0.0);
        let err = v.into_tree_node().unwrap_err();
        assert_eq!(
            err,
            SearchError::WrongVertexKind {
                expected: "constraint tree",
                found: "location"
            }
        );
    }
}
