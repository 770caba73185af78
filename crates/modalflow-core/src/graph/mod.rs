//! # Execution Graph
//!
//! DAG registry for operators: ID assignment, forward and reverse
//! adjacency, cycle detection, deterministic topological ordering.
//!
//! ## Invariants
//!
//! - Reverse adjacency is the exact transpose of forward adjacency at all
//!   times.
//! - Every edge endpoint exists in the operator map.
//! - After a successful [`ExecutionGraph::validate`], the graph is acyclic
//!   and the engine never mutates it between validation and execution.
//!
//! Operators are owned by the graph; external handles are [`OperatorId`]s,
//! and the ID lookup is the only way to dereference one.

use std::fmt;

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::operator::Operator;

#[cfg(test)]
mod tests;

/// Engine-assigned operator identifier, sequential within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorId(pub u64);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Errors from structural graph mutation.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An edge endpoint does not exist in the operator map.
    #[error("unknown operator: {0}")]
    UnknownOperator(OperatorId),
}

/// Adjacency list; inline capacity covers typical fan-out.
pub type Adjacency = SmallVec<[OperatorId; 4]>;

/// DAG registry of operators with forward and reverse adjacency.
pub struct ExecutionGraph {
    operators: FxHashMap<OperatorId, Box<dyn Operator>>,
    adjacency: FxHashMap<OperatorId, Adjacency>,
    reverse_adjacency: FxHashMap<OperatorId, Adjacency>,
    /// Registration order, so iteration and topological tie-breaks are
    /// deterministic for a fixed construction sequence.
    insertion_order: Vec<OperatorId>,
    next_operator_id: u64,
}

impl fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("operator_count", &self.operators.len())
            .field("edge_count", &self.adjacency.values().map(SmallVec::len).sum::<usize>())
            .finish_non_exhaustive()
    }
}

impl ExecutionGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operators: FxHashMap::default(),
            adjacency: FxHashMap::default(),
            reverse_adjacency: FxHashMap::default(),
            insertion_order: Vec::new(),
            next_operator_id: 0,
        }
    }

    /// Registers an operator, assigning the next sequential ID and empty
    /// adjacency entries.
    pub fn add_operator(&mut self, operator: Box<dyn Operator>) -> OperatorId {
        let id = OperatorId(self.next_operator_id);
        self.next_operator_id += 1;
        self.operators.insert(id, operator);
        self.adjacency.insert(id, SmallVec::new());
        self.reverse_adjacency.insert(id, SmallVec::new());
        self.insertion_order.push(id);
        id
    }

    /// Connects two registered operators. Duplicate edges are allowed and
    /// model replicated fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownOperator`] if either endpoint is not
    /// registered.
    pub fn connect(&mut self, source: OperatorId, target: OperatorId) -> Result<(), GraphError> {
        if !self.operators.contains_key(&source) {
            return Err(GraphError::UnknownOperator(source));
        }
        if !self.operators.contains_key(&target) {
            return Err(GraphError::UnknownOperator(target));
        }
        self.adjacency.entry(source).or_default().push(target);
        self.reverse_adjacency.entry(target).or_default().push(source);
        Ok(())
    }

    /// Erases an operator and scrubs every occurrence of its ID from both
    /// adjacency maps.
    pub fn remove_operator(&mut self, id: OperatorId) {
        self.operators.remove(&id);
        self.adjacency.remove(&id);
        self.reverse_adjacency.remove(&id);
        self.insertion_order.retain(|&other| other != id);
        for successors in self.adjacency.values_mut() {
            successors.retain(|&mut other| other != id);
        }
        for predecessors in self.reverse_adjacency.values_mut() {
            predecessors.retain(|&mut other| other != id);
        }
    }

    /// Number of registered operators.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Whether the graph has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Looks up an operator.
    #[must_use]
    pub fn operator(&self, id: OperatorId) -> Option<&dyn Operator> {
        self.operators.get(&id).map(AsRef::as_ref)
    }

    /// Looks up an operator mutably.
    pub fn operator_mut(&mut self, id: OperatorId) -> Option<&mut Box<dyn Operator>> {
        self.operators.get_mut(&id)
    }

    /// Registered operator IDs in registration order.
    #[must_use]
    pub fn operator_ids(&self) -> &[OperatorId] {
        &self.insertion_order
    }

    /// Read-only view of an operator's successors, in connect order.
    #[must_use]
    pub fn successors(&self, id: OperatorId) -> &[OperatorId] {
        self.adjacency.get(&id).map_or(&[], SmallVec::as_slice)
    }

    /// Read-only view of an operator's predecessors, in connect order.
    #[must_use]
    pub fn predecessors(&self, id: OperatorId) -> &[OperatorId] {
        self.reverse_adjacency.get(&id).map_or(&[], SmallVec::as_slice)
    }

    /// Operators with no predecessors, in registration order.
    #[must_use]
    pub fn sources(&self) -> Vec<OperatorId> {
        self.insertion_order
            .iter()
            .copied()
            .filter(|id| self.predecessors(*id).is_empty())
            .collect()
    }

    /// Operators with no successors, in registration order.
    #[must_use]
    pub fn sinks(&self) -> Vec<OperatorId> {
        self.insertion_order
            .iter()
            .copied()
            .filter(|id| self.successors(*id).is_empty())
            .collect()
    }

    /// Depth-first topological order (post-order reversed), deterministic
    /// for a fixed construction sequence: successors are visited in
    /// connect order and unvisited roots in ascending ID order.
    ///
    /// Returns the empty vector if a back-edge is found; callers treat
    /// that sentinel as a cycle.
    #[must_use]
    pub fn topological_order(&self) -> Vec<OperatorId> {
        let mut visited = FxHashSet::default();
        let mut in_stack = FxHashSet::default();
        let mut post_order = Vec::with_capacity(self.operators.len());

        let mut roots: Vec<OperatorId> = self.insertion_order.clone();
        roots.sort_unstable();

        for root in roots {
            if !visited.contains(&root)
                && self.visit(root, &mut visited, &mut in_stack, &mut post_order)
            {
                return Vec::new();
            }
        }

        post_order.reverse();
        post_order
    }

    /// DFS helper; returns `true` when a back-edge (cycle) is found.
    fn visit(
        &self,
        id: OperatorId,
        visited: &mut FxHashSet<OperatorId>,
        in_stack: &mut FxHashSet<OperatorId>,
        post_order: &mut Vec<OperatorId>,
    ) -> bool {
        visited.insert(id);
        in_stack.insert(id);

        for &succ in self.successors(id) {
            if in_stack.contains(&succ) {
                return true;
            }
            if !visited.contains(&succ) && self.visit(succ, visited, in_stack, post_order) {
                return true;
            }
        }

        in_stack.remove(&id);
        post_order.push(id);
        false
    }

    /// Whether the graph is executable: empty, or acyclic.
    #[must_use]
    pub fn validate(&self) -> bool {
        self.is_empty() || !self.topological_order().is_empty()
    }

    /// Moves all operators out of the graph, keyed by ID. Used by the
    /// engine when it takes ownership of a submitted graph.
    pub(crate) fn take_operators(&mut self) -> FxHashMap<OperatorId, Box<dyn Operator>> {
        std::mem::take(&mut self.operators)
    }

    /// Absorbs another graph: its operators are re-registered here under
    /// fresh IDs and its edges are rewired accordingly. Returns the
    /// old-ID to new-ID mapping.
    pub(crate) fn merge_from(&mut self, mut other: ExecutionGraph) -> FxHashMap<OperatorId, OperatorId> {
        let mut mapping: FxHashMap<OperatorId, OperatorId> = FxHashMap::default();
        let order = other.insertion_order.clone();
        let mut operators = other.take_operators();
        for old_id in &order {
            if let Some(op) = operators.remove(old_id) {
                mapping.insert(*old_id, self.add_operator(op));
            }
        }
        for old_source in &order {
            for old_target in other.successors(*old_source).to_vec() {
                if let (Some(&new_source), Some(&new_target)) =
                    (mapping.get(old_source), mapping.get(&old_target))
                {
                    // Both endpoints were just registered.
                    let _ = self.connect(new_source, new_target);
                }
            }
        }
        mapping
    }
}

impl Default for ExecutionGraph {
    fn default() -> Self {
        Self::new()
    }
}
