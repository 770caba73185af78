//! Unit tests for graph topology: adjacency transposition, cycle
//! detection, topological ordering, and source/sink classification.

use crate::function::FnMap;
use crate::message::Message;
use crate::operator::{MapOperator, Operator};

use super::*;

/// A pass-through operator for topology tests.
fn node(name: &str) -> Box<dyn Operator> {
    Box::new(MapOperator::new(name, Box::new(FnMap::new(name, Ok::<Message, _>))))
}

#[test]
fn empty_graph_is_valid() {
    let graph = ExecutionGraph::new();
    assert!(graph.is_empty());
    assert!(graph.validate());
    assert!(graph.topological_order().is_empty());
    assert!(graph.sources().is_empty());
    assert!(graph.sinks().is_empty());
}

#[test]
fn ids_are_sequential() {
    let mut graph = ExecutionGraph::new();
    assert_eq!(graph.add_operator(node("a")), OperatorId(0));
    assert_eq!(graph.add_operator(node("b")), OperatorId(1));
    assert_eq!(graph.add_operator(node("c")), OperatorId(2));
    assert_eq!(graph.operator_count(), 3);
}

#[test]
fn connect_rejects_unknown_endpoints() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    assert!(matches!(
        graph.connect(a, OperatorId(99)),
        Err(GraphError::UnknownOperator(OperatorId(99)))
    ));
    assert!(matches!(
        graph.connect(OperatorId(99), a),
        Err(GraphError::UnknownOperator(OperatorId(99)))
    ));
}

#[test]
fn adjacency_is_transposed() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    let c = graph.add_operator(node("c"));
    graph.connect(a, b).unwrap();
    graph.connect(a, c).unwrap();
    graph.connect(b, c).unwrap();

    // b ∈ forward[a] iff a ∈ reverse[b], for every pair.
    for &x in graph.operator_ids() {
        for &succ in graph.successors(x) {
            assert!(graph.predecessors(succ).contains(&x));
        }
        for &pred in graph.predecessors(x) {
            assert!(graph.successors(pred).contains(&x));
        }
    }
    assert_eq!(graph.successors(a), &[b, c]);
    assert_eq!(graph.predecessors(c), &[a, b]);
}

#[test]
fn multi_edges_are_kept() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    graph.connect(a, b).unwrap();
    graph.connect(a, b).unwrap();

    assert_eq!(graph.successors(a), &[b, b]);
    assert_eq!(graph.predecessors(b), &[a, a]);
    assert!(graph.validate());
}

#[test]
fn topological_order_is_a_valid_permutation() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    let c = graph.add_operator(node("c"));
    let d = graph.add_operator(node("d"));
    graph.connect(a, b).unwrap();
    graph.connect(a, c).unwrap();
    graph.connect(b, d).unwrap();
    graph.connect(c, d).unwrap();

    let order = graph.topological_order();
    assert_eq!(order.len(), 4);

    let pos = |id: OperatorId| order.iter().position(|&x| x == id).unwrap();
    for &x in graph.operator_ids() {
        for &succ in graph.successors(x) {
            assert!(pos(x) < pos(succ), "{x} must precede {succ}");
        }
    }
}

#[test]
fn topological_order_is_deterministic() {
    let build = || {
        let mut graph = ExecutionGraph::new();
        let a = graph.add_operator(node("a"));
        let b = graph.add_operator(node("b"));
        let c = graph.add_operator(node("c"));
        graph.connect(a, c).unwrap();
        graph.connect(b, c).unwrap();
        graph
    };
    assert_eq!(build().topological_order(), build().topological_order());
}

#[test]
fn cycle_yields_empty_sentinel() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    graph.connect(a, b).unwrap();
    graph.connect(b, a).unwrap();

    assert!(graph.topological_order().is_empty());
    assert!(!graph.validate());
}

#[test]
fn self_loop_is_a_cycle() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    graph.connect(a, a).unwrap();
    assert!(!graph.validate());
}

#[test]
fn sources_and_sinks_by_connectivity() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    let c = graph.add_operator(node("c"));
    graph.connect(a, b).unwrap();
    graph.connect(b, c).unwrap();

    assert_eq!(graph.sources(), vec![a]);
    assert_eq!(graph.sinks(), vec![c]);

    // An isolated node is both.
    let d = graph.add_operator(node("d"));
    assert_eq!(graph.sources(), vec![a, d]);
    assert_eq!(graph.sinks(), vec![c, d]);
}

#[test]
fn remove_operator_scrubs_adjacency() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    let c = graph.add_operator(node("c"));
    graph.connect(a, b).unwrap();
    graph.connect(b, c).unwrap();
    graph.connect(a, c).unwrap();

    graph.remove_operator(b);

    assert_eq!(graph.operator_count(), 2);
    assert!(graph.operator(b).is_none());
    assert_eq!(graph.successors(a), &[c]);
    assert_eq!(graph.predecessors(c), &[a]);
    assert!(!graph.operator_ids().contains(&b));
}

#[test]
fn removing_a_cycle_member_restores_validity() {
    let mut graph = ExecutionGraph::new();
    let a = graph.add_operator(node("a"));
    let b = graph.add_operator(node("b"));
    graph.connect(a, b).unwrap();
    graph.connect(b, a).unwrap();
    assert!(!graph.validate());

    graph.remove_operator(b);
    assert!(graph.validate());
}
