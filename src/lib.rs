//! Dataflow dispatch library.
//!
//! `flowgraph` models a computation as a directed bipartite graph of
//! *data nodes* (named values) and *function nodes* (computations with
//! ordered inputs and outputs), and evaluates the cheapest sub-workflow
//! that connects a set of input values to the requested outputs. The
//! traversal is a Dijkstra variant with readiness gates: a node marked
//! to wait for its inputs is held back until every predecessor has
//! settled, weighted edges and nodes steer the search onto the cheapest
//! alternative, and input-domain predicates let a function decline its
//! arguments so the engine can backtrack onto a longer path.
//!
//! As an example, this system of equations
//!
//! ```text
//! c = b - a
//! d_log = ln(c)            (only defined for c > 0)
//! d = (d_log + d_guess) / 2
//! ```
//!
//! becomes a dispatcher with four data nodes and two functions, solved
//! here from `a = 0` with `b` defaulting to `1` and `d` averaging the
//! log estimate with its initial guess of `4`:
//!
//! ```
//! use flowgraph::{Data, Dispatcher, Func, Value};
//!
//! let mut dsp = Dispatcher::new("example");
//! dsp.add_data(Data::new("b").default_value(1.0)).unwrap();
//! dsp.add_data(
//!     Data::new("d")
//!         .default_value(4.0)
//!         .wait_inputs(true)
//!         .function(|est| {
//!             let xs: Vec<f64> = est.values().filter_map(|v| v.val().copied()).collect();
//!             Ok(Value::Val(xs.iter().sum::<f64>() / xs.len() as f64))
//!         }),
//! )
//! .unwrap();
//! dsp.add_function(
//!     Func::new(|args: &[f64]| Ok(vec![args[1] - args[0]]))
//!         .id("diff")
//!         .inputs(["a", "b"])
//!         .outputs(["c"]),
//! )
//! .unwrap();
//! dsp.add_function(
//!     Func::new(|args: &[f64]| Ok(vec![args[0].ln()]))
//!         .id("log")
//!         .inputs(["c"])
//!         .outputs(["d"])
//!         .input_domain(|args| args[0] > 0.0),
//! )
//! .unwrap();
//!
//! let sol = dsp.dispatch([("a", 0.0)], Some(&["d".into()])).unwrap();
//! assert_eq!(sol.value(&"a".into()), Some(&0.0));
//! assert_eq!(sol.value(&"b".into()), Some(&1.0));
//! assert_eq!(sol.value(&"c".into()), Some(&1.0));
//! assert_eq!(sol.value(&"d".into()), Some(&2.0));
//! ```
//!
//! The returned [`Solution`] also carries the *workflow* (the DAG of
//! edges that actually fired) and the distance map, and a dispatcher can
//! be transformed: [`Dispatcher::shrink_dsp`] computes the
//! sub-dispatcher that would actually run for given inputs and outputs,
//! [`Dispatcher::remove_cycles`] strips edges that could never be
//! scheduled, and [`SubDispatch`] / [`SubDispatchFunction`] expose a
//! dispatcher as a function node of a parent dispatcher.
//!
//! Soft estimation failures (a function erroring, a rejected domain, a
//! wrong arity) are logged through [`tracing`] and skipped, so
//! alternative paths can still complete; constructing the dispatcher
//! with [`Dispatcher::raises`] promotes them to hard errors.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod combinators;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod graph;
pub mod node;
pub mod sub;
pub mod value;

pub use crate::{
    dispatch::{DispatchArgs, Solution, WfNode, Workflow},
    dispatcher::{Data, Dispatcher, Func},
    error::{BuildError, CallError, DispatchError},
    graph::DiGraph,
    node::{
        CallResult, Callable, Callback, DataAttr, DataFunction, FunctionAttr, InputDomain, Node,
        NodeFunction, NodeId, SubCall,
    },
    sub::{replicate_function, OutputType, SubDispatch, SubDispatchFunction},
    value::{Value, ValueMap},
};
