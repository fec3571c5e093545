//! Nested dispatchers exposed as callables.

use flowgraph::{
    replicate_function, Data, DispatchError, Dispatcher, Func, NodeId, OutputType, SubDispatch,
    SubDispatchFunction, ValueMap, WfNode,
};
use indexmap::IndexMap;

fn n(s: &str) -> NodeId {
    NodeId::from(s)
}

/// A recursive value: plain numbers, or maps of further values, which
/// is what lets whole input maps travel through single data nodes.
#[derive(Clone, Debug, PartialEq)]
enum Val {
    Num(f64),
    Map(IndexMap<NodeId, Val>),
}

impl Val {
    fn num(&self) -> f64 {
        match self {
            Val::Num(x) => *x,
            Val::Map(_) => panic!("expected a number"),
        }
    }
}

impl ValueMap for Val {
    fn into_map(self) -> Option<IndexMap<NodeId, Val>> {
        match self {
            Val::Map(m) => Some(m),
            Val::Num(_) => None,
        }
    }

    fn from_map(map: IndexMap<NodeId, Val>) -> Val {
        Val::Map(map)
    }
}

fn plus_minus_child() -> Dispatcher<Val> {
    let mut child = Dispatcher::new("plus-minus");
    child
        .add_function(
            Func::new(|args: &[Val]| {
                let a = args[0].num();
                Ok(vec![Val::Num(a + 1.0), Val::Num(a - 1.0)])
            })
            .id("fun")
            .inputs(["a"])
            .outputs(["b", "c"]),
        )
        .unwrap();
    child
}

#[test]
fn sub_dispatch_feeds_maps_through_a_parent_node() {
    let sub = SubDispatch::new(plus_minus_child())
        .outputs(["a", "b", "c"])
        .output_type(OutputType::Dict);

    let mut parent = Dispatcher::new("parent");
    parent
        .add_function(sub.into_func().id("sub").inputs(["d"]).outputs(["e"]))
        .unwrap();

    let inputs = [(
        "d",
        Val::Map([(n("a"), Val::Num(3.0))].into_iter().collect()),
    )];
    let sol = parent.dispatch(inputs, None).unwrap();

    let expected = Val::Map(
        [
            (n("a"), Val::Num(3.0)),
            (n("b"), Val::Num(4.0)),
            (n("c"), Val::Num(2.0)),
        ]
        .into_iter()
        .collect(),
    );
    assert_eq!(sol.value(&n("e")), Some(&expected));

    // The nested run is recorded on the workflow node.
    match sol.workflow.node(&n("sub")) {
        Some(WfNode::Sub(trace)) => {
            assert_eq!(trace.value(&n("b")), Some(&Val::Num(4.0)));
            assert!(trace.dist.contains_key(&n("fun")));
        }
        other => panic!("expected a nested trace, found {other:?}"),
    }
}

#[test]
fn sub_dispatch_list_output_aligns_with_outputs() {
    let sub = SubDispatch::new(plus_minus_child())
        .outputs(["b", "c"])
        .output_type(OutputType::List);

    let arg = Val::Map([(n("a"), Val::Num(10.0))].into_iter().collect());
    let (out, sol) = sub.call(&[arg]).unwrap();
    assert_eq!(out, vec![Val::Num(11.0), Val::Num(9.0)]);
    assert_eq!(sol.value(&n("c")), Some(&Val::Num(9.0)));
}

#[test]
fn sub_dispatch_rejects_scalar_arguments() {
    let sub = SubDispatch::new(plus_minus_child()).outputs(["b"]);
    assert!(sub.call(&[Val::Num(1.0)]).is_err());
}

/// The cyclic fixture: `max(a, b) -> c` and `ln(c - 1) -> a` guarded by
/// `c > 1`, so `a` is both an input and the only output.
fn max_log_cycle() -> Dispatcher<f64> {
    let mut dsp = Dispatcher::new("max-log");
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0].max(args[1])]))
            .id("max")
            .inputs(["a", "b"])
            .outputs(["c"]),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![(args[0] - 1.0).ln()]))
            .id("log(x - 1)")
            .inputs(["c"])
            .outputs(["a"])
            .input_domain(|args| args[0] > 1.0),
    )
    .unwrap();
    dsp
}

#[test]
fn sub_dispatch_function_specialises_a_cycle() {
    let dsp = max_log_cycle();
    let f = SubDispatchFunction::new(&dsp, "f", &[n("a"), n("b")], &[n("a")], None).unwrap();
    assert_eq!(f.name(), "f");

    // max(2, 1) = 2, the domain accepts, ln(2 - 1) = 0.
    let (out, sol) = f.call(&[2.0, 1.0]).unwrap();
    assert_eq!(out, vec![0.0]);
    assert_eq!(sol.value(&n("c")), Some(&2.0));

    // max(1, 0) = 1 is rejected by the domain: `a` stays unreachable,
    // and its wildcard seed never leaks into the outputs.
    let err = f.call(&[1.0, 0.0]).unwrap_err();
    assert!(matches!(
        err.current_context(),
        DispatchError::UnreachableOutputs(missing) if *missing == vec![n("a")]
    ));
}

#[test]
fn sub_dispatch_function_rejects_unreachable_targets_at_build_time() {
    let mut dsp = max_log_cycle();
    dsp.add_data(Data::new("lonely")).unwrap();
    let err =
        SubDispatchFunction::new(&dsp, "f", &[n("a"), n("b")], &[n("lonely")], None).unwrap_err();
    assert!(matches!(
        err.current_context(),
        DispatchError::UnreachableOutputs(missing) if *missing == vec![n("lonely")]
    ));
}

#[test]
fn sub_dispatch_function_runs_as_a_parent_node() {
    let dsp = max_log_cycle();
    let f = SubDispatchFunction::new(&dsp, "solve", &[n("a"), n("b")], &[n("a")], None).unwrap();

    let mut parent = Dispatcher::new("parent");
    parent
        .add_function(f.into_func().id("solve").inputs(["x", "y"]).outputs(["z"]))
        .unwrap();

    let sol = parent.dispatch([("x", 2.0), ("y", 1.0)], None).unwrap();
    assert_eq!(sol.value(&n("z")), Some(&0.0));

    // A rejected inner domain is a soft failure of the parent node.
    let sol = parent.dispatch([("x", 1.0), ("y", 0.0)], None).unwrap();
    assert_eq!(sol.value(&n("z")), None);
}

#[test]
fn replicate_function_maps_over_all_arguments() {
    let mut dsp = Dispatcher::new("replicate");
    dsp.add_function(
        Func::from_function(replicate_function(|x: &f64| Ok(x * 2.0)))
            .id("doubles")
            .inputs(["a", "b", "c"])
            .outputs(["d", "e", "f"]),
    )
    .unwrap();

    let sol = dsp
        .dispatch([("a", 1.0), ("b", 2.0), ("c", 3.0)], None)
        .unwrap();
    assert_eq!(sol.value(&n("d")), Some(&2.0));
    assert_eq!(sol.value(&n("e")), Some(&4.0));
    assert_eq!(sol.value(&n("f")), Some(&6.0));
}
