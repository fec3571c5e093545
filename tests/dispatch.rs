//! End-to-end dispatch scenarios.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use flowgraph::{Data, DispatchArgs, Dispatcher, DispatchError, Func, NodeId, Value, Workflow};
use proptest::prelude::*;

fn n(s: &str) -> NodeId {
    NodeId::from(s)
}

fn edge_set(wf: &Workflow<f64>) -> Vec<(String, String)> {
    let mut edges: Vec<(String, String)> = wf
        .edges()
        .map(|(u, v, _)| (u.to_string(), v.to_string()))
        .collect();
    edges.sort();
    edges
}

/// The diff/log/average system: `c = b - a`, `d_log = ln(c)` for
/// positive `c`, and `d` averaging the log estimate with its default.
fn diff_log_average(calls: Arc<Mutex<Vec<f64>>>) -> Dispatcher<f64> {
    let mut dsp = Dispatcher::new("diff-log-average");
    dsp.add_data(Data::new("b").default_value(1.0)).unwrap();
    dsp.add_data(
        Data::new("d")
            .default_value(4.0)
            .wait_inputs(true)
            .function(|est| {
                let xs: Vec<f64> = est.values().filter_map(|v| v.val().copied()).collect();
                Ok(Value::Val(xs.iter().sum::<f64>() / xs.len() as f64))
            })
            .callback(move |x: &f64| {
                calls.lock().unwrap().push(*x);
                Ok(())
            }),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[1] - args[0]]))
            .id("diff")
            .inputs(["a", "b"])
            .outputs(["c"]),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0].ln()]))
            .id("log")
            .inputs(["c"])
            .outputs(["d"])
            .input_domain(|args| args[0] > 0.0),
    )
    .unwrap();
    dsp
}

#[test]
fn diff_log_average_to_target() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let dsp = diff_log_average(calls.clone());

    let sol = dsp.dispatch([("a", 0.0)], Some(&[n("d")])).unwrap();

    assert_eq!(sol.value(&n("a")), Some(&0.0));
    assert_eq!(sol.value(&n("b")), Some(&1.0));
    assert_eq!(sol.value(&n("c")), Some(&1.0));
    assert_eq!(sol.value(&n("d")), Some(&2.0));
    assert_eq!(*calls.lock().unwrap(), vec![2.0]);

    // Distances accumulate unit edge costs along the fired path.
    assert_relative_eq!(sol.dist[&n("c")], 2.0);
    assert_relative_eq!(sol.dist[&n("d")], 4.0);
}

#[test]
fn weighted_alternative_stays_cold() {
    let mut dsp = Dispatcher::new("alternatives");
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
            .id("cheap")
            .inputs(["a"])
            .outputs(["c"])
            .weight(1.0),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] + 100.0]))
            .id("dear")
            .inputs(["a"])
            .outputs(["c"])
            .weight(100.0),
    )
    .unwrap();

    let sol = dsp.dispatch([("a", 3.0)], Some(&[n("c")])).unwrap();
    assert_eq!(sol.value(&n("c")), Some(&4.0));

    // Exactly one edge into `c`, from the cheap function.
    let into_c: Vec<String> = sol
        .workflow
        .edges()
        .filter(|(_, v, _)| **v == n("c"))
        .map(|(u, _, _)| u.to_string())
        .collect();
    assert_eq!(into_c, vec!["cheap".to_owned()]);
}

#[test]
fn equal_weights_break_ties_by_id() {
    let build = |first: &str, second: &str| {
        let mut dsp = Dispatcher::new("ties");
        for id in [first, second] {
            let tag = id.to_owned();
            dsp.add_function(
                Func::new(move |_: &[f64]| Ok(vec![tag.len() as f64]))
                    .id(id)
                    .inputs(["a"])
                    .outputs(["c"]),
            )
            .unwrap();
        }
        dsp.dispatch([("a", 0.0)], Some(&[n("c")])).unwrap()
    };
    let sol = build("alpha", "beta");
    let into_c: Vec<String> = sol
        .workflow
        .edges()
        .filter(|(_, v, _)| **v == n("c"))
        .map(|(u, _, _)| u.to_string())
        .collect();
    assert_eq!(into_c, vec!["alpha".to_owned()]);
}

#[test]
fn rejected_domain_falls_back_to_default() {
    let mut dsp = Dispatcher::new("domain-fallback");
    dsp.add_data(Data::new("a").default_value(9.0)).unwrap();
    dsp.add_data(Data::new("b")).unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![(args[0] - 1.0).ln()]))
            .id("log(x - 1)")
            .inputs(["c"])
            .outputs(["a"])
            .input_domain(|args| args[0] > 1.0),
    )
    .unwrap();

    // The domain rejects `c = 1`, so the default wins.
    let sol = dsp.dispatch([("b", 1.0), ("c", 1.0)], None).unwrap();
    assert_eq!(sol.value(&n("a")), Some(&9.0));

    // With `c = 2` the function re-estimates `a` past its default.
    let sol = dsp.dispatch([("b", 1.0), ("c", 2.0)], None).unwrap();
    assert_eq!(sol.value(&n("a")), Some(&0.0));
}

#[test]
fn cutoff_discards_long_relaxations() {
    let mut dsp = Dispatcher::new("cutoff");
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
            .id("f1")
            .inputs(["a"])
            .outputs(["b"]),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
            .id("f2")
            .inputs(["b"])
            .outputs(["c"]),
    )
    .unwrap();

    let sol = dsp
        .dispatch_with(DispatchArgs::new().input("a", 0.0).cutoff(3.0))
        .unwrap();
    assert_eq!(sol.value(&n("b")), Some(&1.0));
    assert_eq!(sol.value(&n("c")), None);
}

#[test]
fn contradictory_negative_weights_are_hard_errors() {
    let mut dsp = Dispatcher::new("negative");
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
            .id("f1")
            .inputs(["a"])
            .outputs(["c"]),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0], args[0]]))
            .id("f2")
            .inputs(["a"])
            .outputs(["c", "d"])
            .weight(10.0)
            .weight_to("c", -20.0),
    )
    .unwrap();

    let err = dsp.dispatch([("a", 0.0)], None).unwrap_err();
    assert_eq!(*err.current_context(), DispatchError::ContradictoryPaths);
}

#[test]
fn soft_failures_skip_the_node_and_raises_promotes_them() {
    let build = |raises: bool| {
        let mut dsp = Dispatcher::new("failing").raises(raises);
        dsp.add_function(
            Func::new(|_: &[f64]| {
                Err(error_stack_report())
            })
            .id("broken")
            .inputs(["a"])
            .outputs(["b"]),
        )
        .unwrap();
        dsp.add_function(
            Func::new(|args: &[f64]| Ok(vec![args[0] * 2.0]))
                .id("double")
                .inputs(["a"])
                .outputs(["c"]),
        )
        .unwrap();
        dsp
    };

    // Soft: the broken node is skipped, the other path completes.
    let sol = build(false).dispatch([("a", 2.0)], None).unwrap();
    assert_eq!(sol.value(&n("b")), None);
    assert_eq!(sol.value(&n("c")), Some(&4.0));

    // Promoted: the first failure aborts the dispatch.
    let err = build(true).dispatch([("a", 2.0)], None).unwrap_err();
    assert!(matches!(
        err.current_context(),
        DispatchError::NodeError(id) if *id == n("broken")
    ));
}

fn error_stack_report() -> error_stack::Report<flowgraph::CallError> {
    error_stack::Report::new(flowgraph::CallError).attach_printable("boom")
}

#[test]
fn wrong_arity_is_a_soft_failure() {
    let mut dsp = Dispatcher::new("arity");
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0]]))
            .id("short")
            .inputs(["a"])
            .outputs(["b", "c"]),
    )
    .unwrap();
    let sol = dsp.dispatch([("a", 1.0)], None).unwrap();
    assert_eq!(sol.value(&n("b")), None);
    assert_eq!(sol.value(&n("c")), None);
}

#[test]
fn foreign_inputs_pass_through() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let dsp = diff_log_average(calls);
    let sol = dsp
        .dispatch([("a", 0.0), ("z", 7.5)], Some(&[n("d")]))
        .unwrap();
    assert_eq!(sol.value(&n("z")), Some(&7.5));
    assert!(!sol.workflow.contains_node(&n("z")));
}

#[test]
fn no_call_builds_the_same_workflow_without_values() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let dsp = diff_log_average(calls.clone());

    let dry = dsp
        .dispatch_with(DispatchArgs::new().input_keys(["a"]).no_call(true))
        .unwrap();
    assert!(dry.data_output.values().all(Value::is_none));
    assert!(calls.lock().unwrap().is_empty());

    let wet = dsp.dispatch([("a", 0.0)], None).unwrap();
    assert_eq!(edge_set(&dry.workflow), edge_set(&wet.workflow));
    assert_eq!(wet.value(&n("d")), Some(&2.0));
}

#[test]
fn functions_without_declared_inputs_run_from_start() {
    let mut dsp = Dispatcher::new("sources");
    dsp.add_function(
        Func::new(|_: &[f64]| Ok(vec![42.0]))
            .id("constant")
            .outputs(["x"]),
    )
    .unwrap();
    dsp.add_function(
        Func::new(|args: &[f64]| Ok(vec![args[0] / 2.0]))
            .id("halve")
            .inputs(["x"])
            .outputs(["y"]),
    )
    .unwrap();

    let sol = dsp.dispatch::<_, &str>([], None).unwrap();
    assert_eq!(sol.value(&n("x")), Some(&42.0));
    assert_eq!(sol.value(&n("y")), Some(&21.0));
}

proptest! {
    /// Dispatch is a pure function of (graph, inputs): repeating it
    /// yields identical outputs and workflows.
    #[test]
    fn dispatch_is_idempotent(a in -100.0f64..100.0) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dsp = diff_log_average(calls);
        let first = dsp.dispatch([("a", a)], None).unwrap();
        let second = dsp.dispatch([("a", a)], None).unwrap();
        prop_assert_eq!(&first.data_output, &second.data_output);
        prop_assert_eq!(edge_set(&first.workflow), edge_set(&second.workflow));
        prop_assert_eq!(&first.dist, &second.dist);
    }

    /// Settled distances equal the accumulated edge + node weights along
    /// the fired chain.
    #[test]
    fn distances_accumulate_weights(w1 in 0.5f64..10.0, w2 in 0.5f64..10.0) {
        let mut dsp = Dispatcher::new("weights");
        dsp.add_function(
            Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
                .id("f1")
                .inputs(["a"])
                .outputs(["b"])
                .weight(w1),
        )
        .unwrap();
        dsp.add_function(
            Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
                .id("f2")
                .inputs(["b"])
                .outputs(["c"])
                .weight(w2),
        )
        .unwrap();
        let sol = dsp.dispatch([("a", 0.0)], None).unwrap();
        prop_assert!((sol.dist[&n("b")] - (2.0 + w1)).abs() < 1e-9);
        prop_assert!((sol.dist[&n("c")] - (4.0 + w1 + w2)).abs() < 1e-9);
    }

    /// A strictly heavier alternative with the same outputs never
    /// changes the result.
    #[test]
    fn heavier_alternatives_never_fire(extra in 1.0f64..1000.0, a in -10.0f64..10.0) {
        let mut cheap_only = Dispatcher::new("cheap");
        cheap_only
            .add_function(
                Func::new(|args: &[f64]| Ok(vec![args[0] + 1.0]))
                    .id("cheap")
                    .inputs(["a"])
                    .outputs(["c"]),
            )
            .unwrap();

        let mut both = cheap_only.clone();
        both.add_function(
            Func::new(|args: &[f64]| Ok(vec![args[0] - 1.0]))
                .id("dear")
                .inputs(["a"])
                .outputs(["c"])
                .weight(extra),
        )
        .unwrap();

        let lhs = cheap_only.dispatch([("a", a)], Some(&[n("c")])).unwrap();
        let rhs = both.dispatch([("a", a)], Some(&[n("c")])).unwrap();
        prop_assert_eq!(lhs.value(&n("c")), rhs.value(&n("c")));
    }
}
