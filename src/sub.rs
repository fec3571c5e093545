//! Adapters exposing a dispatcher as a function-node callable.

use std::sync::Arc;

use error_stack::{Report, Result};
use indexmap::{IndexMap, IndexSet};

use crate::{
    dispatch::{run::run, DispatchArgs, Solution},
    dispatcher::{Dispatcher, Func},
    error::{CallError, DispatchError},
    node::{CallResult, NodeFunction, NodeId},
    value::{Value, ValueMap},
};

/// Shape of a sub-dispatch output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputType {
    /// The whole data-output map, as one map-shaped value.
    All,
    /// One value per declared output, in order.
    List,
    /// The data-output map restricted to the declared outputs, as one
    /// map-shaped value.
    Dict,
}

/// Dispatches a child dispatcher like a function.
///
/// The positional arguments are map-shaped values that are merged
/// (last wins) and fed to the child's dispatch. Next to the shaped
/// output, every call returns the child's [`Solution`]; when the adapter
/// runs as a function node, the engine stores that solution on the
/// workflow node.
#[derive(Clone)]
pub struct SubDispatch<V> {
    dsp: Arc<Dispatcher<V>>,
    outputs: Option<Vec<NodeId>>,
    cutoff: Option<f64>,
    wildcard: bool,
    no_call: bool,
    shrink: bool,
    output_type: OutputType,
}

impl<V: Clone + 'static> SubDispatch<V> {
    /// Wraps a dispatcher; by default the child is shrunk per call and
    /// the full output map is returned.
    pub fn new(dsp: impl Into<Arc<Dispatcher<V>>>) -> Self {
        SubDispatch {
            dsp: dsp.into(),
            outputs: None,
            cutoff: None,
            wildcard: false,
            no_call: false,
            shrink: true,
            output_type: OutputType::All,
        }
    }

    /// The child's ending data nodes.
    pub fn outputs<I>(mut self, outputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Cutoff distance forwarded to the child's dispatch.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Wildcard flag forwarded to the child's dispatch.
    pub fn wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = wildcard;
        self
    }

    /// No-call flag forwarded to the child's dispatch.
    pub fn no_call(mut self, no_call: bool) -> Self {
        self.no_call = no_call;
        self
    }

    /// Whether to shrink the child before dispatching (on by default).
    pub fn shrink(mut self, shrink: bool) -> Self {
        self.shrink = shrink;
        self
    }

    /// Selects the output shape.
    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    /// The wrapped dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<V> {
        &self.dsp
    }
}

impl<V: Clone + ValueMap + 'static> SubDispatch<V> {
    /// Merges the map-shaped arguments, dispatches the child, and
    /// returns the shaped output with the child's solution.
    pub fn call(&self, inputs: &[V]) -> Result<(Vec<V>, Solution<V>), CallError> {
        let mut merged: IndexMap<NodeId, V> = IndexMap::new();
        for arg in inputs {
            let map = arg.clone().into_map().ok_or_else(|| {
                Report::new(CallError).attach_printable("sub-dispatch arguments must be map-shaped")
            })?;
            merged.extend(map);
        }

        let mut args = DispatchArgs::new().inputs(merged);
        if let Some(outs) = &self.outputs {
            args = args.outputs(outs.iter().cloned());
        }
        if let Some(cutoff) = self.cutoff {
            args = args.cutoff(cutoff);
        }
        args = args
            .wildcard(self.wildcard)
            .no_call(self.no_call)
            .shrink(self.shrink);

        let sol = self
            .dsp
            .dispatch_with(args)
            .map_err(|err| err.change_context(CallError))?;

        let out = match self.output_type {
            OutputType::All => {
                let map: IndexMap<NodeId, V> = sol
                    .data_output
                    .iter()
                    .filter_map(|(k, v)| v.val().map(|v| (k.clone(), v.clone())))
                    .collect();
                vec![V::from_map(map)]
            }
            OutputType::Dict => {
                let outputs = self.outputs.as_deref().unwrap_or(&[]);
                let map: IndexMap<NodeId, V> = sol
                    .data_output
                    .iter()
                    .filter(|(k, _)| outputs.contains(k))
                    .filter_map(|(k, v)| v.val().map(|v| (k.clone(), v.clone())))
                    .collect();
                vec![V::from_map(map)]
            }
            OutputType::List => {
                let outputs = self.outputs.as_deref().ok_or_else(|| {
                    Report::new(CallError)
                        .attach_printable("list-shaped sub-dispatch requires declared outputs")
                })?;
                let mut values = Vec::with_capacity(outputs.len());
                for k in outputs {
                    match sol.value(k) {
                        Some(v) => values.push(v.clone()),
                        None => {
                            return Err(Report::new(CallError).attach_printable(format!(
                                "sub-dispatch did not estimate output ({k})"
                            )))
                        }
                    }
                }
                values
            }
        };
        Ok((out, sol))
    }
}

impl<V: Clone + ValueMap + Send + Sync + 'static> SubDispatch<V> {
    /// Turns the adapter into a function-node builder; bind inputs and
    /// outputs before adding it.
    pub fn into_func(self) -> Func<V> {
        let name = self.dsp.name().to_owned();
        Func::from_sub_call(
            name,
            Arc::new(move |args: &[V]| {
                self.call(args).map(|(out, sol)| (out, Box::new(sol)))
            }),
        )
    }
}

/// A dispatcher specialised into a fixed-signature callable: positional
/// arguments in the declared input order, one value per declared output.
///
/// Construction pre-shrinks the child to the `(inputs, outputs)`
/// signature and fails when a requested output is unreachable; calls
/// fail the same way when a declared output cannot be estimated.
#[derive(Clone, Debug)]
pub struct SubDispatchFunction<V> {
    dsp: Dispatcher<V>,
    name: String,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    defaults: IndexMap<NodeId, Value<V>>,
    wildcards: IndexSet<NodeId>,
    cutoff: Option<f64>,
}

impl<V: Clone + 'static> SubDispatchFunction<V> {
    /// Shrinks `dsp` to the signature and caches its initial values and
    /// wildcard set.
    pub fn new(
        dsp: &Dispatcher<V>,
        name: impl Into<String>,
        inputs: &[NodeId],
        outputs: &[NodeId],
        cutoff: Option<f64>,
    ) -> Result<Self, DispatchError> {
        let shrunk = dsp.shrink_dsp(Some(inputs), Some(outputs), cutoff)?;

        let missing: Vec<NodeId> = outputs
            .iter()
            .filter(|o| !shrunk.graph().contains_node(o))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Report::new(DispatchError::UnreachableOutputs(missing)));
        }

        let defaults = shrunk.default_values().clone();
        let wildcards = shrunk.compute_wildcards(inputs.iter(), Some(outputs));
        Ok(SubDispatchFunction {
            dsp: shrunk,
            name: name.into(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            defaults,
            wildcards,
            cutoff,
        })
    }

    /// The callable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shrunk dispatcher backing the callable.
    pub fn dispatcher(&self) -> &Dispatcher<V> {
        &self.dsp
    }

    /// Runs the shrunk dispatcher on the positional arguments and
    /// returns the declared outputs in order, with the solution.
    pub fn call(&self, args: &[V]) -> Result<(Vec<V>, Solution<V>), DispatchError> {
        let mut initial = self.defaults.clone();
        for (k, v) in self.inputs.iter().zip(args) {
            initial.insert(k.clone(), Value::Val(v.clone()));
        }

        let sol = run(
            &self.dsp,
            initial,
            Some(&self.outputs),
            self.cutoff,
            self.wildcards.clone(),
            IndexMap::new(),
            false,
        )?;

        let mut values = Vec::with_capacity(self.outputs.len());
        let mut missing = Vec::new();
        for k in &self.outputs {
            match sol.value(k) {
                Some(v) => values.push(v.clone()),
                None => missing.push(k.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Report::new(DispatchError::UnreachableOutputs(missing)));
        }
        Ok((values, sol))
    }
}

impl<V: Clone + Send + Sync + 'static> SubDispatchFunction<V> {
    /// Turns the callable into a function-node builder; bind inputs and
    /// outputs before adding it.
    pub fn into_func(self) -> Func<V> {
        let name = self.name.clone();
        Func::from_sub_call(
            name,
            Arc::new(move |args: &[V]| {
                self.call(args)
                    .map(|(out, sol)| (out, Box::new(sol)))
                    .map_err(|err| err.change_context(CallError))
            }),
        )
    }
}

/// Lifts a one-argument callable into a function-node callable that
/// maps it over all of its positional arguments.
pub fn replicate_function<V, F>(f: F) -> NodeFunction<V>
where
    V: Clone + 'static,
    F: Fn(&V) -> CallResult<V> + Send + Sync + 'static,
{
    Arc::new(move |args: &[V]| args.iter().map(&f).collect())
}
