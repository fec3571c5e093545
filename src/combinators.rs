//! Stateless helpers usable as function-node callables.
//!
//! The map-shaped ones are generic over [`ValueMap`], which is how
//! dictionary-valued data nodes are expressed with a typed value.

use core::ops::Add;
use std::sync::Arc;

use error_stack::Report;
use indexmap::IndexMap;

use crate::{
    error::CallError,
    node::{CallResult, NodeFunction, NodeId},
    sub::OutputType,
    value::ValueMap,
};

/// Returns its arguments unchanged, one output per input.
pub fn bypass<V: Clone>(args: &[V]) -> CallResult<Vec<V>> {
    Ok(args.to_vec())
}

/// Sums its arguments into a single output.
pub fn summation<V>(args: &[V]) -> CallResult<Vec<V>>
where
    V: Clone + Add<Output = V>,
{
    let mut iter = args.iter().cloned();
    let first = iter.next().ok_or_else(|| {
        Report::new(CallError).attach_printable("summation requires at least one argument")
    })?;
    Ok(vec![iter.fold(first, |acc, v| acc + v)])
}

/// Merges map-shaped arguments into one map; later arguments win.
pub fn combine_maps<V>(args: &[V]) -> CallResult<Vec<V>>
where
    V: Clone + ValueMap,
{
    let mut merged: IndexMap<NodeId, V> = IndexMap::new();
    for arg in args {
        merged.extend(as_map(arg)?);
    }
    Ok(vec![V::from_map(merged)])
}

/// A callable merging its map-shaped arguments and renaming keys
/// through `key_map`; keys without a mapping pass through unchanged.
pub fn map_keys<V>(key_map: IndexMap<NodeId, NodeId>) -> NodeFunction<V>
where
    V: Clone + ValueMap + Send + Sync + 'static,
{
    Arc::new(move |args: &[V]| {
        let mut merged: IndexMap<NodeId, V> = IndexMap::new();
        for arg in args {
            merged.extend(as_map(arg)?);
        }
        let renamed: IndexMap<NodeId, V> = merged
            .into_iter()
            .map(|(k, v)| (key_map.get(&k).cloned().unwrap_or(k), v))
            .collect();
        Ok(vec![V::from_map(renamed)])
    })
}

/// One entry of a [`map_list`] specification.
#[derive(Clone, Debug)]
pub enum KeySpec {
    /// Store the positional argument under this key.
    Key(NodeId),
    /// Treat the positional argument as a map and rename its keys.
    Map(IndexMap<NodeId, NodeId>),
}

/// A callable zipping its positional arguments with `spec` into one
/// map-shaped output.
pub fn map_list<V>(spec: Vec<KeySpec>) -> NodeFunction<V>
where
    V: Clone + ValueMap + Send + Sync + 'static,
{
    Arc::new(move |args: &[V]| {
        let mut out: IndexMap<NodeId, V> = IndexMap::new();
        for (entry, arg) in spec.iter().zip(args) {
            match entry {
                KeySpec::Key(k) => {
                    out.insert(k.clone(), arg.clone());
                }
                KeySpec::Map(key_map) => {
                    for (k, v) in as_map(arg)? {
                        out.insert(key_map.get(&k).cloned().unwrap_or(k), v);
                    }
                }
            }
        }
        Ok(vec![V::from_map(out)])
    })
}

/// A callable selecting `keys` from its merged map-shaped arguments:
/// one value per key with [`OutputType::List`], a single restricted map
/// otherwise. Listed keys must be present.
pub fn selector<V>(keys: Vec<NodeId>, output_type: OutputType) -> NodeFunction<V>
where
    V: Clone + ValueMap + Send + Sync + 'static,
{
    Arc::new(move |args: &[V]| {
        let mut merged: IndexMap<NodeId, V> = IndexMap::new();
        for arg in args {
            merged.extend(as_map(arg)?);
        }
        match output_type {
            OutputType::List => keys
                .iter()
                .map(|k| {
                    merged.get(k).cloned().ok_or_else(|| {
                        Report::new(CallError)
                            .attach_printable(format!("selector key ({k}) is missing"))
                    })
                })
                .collect(),
            OutputType::All | OutputType::Dict => {
                let selected: IndexMap<NodeId, V> = merged
                    .into_iter()
                    .filter(|(k, _)| keys.contains(k))
                    .collect();
                Ok(vec![V::from_map(selected)])
            }
        }
    })
}

/// A callable replicating its single argument `n` times.
pub fn replicate_value<V>(n: usize) -> NodeFunction<V>
where
    V: Clone + Send + Sync + 'static,
{
    Arc::new(move |args: &[V]| {
        let value = args.first().ok_or_else(|| {
            Report::new(CallError).attach_printable("replicate_value requires one argument")
        })?;
        Ok(vec![value.clone(); n])
    })
}

fn as_map<V: Clone + ValueMap>(arg: &V) -> CallResult<IndexMap<NodeId, V>> {
    arg.clone()
        .into_map()
        .ok_or_else(|| Report::new(CallError).attach_printable("argument is not map-shaped"))
}
