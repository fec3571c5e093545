//! Values travelling on workflow edges.

use indexmap::IndexMap;

use crate::node::NodeId;

/// A value carried by a data node or a workflow edge.
///
/// `Value::None` is the sentinel for "settled, but without a value": it is
/// produced for every node in a no-call dispatch, and a data-node aggregator
/// may return it to suppress recording and let the dispatch continue without
/// an output for that node. It is a distinct variant, never equal to any
/// user value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<V> {
    /// A concrete estimation.
    Val(V),
    /// Settled without a value.
    None,
}

impl<V> Value<V> {
    /// Returns `true` for the valueless sentinel.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns the contained value, if any.
    #[inline]
    pub fn val(&self) -> Option<&V> {
        match self {
            Value::Val(v) => Some(v),
            Value::None => None,
        }
    }

    /// Consumes the value, returning the contained value if any.
    #[inline]
    pub fn into_val(self) -> Option<V> {
        match self {
            Value::Val(v) => Some(v),
            Value::None => None,
        }
    }
}

impl<V> From<V> for Value<V> {
    fn from(v: V) -> Self {
        Value::Val(v)
    }
}

/// Conversion between node values and keyed maps of node values.
///
/// [`SubDispatch`](crate::SubDispatch) and the map-shaped combinators pass
/// whole input maps through single data nodes, so the value type must be
/// able to represent a map of itself. Implement this on a recursive value
/// enum to opt into those features; plain scalar graphs never need it.
pub trait ValueMap: Sized {
    /// Views the value as a map, or `None` when it is not map-shaped.
    fn into_map(self) -> Option<IndexMap<NodeId, Self>>;

    /// Builds a value out of a map.
    fn from_map(map: IndexMap<NodeId, Self>) -> Self;
}
