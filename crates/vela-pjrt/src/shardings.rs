//! Normalization of [`OpSharding`]s into flat, per-value sequences.
//!
//! Compilers describe the sharding of a tuple-shaped value with a single [`OpSharding`] of type
//! [`OpShardingType::Tuple`] whose [`OpSharding::tuple_shardings`] hold one sharding per tuple element, and those
//! element shardings can themselves be tuples. Runtimes, on the other hand, place one buffer per array leaf. This
//! module bridges the two representations:
//!
//! - [`ShardingTree`] is the tagged-variant view of an [`OpSharding`], where tuple nodes and leaf shardings are
//!   distinct cases rather than a type tag plus a (possibly ignored) list of children.
//! - [`flatten_op_sharding`] builds that view and returns its leaf shardings in depth-first, left-to-right order.
//!
//! For example, a sharding of the form `Tuple[A, B, Tuple[C, D]]` flattens to `[A, B, C, D]`. Both operations are
//! total and side-effect free: any non-tuple sharding (including a tuple-typed sharding that is never produced by a
//! compiler, such as an empty tuple) is handled without errors.

use crate::protos::{OpSharding, OpShardingType};

/// Tagged-variant representation of an [`OpSharding`].
#[derive(Clone, Debug, PartialEq)]
pub enum ShardingTree {
    /// Sharding of a single array value. Never of type [`OpShardingType::Tuple`].
    Leaf(OpSharding),

    /// Sharding of a tuple value, with one child per tuple element in declaration order.
    Tuple(Vec<ShardingTree>),
}

impl ShardingTree {
    /// Consumes this tree, returning its leaf shardings in depth-first, left-to-right order.
    pub fn into_leaves(self) -> Vec<OpSharding> {
        match self {
            Self::Leaf(sharding) => vec![sharding],
            Self::Tuple(children) => children.into_iter().flat_map(ShardingTree::into_leaves).collect(),
        }
    }
}

impl From<&OpSharding> for ShardingTree {
    fn from(sharding: &OpSharding) -> Self {
        if sharding.r#type == OpShardingType::Tuple as i32 {
            Self::Tuple(sharding.tuple_shardings.iter().map(ShardingTree::from).collect())
        } else {
            Self::Leaf(sharding.clone())
        }
    }
}

impl From<OpSharding> for ShardingTree {
    fn from(sharding: OpSharding) -> Self {
        if sharding.r#type == OpShardingType::Tuple as i32 {
            Self::Tuple(sharding.tuple_shardings.into_iter().map(ShardingTree::from).collect())
        } else {
            Self::Leaf(sharding)
        }
    }
}

/// Flattens the provided [`OpSharding`] into its sequence of leaf shardings. Tuple shardings are expanded recursively
/// in declaration order and every other sharding is returned as a single-element sequence.
pub fn flatten_op_sharding(sharding: &OpSharding) -> Vec<OpSharding> {
    ShardingTree::from(sharding).into_leaves()
}

/// Flattens each of the provided shardings independently and concatenates the results, preserving order.
pub fn flatten_op_shardings<'s, I: IntoIterator<Item = &'s OpSharding>>(shardings: I) -> Vec<OpSharding> {
    shardings.into_iter().flat_map(flatten_op_sharding).collect()
}
