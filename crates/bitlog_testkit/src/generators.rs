//! Property-based test generators using proptest.
//!
//! Operations are drawn from a small key space so that overwrites and
//! deletes of live keys are common.

use bitlog_core::Engine;
use proptest::prelude::*;
use std::collections::HashMap;

/// One engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `put(key, value)`
    Put(Vec<u8>, Vec<u8>),
    /// `delete(key)`
    Delete(Vec<u8>),
    /// `compact()`
    Compact,
    /// Close and reopen the engine.
    Reopen,
}

/// Strategy for keys from a space of `space` distinct values.
pub fn key_strategy(space: u8) -> impl Strategy<Value = Vec<u8>> {
    (0..space).prop_map(|k| format!("k{k}").into_bytes())
}

/// Strategy for values, including empty ones.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for a single operation.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (key_strategy(16), value_strategy()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => key_strategy(16).prop_map(Op::Delete),
        1 => Just(Op::Compact),
        1 => Just(Op::Reopen),
    ]
}

/// Strategy for a sequence of operations.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..max_len)
}

/// In-memory reference for last-writer-wins semantics.
#[derive(Debug, Default, Clone)]
pub struct Model {
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a mutation. `Compact` and `Reopen` leave it unchanged.
    pub fn apply(&mut self, op: &Op) {
        match op {
            Op::Put(k, v) => {
                self.data.insert(k.clone(), v.clone());
            }
            Op::Delete(k) => {
                self.data.remove(k);
            }
            Op::Compact | Op::Reopen => {}
        }
    }

    /// Expected value for `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.data.get(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if no key is live.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Every key ever mentioned by `ops`.
    pub fn keys_of(ops: &[Op]) -> Vec<Vec<u8>> {
        let mut keys: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Put(k, _) | Op::Delete(k) => Some(k.clone()),
                Op::Compact | Op::Reopen => None,
            })
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Returns the first key whose engine value differs from the model.
    pub fn first_mismatch(&self, engine: &Engine, keys: &[Vec<u8>]) -> Option<Vec<u8>> {
        keys.iter()
            .find(|k| engine.get(k).ok().flatten().as_ref() != self.get(k))
            .cloned()
    }
}
