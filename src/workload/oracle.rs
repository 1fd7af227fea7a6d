//! Reference walk used to judge generated programs.
//!
//! The oracle runs the walk element by element on a memory image, exactly
//! as the processor would see it, and records every intermediate in a
//! `ValueTrace` so programs compiled with trace checks can be compared stage
//! by stage.

use std::collections::HashMap;

use crate::core::{
    BatchField, BuildError, BuildResult, CorrectnessMismatch, KernelResult, TraceKey, TraceStage, Word,
};

use super::hash::{myhash, myhash_traced, HASH_STAGE_COUNT};
use super::model::{Batch, MemoryLayout, Tree};

/// One round for one element, given the tree value at its index.
#[inline]
pub fn step(node: Word, idx: Word, val: Word, n_nodes: Word) -> (Word, Word) {
    let val = myhash(val ^ node);
    let next = child_index(idx, val);
    (wrap_index(next, n_nodes), val)
}

/// Child chosen by the low bit of the mixed value.
#[inline]
pub fn child_index(idx: Word, val: Word) -> Word {
    idx.wrapping_mul(2).wrapping_add(1).wrapping_add(val & 1)
}

/// Reset indices that fall off the tree to the root.
#[inline]
pub fn wrap_index(idx: Word, n_nodes: Word) -> Word {
    idx * (idx < n_nodes) as Word
}

/// Intermediate values of a reference run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueTrace {
    entries: HashMap<TraceKey, Word>,
}

impl ValueTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: TraceKey, value: Word) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &TraceKey) -> Option<Word> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the walk on a standalone tree and batch.
pub fn reference_kernel(tree: &Tree, batch: &mut Batch, rounds: usize) -> BuildResult<()> {
    let n_nodes = tree.n_nodes() as Word;
    for _ in 0..rounds {
        for (idx, val) in batch.indices.iter_mut().zip(batch.values.iter_mut()) {
            let node = *tree.values.get(*idx as usize).ok_or_else(|| {
                BuildError::InvalidParams(format!("index {} outside a {}-node tree", idx, n_nodes))
            })?;
            let (next_idx, next_val) = step(node, *idx, *val, n_nodes);
            *idx = next_idx;
            *val = next_val;
        }
    }
    Ok(())
}

/// Run the walk in place on a memory image and return the full trace.
///
/// Gathers read `mem[forest_values_p + idx]`, the same word the processor
/// would load, so the image stays the single source of truth.
pub fn reference_image(mem: &mut [Word]) -> BuildResult<ValueTrace> {
    let layout = MemoryLayout::read(mem)?;
    let n_nodes = layout.n_nodes as Word;
    let mut trace = ValueTrace::new();

    for round in 0..layout.rounds as u32 {
        for element in 0..layout.batch_size {
            let idx = mem[layout.inp_indices_p + element];
            let val = mem[layout.inp_values_p + element];
            let node_addr = layout.forest_values_p + idx as usize;
            let node = *mem.get(node_addr).ok_or_else(|| {
                BuildError::InvalidParams(format!("gather address {} outside the image", node_addr))
            })?;

            let key = |stage| TraceKey::new(round, element as u32, stage);
            trace.record(key(TraceStage::Index), idx);
            trace.record(key(TraceStage::Value), val);
            trace.record(key(TraceStage::NodeValue), node);

            let stages = myhash_traced(val ^ node);
            for (i, &v) in stages.iter().enumerate() {
                trace.record(key(TraceStage::HashStage(i as u8)), v);
            }
            let hashed = stages[HASH_STAGE_COUNT - 1];
            trace.record(key(TraceStage::HashedValue), hashed);

            let next = child_index(idx, hashed);
            trace.record(key(TraceStage::NextIndex), next);
            let wrapped = wrap_index(next, n_nodes);
            trace.record(key(TraceStage::WrappedIndex), wrapped);

            mem[layout.inp_indices_p + element] = wrapped;
            mem[layout.inp_values_p + element] = hashed;
        }
    }
    Ok(trace)
}

/// Compare the batch region of two images. `vlen` only labels the chunk.
///
/// The layout comes from `expected`; an undecodable header or a shorter
/// `actual` image is a build error, not a pass.
pub fn check_output(expected: &[Word], actual: &[Word], vlen: usize) -> KernelResult<()> {
    let layout = MemoryLayout::read(expected)?;
    if actual.len() < expected.len() {
        return Err(BuildError::InvalidParams(format!(
            "image of {} words cannot be compared with one of {}",
            actual.len(),
            expected.len()
        ))
        .into());
    }
    let regions = [
        (BatchField::Values, layout.values(expected), layout.values(actual)),
        (BatchField::Indices, layout.indices(expected), layout.indices(actual)),
    ];
    for (field, want, got) in regions {
        if let Some(element) = (0..want.len()).find(|&i| want[i] != got[i]) {
            return Err(CorrectnessMismatch::FinalImage {
                field,
                element,
                chunk: element / vlen.max(1),
                expected: want[element],
                found: got[element],
            }
            .into());
        }
    }
    Ok(())
}
