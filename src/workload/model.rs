//! Workload data: the tree, the batch and the flat memory image.
//!
//! The image starts with a seven-word header, followed by the tree values,
//! the batch indices, the batch values and some spare room:
//!
//! ```text
//! [rounds, n_nodes, batch_size, forest_height,
//!  forest_values_p, inp_indices_p, inp_values_p,
//!  tree..., indices..., values..., spare...]
//! ```

use rand::Rng;

use crate::core::{BuildError, BuildResult, Word};

/// Words in the memory header.
pub const HEADER_WORDS: usize = 7;

/// Header slot offsets.
pub mod header {
    pub const ROUNDS: u32 = 0;
    pub const N_NODES: u32 = 1;
    pub const BATCH_SIZE: u32 = 2;
    pub const FOREST_HEIGHT: u32 = 3;
    pub const FOREST_VALUES_P: u32 = 4;
    pub const INP_INDICES_P: u32 = 5;
    pub const INP_VALUES_P: u32 = 6;
}

/// Values are drawn below this bound.
const VALUE_BOUND: Word = 1 << 30;

/// Nodes in a perfect tree of `height` levels, or `None` when the count
/// does not fit a `usize`.
pub fn node_count(height: usize) -> Option<usize> {
    let height = u32::try_from(height).ok()?;
    1usize.checked_shl(height).map(|n| n - 1)
}

/// Array-backed perfect binary tree. Node `i` has children `2i+1` and `2i+2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub height: usize,
    pub values: Vec<Word>,
}

impl Tree {
    /// Random tree of `height` levels. A height with no addressable node
    /// count gives an empty tree.
    pub fn generate<R: Rng + ?Sized>(height: usize, rng: &mut R) -> Self {
        let values = (0..node_count(height).unwrap_or(0)).map(|_| rng.gen_range(0..VALUE_BOUND)).collect();
        Self { height, values }
    }

    /// Tree with explicit node values.
    pub fn from_values(height: usize, values: Vec<Word>) -> Self {
        Self { height, values }
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.values.len()
    }
}

/// The walkers: one index and one accumulator per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub indices: Vec<Word>,
    pub values: Vec<Word>,
}

impl Batch {
    /// Random accumulators, every walker at the root.
    pub fn generate<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Self {
        let values = (0..size).map(|_| rng.gen_range(0..VALUE_BOUND)).collect();
        Self { indices: vec![0; size], values }
    }

    /// Walkers with explicit start positions.
    pub fn with_indices(indices: Vec<Word>, values: Vec<Word>) -> BuildResult<Self> {
        if indices.len() != values.len() {
            return Err(BuildError::InvalidParams(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        Ok(Self { indices, values })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every walker sits at the root.
    pub fn starts_at_root(&self) -> bool {
        self.indices.iter().all(|&i| i == 0)
    }
}

/// Where each region of a memory image lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub rounds: usize,
    pub n_nodes: usize,
    pub batch_size: usize,
    pub forest_height: usize,
    pub forest_values_p: usize,
    pub inp_indices_p: usize,
    pub inp_values_p: usize,
}

impl MemoryLayout {
    /// Decode the header of an image.
    pub fn read(mem: &[Word]) -> BuildResult<Self> {
        if mem.len() < HEADER_WORDS {
            return Err(BuildError::InvalidParams(format!(
                "memory image of {} words has no header",
                mem.len()
            )));
        }
        let at = |slot: u32| mem[slot as usize] as usize;
        let layout = Self {
            rounds: at(header::ROUNDS),
            n_nodes: at(header::N_NODES),
            batch_size: at(header::BATCH_SIZE),
            forest_height: at(header::FOREST_HEIGHT),
            forest_values_p: at(header::FOREST_VALUES_P),
            inp_indices_p: at(header::INP_INDICES_P),
            inp_values_p: at(header::INP_VALUES_P),
        };
        let end = layout
            .inp_values_p
            .max(layout.inp_indices_p)
            .saturating_add(layout.batch_size)
            .max(layout.forest_values_p.saturating_add(layout.n_nodes));
        if end > mem.len() {
            return Err(BuildError::InvalidParams(format!(
                "header points past the end of a {}-word image",
                mem.len()
            )));
        }
        Ok(layout)
    }

    /// Batch index slice of an image.
    pub fn indices<'a>(&self, mem: &'a [Word]) -> &'a [Word] {
        &mem[self.inp_indices_p..self.inp_indices_p + self.batch_size]
    }

    /// Batch value slice of an image.
    pub fn values<'a>(&self, mem: &'a [Word]) -> &'a [Word] {
        &mem[self.inp_values_p..self.inp_values_p + self.batch_size]
    }
}

/// Flatten a workload into a memory image.
pub fn build_mem_image(tree: &Tree, batch: &Batch, rounds: usize) -> Vec<Word> {
    let n_nodes = tree.n_nodes();
    let size = batch.len();
    let forest_values_p = HEADER_WORDS;
    let inp_indices_p = forest_values_p + n_nodes;
    let inp_values_p = inp_indices_p + size;
    let spare = n_nodes + 2 * size + 48;

    let mut mem = Vec::with_capacity(inp_values_p + size + spare);
    mem.extend_from_slice(&[
        rounds as Word,
        n_nodes as Word,
        size as Word,
        tree.height as Word,
        forest_values_p as Word,
        inp_indices_p as Word,
        inp_values_p as Word,
    ]);
    mem.extend_from_slice(&tree.values);
    mem.extend_from_slice(&batch.indices);
    mem.extend_from_slice(&batch.values);
    mem.resize(mem.len() + spare, 0);
    mem
}
