//! Workload parameters and generator options.

use crate::core::{BuildError, BuildResult, MachineConfig};
use crate::workload::node_count;

/// Shape of the workload a program is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelParams {
    pub forest_height: usize,
    pub n_nodes: usize,
    pub batch_size: usize,
    pub rounds: usize,
}

impl KernelParams {
    /// Perfect tree of `forest_height` levels.
    pub fn new(forest_height: usize, batch_size: usize, rounds: usize) -> Self {
        Self {
            forest_height,
            n_nodes: node_count(forest_height).unwrap_or(0),
            batch_size,
            rounds,
        }
    }

    /// Height 10, 256 walkers, 16 rounds.
    pub fn reference() -> Self {
        Self::new(10, 256, 16)
    }

    /// Vector-width chunks needed to cover the batch.
    pub fn chunk_count(&self, vlen: usize) -> usize {
        self.batch_size.div_ceil(vlen.max(1))
    }

    pub fn validate(&self) -> BuildResult<()> {
        if node_count(self.forest_height).is_none() {
            return Err(BuildError::InvalidParams(format!(
                "forest_height = {} has no addressable node count",
                self.forest_height
            )));
        }
        if self.n_nodes == 0 {
            return Err(BuildError::InvalidParams("tree must have at least one node".into()));
        }
        for (name, value) in [
            ("n_nodes", self.n_nodes),
            ("batch_size", self.batch_size),
            ("rounds", self.rounds),
            ("forest_height", self.forest_height),
        ] {
            if u32::try_from(value).is_err() {
                return Err(BuildError::InvalidParams(format!("{} = {} does not fit a word", name, value)));
            }
        }
        Ok(())
    }
}

/// Number of temporary register sets shared by the chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// Search a small candidate set and keep the shortest program.
    #[default]
    Auto,
    /// Use exactly this many sets (clamped to the chunk count).
    Fixed(usize),
}

/// Generator switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub parallelism: Parallelism,
    /// Every walker starts at index 0. Enables level tracking.
    pub start_at_root: bool,
    /// Use level-based lowerings while the level is known.
    pub shortcuts: bool,
    /// Emit trace comparisons after every stage.
    pub trace_checks: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Auto,
            start_at_root: true,
            shortcuts: true,
            trace_checks: false,
        }
    }
}

impl BuildOptions {
    /// Defaults with a fixed parallelism degree.
    pub fn fixed(parallelism: usize) -> Self {
        Self { parallelism: Parallelism::Fixed(parallelism), ..Self::default() }
    }

    /// No assumption about start indices, no shortcuts.
    pub fn general() -> Self {
        Self { start_at_root: false, shortcuts: false, ..Self::default() }
    }

    /// Defaults plus per-stage trace comparisons.
    pub fn traced() -> Self {
        Self { trace_checks: true, ..Self::default() }
    }
}

/// Candidate parallelism degrees for a batch of `chunks` chunks.
pub fn parallelism_candidates(parallelism: Parallelism, chunks: usize) -> Vec<usize> {
    let chunks = chunks.max(1);
    let mut out = match parallelism {
        Parallelism::Fixed(p) => vec![p.clamp(1, chunks)],
        Parallelism::Auto => vec![
            chunks,
            (3 * chunks).div_ceil(4),
            chunks.div_ceil(2),
            chunks.div_ceil(4),
        ],
    };
    out.sort_unstable_by(|a, b| b.cmp(a));
    out.dedup();
    out
}

/// Validate parameters against a machine.
pub fn validate(params: &KernelParams, config: &MachineConfig) -> BuildResult<()> {
    config.validate()?;
    params.validate()
}
