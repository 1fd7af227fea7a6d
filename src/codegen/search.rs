//! Parallelism search: build several candidates and keep the shortest.

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::{BuildError, BuildResult, MachineConfig, Program, ProgramStats};

use super::kernel::KernelBuilder;
use super::params::{parallelism_candidates, validate, BuildOptions, KernelParams};
use super::schedule::ScheduleStats;

/// A generated program and how it was obtained.
#[derive(Debug, Clone)]
pub struct Kernel {
    pub program: Program,
    /// Temporary register sets used.
    pub parallelism: usize,
    pub stats: ProgramStats,
    pub schedule: ScheduleStats,
}

impl Kernel {
    #[inline]
    pub fn cycles(&self) -> usize {
        self.program.cycle_count()
    }
}

/// Generate a program for `params` on `config`.
///
/// With `Parallelism::Auto` the candidates are built concurrently and the
/// one with the fewest cycles wins, ties going to fewer register sets.
/// Candidates that run out of scratch are dropped; if none survives, the
/// error of the smallest candidate is returned.
pub fn build_kernel(params: &KernelParams, config: &MachineConfig, options: &BuildOptions) -> BuildResult<Kernel> {
    validate(params, config)?;
    let candidates = parallelism_candidates(options.parallelism, params.chunk_count(config.vlen));
    debug!(?candidates, batch = params.batch_size, rounds = params.rounds, "searching parallelism");

    let results: Vec<(usize, BuildResult<(Program, ScheduleStats)>)> = candidates
        .par_iter()
        .map(|&p| (p, KernelBuilder::new(config, *params, *options, p).and_then(KernelBuilder::build_with_stats)))
        .collect();

    let mut best: Option<Kernel> = None;
    let mut last_err: Option<BuildError> = None;
    for (parallelism, result) in results {
        match result {
            Ok((program, schedule)) => {
                debug!(parallelism, cycles = program.cycle_count(), "candidate built");
                let better = best.as_ref().map_or(true, |b| {
                    (program.cycle_count(), parallelism) < (b.cycles(), b.parallelism)
                });
                if better {
                    let stats = program.stats(config);
                    best = Some(Kernel { program, parallelism, stats, schedule });
                }
            }
            Err(err) => {
                warn!(parallelism, %err, "candidate dropped");
                last_err = Some(err);
            }
        }
    }

    match best {
        Some(kernel) => {
            info!(parallelism = kernel.parallelism, cycles = kernel.cycles(), "selected kernel");
            Ok(kernel)
        }
        None => Err(last_err.unwrap_or_else(|| BuildError::InvalidParams("no parallelism candidate".into()))),
    }
}
