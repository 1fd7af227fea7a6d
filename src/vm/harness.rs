//! End-to-end checking of a generated program.
//!
//! A check verifies the issue rules, runs the oracle on a copy of the
//! memory image, simulates the program on the untouched image and compares the
//! batch regions.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::codegen::KernelParams;
use crate::core::{KernelResult, MachineConfig, Program, Word};
use crate::workload::{build_mem_image, check_output, reference_image, Batch, Tree};

use super::legality;
use super::machine::{Machine, RunStats};

/// A concrete tree and batch to run a program on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub tree: Tree,
    pub batch: Batch,
    pub rounds: usize,
}

impl Workload {
    pub fn new(tree: Tree, batch: Batch, rounds: usize) -> Self {
        Self { tree, batch, rounds }
    }

    /// Seeded random workload with every walker at the root.
    pub fn random(params: &KernelParams, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = Tree::generate(params.forest_height, &mut rng);
        let batch = Batch::generate(params.batch_size, &mut rng);
        Self::new(tree, batch, params.rounds)
    }

    /// Memory image for this workload.
    pub fn image(&self) -> Vec<Word> {
        build_mem_image(&self.tree, &self.batch, self.rounds)
    }
}

/// Verify, simulate and compare one program against the oracle.
///
/// With `trace` set, the program's comparison ops are checked against the
/// reference trace as they issue.
pub fn check_program(
    program: &Program,
    config: &MachineConfig,
    workload: &Workload,
    trace: bool,
) -> KernelResult<RunStats> {
    legality::verify(program, config)?;

    let mem = workload.image();
    let mut expected = mem.clone();
    let reference = reference_image(&mut expected)?;

    let mut machine = Machine::new(config, mem);
    if trace {
        machine = machine.with_trace(&reference);
    }
    let stats = machine.run(program)?;
    check_output(&expected, machine.memory(), config.vlen)?;

    debug!(cycles = stats.cycles, checks = stats.trace_checks, "program matches reference");
    Ok(stats)
}
