// ═══════════════════════════════════════════════════════════════════════════
// Layer 0: Core (No internal dependencies)
// ═══════════════════════════════════════════════════════════════════════════
pub mod core;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 1: Workload (depends on core)
// ═══════════════════════════════════════════════════════════════════════════
pub mod workload;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 2: Code Generation (depends on core, workload)
// ═══════════════════════════════════════════════════════════════════════════
pub mod codegen;

// ═══════════════════════════════════════════════════════════════════════════
// Layer 3: Execution (depends on core, workload, codegen)
// ═══════════════════════════════════════════════════════════════════════════
pub mod vm;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use crate::core::error::{
    BuildError, BuildResult, CorrectnessMismatch, ErrorCategory, ExecError, ExecResult, KernelError,
    KernelResult, LegalityViolation,
};
pub use crate::core::{Engine, Instruction, MachineConfig, Program, ProgramStats, Word};
pub use codegen::{build_kernel, BuildOptions, Kernel, KernelParams, Parallelism};
pub use vm::{check_program, verify, Machine, RunStats, Workload};
pub use workload::{reference_image, reference_kernel, Batch, Tree};

/// Cycles taken by the straight-line scalar implementation of the reference
/// workload (height 10, 256 walkers, 16 rounds).
pub const BASELINE_CYCLES: usize = 147_734;

/// Build a kernel for `params` and check it on a seeded random workload.
pub fn build_and_check(
    params: &KernelParams,
    config: &MachineConfig,
    options: &BuildOptions,
    seed: u64,
) -> KernelResult<(Kernel, RunStats)> {
    let kernel = build_kernel(params, config, options)?;
    let workload = Workload::random(params, seed);
    let stats = check_program(&kernel.program, config, &workload, options.trace_checks)?;
    Ok((kernel, stats))
}

mod determinism_tests;
