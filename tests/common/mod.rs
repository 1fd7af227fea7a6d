//! Shared test utilities for forest-kernel integration tests.
//!
//! This module provides:
//! - Machine and option builders
//! - Workload generators
//! - Build-and-check helpers
//! - Assertion helpers for programs and errors
//!
//! ## AAA Pattern
//!
//! All tests follow the Arrange-Act-Assert pattern:
//! - Arrange: Set up the machine, parameters and workload
//! - Act: Build the kernel and run it
//! - Assert: Verify the expected outcome

#![allow(dead_code)]

use forest_kernel::core::Bundle;
use forest_kernel::vm::violations;
use forest_kernel::*;

// =============================================================================
// Machine Builders
// =============================================================================

/// The standard machine.
pub fn default_machine() -> MachineConfig {
    MachineConfig::default()
}

/// Standard widths with slow loads and vector ops.
pub fn slow_machine() -> MachineConfig {
    MachineConfig::default()
        .with_latency(Engine::Load, 3)
        .with_latency(Engine::Valu, 2)
}

/// Standard machine with a smaller scratch.
pub fn machine_with_scratch(scratch_size: usize) -> MachineConfig {
    MachineConfig { scratch_size, ..MachineConfig::default() }
}

// =============================================================================
// Build Helpers
// =============================================================================

/// Build a kernel, panicking on failure.
pub fn build(params: &KernelParams, config: &MachineConfig, options: &BuildOptions) -> Kernel {
    build_kernel(params, config, options).expect("kernel build failed")
}

/// Build a kernel and check it on a seeded random workload.
pub fn build_and_run(params: &KernelParams, config: &MachineConfig, options: &BuildOptions, seed: u64) -> (Kernel, RunStats) {
    match build_and_check(params, config, options, seed) {
        Ok(result) => result,
        Err(e) => panic!("kernel for {:?} failed: {}", params, e),
    }
}

/// Check an existing program on an explicit workload.
pub fn run_on(kernel: &Kernel, config: &MachineConfig, workload: &Workload) -> RunStats {
    match check_program(&kernel.program, config, workload, false) {
        Ok(stats) => stats,
        Err(e) => panic!("program failed: {}", e),
    }
}

// =============================================================================
// Workload Generators
// =============================================================================

/// Workload with explicit start indices and values.
pub fn workload_with(params: &KernelParams, indices: Vec<Word>, values: Vec<Word>, seed: u64) -> Workload {
    let tree = Workload::random(params, seed).tree;
    let batch = Batch::with_indices(indices, values).expect("mismatched batch");
    Workload::new(tree, batch, params.rounds)
}

/// Program built from explicit bundles.
pub fn program_of(bundles: Vec<Vec<Instruction>>) -> Program {
    let bundles = bundles
        .into_iter()
        .map(|ops| {
            let mut bundle = Bundle::new();
            for op in ops {
                bundle.push(op);
            }
            bundle
        })
        .collect();
    Program::new(bundles, Default::default())
}

// =============================================================================
// Assertion Helpers
// =============================================================================

/// Assert that no bundle exceeds its engine widths and no read is early.
pub fn assert_legal(program: &Program, config: &MachineConfig) {
    let found = violations(program, config);
    assert!(found.is_empty(), "program has {} violations, first: {}", found.len(), found[0]);
}

/// Assert that every bundle respects the engine widths.
pub fn assert_within_widths(program: &Program, config: &MachineConfig) {
    for (cycle, bundle) in program.bundles.iter().enumerate() {
        for engine in Engine::ALL {
            assert!(
                bundle.count(engine) <= config.width(engine),
                "cycle {}: {} {} ops",
                cycle,
                bundle.count(engine),
                engine
            );
        }
    }
}

/// Count operations matching a predicate.
pub fn count_ops(program: &Program, pred: impl Fn(&Instruction) -> bool) -> usize {
    program.ops().filter(|(_, op)| pred(op)).count()
}
