//! Integration tests for kernel generation.
//!
//! Component: codegen + vm
//!
//! These tests verify:
//! - The reference workload matches the oracle within the cycle ceiling
//! - Correctness under non-unit latencies and without level shortcuts
//! - Trace comparisons agree with the oracle stage by stage
//! - Schedule statistics are consistent with the program

#![cfg(test)]

use crate::common::*;

use forest_kernel::codegen::parallelism_candidates;
use forest_kernel::*;

/// Cycles the reference kernel must stay under.
const REFERENCE_CEILING: usize = 2400;

// =============================================================================
// Reference Workload Tests
// =============================================================================

mod reference_workload {
    use super::*;

    #[test]
    fn matches_oracle_under_ceiling() {
        // Arrange
        let params = KernelParams::reference();
        let config = default_machine();

        // Act
        let (kernel, stats) = build_and_run(&params, &config, &BuildOptions::default(), 0);

        // Assert
        assert_eq!(stats.cycles, kernel.cycles());
        assert!(kernel.cycles() < REFERENCE_CEILING, "{} cycles", kernel.cycles());
        assert!(kernel.cycles() * 60 < BASELINE_CYCLES);
    }

    #[test]
    fn matches_oracle_for_several_seeds() {
        // Arrange
        let params = KernelParams::reference();
        let config = default_machine();
        let kernel = build(&params, &config, &BuildOptions::default());

        // Act & Assert
        for seed in [1, 2, 3] {
            run_on(&kernel, &config, &Workload::random(&params, seed));
        }
    }

    #[test]
    fn general_mode_is_correct_and_slower() {
        // Arrange
        let params = KernelParams::reference();
        let config = default_machine();

        // Act
        let (general, _) = build_and_run(&params, &config, &BuildOptions::general(), 5);
        let fast = build(&params, &config, &BuildOptions::default());

        // Assert: shortcuts remove four of the sixteen gather rounds
        assert!(fast.cycles() < general.cycles());
    }

    #[test]
    fn auto_parallelism_picks_a_candidate() {
        // Arrange
        let params = KernelParams::reference();
        let config = default_machine();

        // Act
        let kernel = build(&params, &config, &BuildOptions::default());

        // Assert
        let chunks = params.chunk_count(config.vlen);
        assert!(parallelism_candidates(Parallelism::Auto, chunks).contains(&kernel.parallelism));
    }
}

// =============================================================================
// Latency Tests
// =============================================================================

mod latencies {
    use super::*;

    #[test]
    fn slow_loads_and_vectors_stay_correct() {
        // Arrange
        let params = KernelParams::new(8, 128, 12);
        let config = slow_machine();

        // Act
        let (kernel, _) = build_and_run(&params, &config, &BuildOptions::default(), 9);

        // Assert
        assert_legal(&kernel.program, &config);
    }

    #[test]
    fn uniform_latency_costs_cycles() {
        // Arrange
        let params = KernelParams::new(6, 64, 8);

        // Act
        let unit = build(&params, &default_machine(), &BuildOptions::default());
        let (slow, _) = build_and_run(&params, &MachineConfig::uniform_latency(3), &BuildOptions::default(), 2);

        // Assert
        assert!(unit.cycles() <= slow.cycles());
    }

    #[test]
    fn long_store_latency_drains_before_end() {
        // Arrange
        let params = KernelParams::new(4, 32, 3);
        let config = default_machine().with_latency(Engine::Store, 5);

        // Act & Assert: the final image is read after pending stores drain
        build_and_run(&params, &config, &BuildOptions::default(), 4);
    }
}

// =============================================================================
// Trace Check Tests
// =============================================================================

mod trace_checks {
    use super::*;

    #[test]
    fn traced_program_checks_every_stage() {
        // Arrange
        let params = KernelParams::new(4, 16, 6);
        let config = default_machine();

        let options = BuildOptions { trace_checks: true, ..BuildOptions::general() };

        // Act
        let (kernel, stats) = build_and_run(&params, &config, &options, 3);

        // Assert: node value, six hash stages and the wrapped index per element and round
        let expected = params.batch_size * params.rounds * 8;
        assert_eq!(stats.trace_checks, expected);
        assert!(count_ops(&kernel.program, |op| op.engine() == Engine::Debug) > 0);
    }

    #[test]
    fn reset_rounds_skip_the_index_check() {
        // Arrange: height 4 resets to the root after round 3
        let params = KernelParams::new(4, 16, 6);

        // Act
        let (_, stats) = build_and_run(&params, &default_machine(), &BuildOptions::traced(), 3);

        // Assert
        assert_eq!(stats.trace_checks, params.batch_size * (params.rounds * 8 - 1));
    }

    #[test]
    fn traced_program_matches_under_latency() {
        // Arrange
        let params = KernelParams::new(5, 24, 7);

        // Act & Assert
        build_and_run(&params, &slow_machine(), &BuildOptions::traced(), 8);
    }

    #[test]
    fn untraced_program_has_no_debug_ops() {
        // Arrange
        let params = KernelParams::new(4, 16, 6);

        // Act
        let kernel = build(&params, &default_machine(), &BuildOptions::default());

        // Assert
        assert_eq!(count_ops(&kernel.program, |op| op.engine() == Engine::Debug), 0);
    }
}

// =============================================================================
// Statistics Tests
// =============================================================================

mod statistics {
    use super::*;

    #[test]
    fn cycles_respect_lower_bounds() {
        // Arrange
        let params = KernelParams::new(7, 128, 10);

        // Act
        let kernel = build(&params, &default_machine(), &BuildOptions::default());

        // Assert
        assert!(kernel.cycles() >= kernel.stats.resource_bound());
        assert!(kernel.cycles() as u64 >= kernel.schedule.critical_path);
        assert_eq!(kernel.stats.cycles, kernel.cycles());
        assert_eq!(kernel.schedule.ops, kernel.program.op_count());
    }

    #[test]
    fn stats_render() {
        // Arrange
        let kernel = build(&KernelParams::new(3, 16, 2), &default_machine(), &BuildOptions::default());

        // Act
        let text = kernel.stats.to_string();

        // Assert
        assert!(text.contains("SCHEDULE STATISTICS"));
        assert!(text.contains("valu"));
    }

    #[test]
    fn program_json_reloads() {
        // Arrange
        let kernel = build(&KernelParams::new(3, 16, 2), &default_machine(), &BuildOptions::default());

        // Act
        let parsed: Program = serde_json::from_str(&kernel.program.to_json()).unwrap();

        // Assert
        assert_eq!(parsed, kernel.program);
    }
}
