//! Integration tests for degenerate shapes.
//!
//! Component: codegen + vm
//!
//! These tests verify:
//! - Zero rounds and empty batches give trivial legal programs
//! - A single chunk and partial chunks are handled
//! - Walkers that fall off the tree restart at the root
//! - Invalid machines and parameters are rejected

#![cfg(test)]

use crate::common::*;

use forest_kernel::workload::MemoryLayout;
use forest_kernel::*;

/// Run a kernel on a workload and return the final image.
fn final_image(kernel: &Kernel, config: &MachineConfig, workload: &Workload) -> Vec<Word> {
    let mut machine = Machine::new(config, workload.image());
    machine.run(&kernel.program).expect("simulation failed");
    machine.into_memory()
}

// =============================================================================
// Degenerate Shape Tests
// =============================================================================

mod shapes {
    use super::*;

    #[test]
    fn zero_rounds_leaves_batch_unchanged() {
        // Arrange
        let params = KernelParams::new(5, 32, 0);
        let config = default_machine();
        let workload = Workload::random(&params, 3);
        let kernel = build(&params, &config, &BuildOptions::default());

        // Act
        let image = final_image(&kernel, &config, &workload);

        // Assert
        assert_eq!(image, workload.image());
    }

    #[test]
    fn zero_rounds_in_general_mode() {
        let params = KernelParams::new(5, 32, 0);
        build_and_run(&params, &default_machine(), &BuildOptions::general(), 3);
    }

    #[test]
    fn empty_batch_is_trivial() {
        // Arrange
        let params = KernelParams::new(5, 0, 8);

        // Act
        let (kernel, _) = build_and_run(&params, &default_machine(), &BuildOptions::default(), 0);

        // Assert
        assert_eq!(count_ops(&kernel.program, Instruction::writes_memory), 0);
    }

    #[test]
    fn single_chunk() {
        let config = default_machine();
        let params = KernelParams::new(6, config.vlen, 10);
        let (kernel, _) = build_and_run(&params, &config, &BuildOptions::default(), 2);
        assert_eq!(kernel.parallelism, 1);
    }

    #[test]
    fn partial_last_chunk() {
        for batch in [1, 5, 13, 31] {
            build_and_run(&KernelParams::new(4, batch, 6), &default_machine(), &BuildOptions::default(), 8);
            build_and_run(&KernelParams::new(4, batch, 6), &default_machine(), &BuildOptions::general(), 8);
        }
    }

    #[test]
    fn many_rounds_wrap_repeatedly() {
        build_and_run(&KernelParams::new(2, 16, 20), &default_machine(), &BuildOptions::default(), 4);
    }
}

// =============================================================================
// Root Reset Tests
// =============================================================================

mod root_reset {
    use super::*;

    #[test]
    fn single_walker_past_the_leaves_restarts_at_root() {
        // Arrange: height 2 has leaves 1 and 2, whose children fall off the tree
        let params = KernelParams::new(2, 1, 2);
        let config = default_machine();
        let workload = workload_with(&params, vec![0], vec![12345], 0);
        let kernel = build(&params, &config, &BuildOptions::default());

        // Act
        let image = final_image(&kernel, &config, &workload);

        // Assert
        let layout = MemoryLayout::read(&image).unwrap();
        assert_eq!(layout.indices(&image), &[0]);
        run_on(&kernel, &config, &workload);
    }

    #[test]
    fn leaf_start_resets_in_general_mode() {
        // Arrange: start every walker on the last leaf
        let params = KernelParams::new(3, 8, 1);
        let config = default_machine();
        let workload = workload_with(&params, vec![6; 8], (0..8).collect(), 0);
        let kernel = build(&params, &config, &BuildOptions::general());

        // Act
        let image = final_image(&kernel, &config, &workload);

        // Assert
        let layout = MemoryLayout::read(&image).unwrap();
        assert!(layout.indices(&image).iter().all(|&i| i == 0));
    }
}

// =============================================================================
// Rejection Tests
// =============================================================================

mod rejection {
    use super::*;

    #[test]
    fn zero_vector_width_is_rejected() {
        // Arrange
        let config = MachineConfig { vlen: 0, ..default_machine() };

        // Act
        let err = build_kernel(&KernelParams::new(3, 8, 1), &config, &BuildOptions::default()).unwrap_err();

        // Assert
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn zero_width_engine_is_rejected() {
        let config = default_machine().with_width(Engine::Load, 0);
        let err = build_kernel(&KernelParams::new(3, 8, 1), &config, &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn empty_tree_is_rejected() {
        let err = build_kernel(&KernelParams::new(0, 8, 1), &default_machine(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams(_)));
    }

    #[test]
    fn overtall_tree_is_rejected() {
        let err = build_kernel(&KernelParams::new(64, 8, 1), &default_machine(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidParams(_)));
    }

    #[test]
    fn malformed_machine_json_is_rejected() {
        let err = MachineConfig::from_json("{\"vlen\": ").unwrap_err();
        assert!(matches!(err, BuildError::ConfigParse(_)));
    }

    #[test]
    fn machine_json_round_trips() {
        let config = slow_machine();
        assert_eq!(MachineConfig::from_json(&config.to_json()).unwrap(), config);
    }
}
