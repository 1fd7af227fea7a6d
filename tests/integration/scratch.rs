//! Integration tests for scratch allocation.
//!
//! Component: codegen::scratch
//!
//! These tests verify:
//! - Constants are interned: one `const` per distinct value
//! - Exhaustion names the allocation that did not fit
//! - Debug labels cover the scratch a program uses

#![cfg(test)]

use crate::common::*;

use forest_kernel::codegen::{ConstantPool, ScratchAllocator};
use forest_kernel::*;

// =============================================================================
// Constant Interning Tests
// =============================================================================

mod interning {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn repeated_request_returns_same_slot() {
        // Arrange
        let mut alloc = ScratchAllocator::new(64);
        let mut pool = ConstantPool::new();
        let mut ops: Vec<Instruction> = Vec::new();

        // Act
        let a = pool.scalar(&mut alloc, &mut ops, 0x7ED5_5D16).unwrap();
        let b = pool.scalar(&mut alloc, &mut ops, 0x7ED5_5D16).unwrap();

        // Assert
        assert_eq!(a, b);
        assert_eq!(ops.len(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn kernel_materializes_each_constant_once() {
        // Arrange
        let kernel = build(&KernelParams::reference(), &default_machine(), &BuildOptions::default());

        // Act
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for (_, op) in kernel.program.ops() {
            if let Instruction::Const { value, .. } = op {
                if !seen.insert(*value) {
                    duplicates.push(*value);
                }
            }
        }

        // Assert
        assert!(duplicates.is_empty(), "constants emitted twice: {:x?}", duplicates);
        assert!(seen.contains(&4097));
    }

    #[test]
    fn vector_constants_broadcast_once() {
        // Arrange
        let kernel = build(&KernelParams::new(6, 128, 8), &default_machine(), &BuildOptions::default());

        // Act
        let broadcasts = count_ops(&kernel.program, |op| matches!(op, Instruction::VBroadcast { .. }));
        let distinct: HashSet<_> = kernel
            .program
            .ops()
            .filter_map(|(_, op)| match op {
                Instruction::VBroadcast { dest, .. } => Some(*dest),
                _ => None,
            })
            .collect();

        // Assert
        assert_eq!(broadcasts, distinct.len());
    }
}

// =============================================================================
// Exhaustion Tests
// =============================================================================

mod exhaustion {
    use super::*;

    #[test]
    fn report_names_offending_allocation() {
        // Arrange
        let config = machine_with_scratch(40);

        // Act
        let err = build_kernel(&KernelParams::new(4, 64, 3), &config, &BuildOptions::fixed(8)).unwrap_err();

        // Assert
        match err {
            BuildError::ScratchExhausted { name, width, used, capacity } => {
                assert!(!name.is_empty());
                assert_eq!(capacity, 40);
                assert!(used + width > capacity);
            }
            other => panic!("expected exhaustion, got {}", other),
        }
    }

    #[test]
    fn program_fits_its_scratch() {
        // Arrange
        let config = default_machine();

        // Act
        let kernel = build(&KernelParams::reference(), &config, &BuildOptions::default());

        // Assert
        assert!(kernel.program.debug.extent() <= config.scratch_size);
        for (_, op) in kernel.program.ops() {
            for addr in op.writes(config.vlen) {
                assert!((addr as usize) < config.scratch_size);
                assert!(kernel.program.debug.describe(addr).is_some(), "s{} has no label", addr);
            }
        }
    }

    #[test]
    fn smaller_scratch_lowers_parallelism() {
        // Arrange
        let params = KernelParams::new(5, 128, 4);
        let roomy = build(&params, &default_machine(), &BuildOptions::fixed(4));
        let config = machine_with_scratch(roomy.program.debug.extent());

        // Act
        let (kernel, _) = build_and_run(&params, &config, &BuildOptions::default(), 1);

        // Assert
        assert!(kernel.parallelism <= 4);
    }
}
