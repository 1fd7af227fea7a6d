//! Integration tests for the legality checker.
//!
//! Component: vm::legality
//!
//! These tests verify:
//! - Generated programs never overflow an engine or read early
//! - Hand-built violations are reported with their location
//! - The checker and the simulator agree on the timing model
//! - Writes to one word must commit in issue order

#![cfg(test)]

use crate::common::*;

use forest_kernel::vm::violations;
use forest_kernel::*;

// =============================================================================
// Generated Program Tests
// =============================================================================

mod generated_programs {
    use super::*;

    #[test]
    fn reference_kernel_is_legal() {
        // Arrange
        let config = default_machine();

        // Act
        let kernel = build(&KernelParams::reference(), &config, &BuildOptions::default());

        // Assert
        assert_within_widths(&kernel.program, &config);
        assert_legal(&kernel.program, &config);
    }

    #[test]
    fn every_engine_latency_is_respected() {
        let params = KernelParams::new(5, 48, 6);
        for engine in [Engine::Alu, Engine::Valu, Engine::Load, Engine::Store, Engine::Flow] {
            // Arrange
            let config = default_machine().with_latency(engine, 4);

            // Act
            let kernel = build(&params, &config, &BuildOptions::default());

            // Assert
            assert_legal(&kernel.program, &config);
        }
    }

    #[test]
    fn narrow_machine_is_respected() {
        // Arrange
        let config = default_machine()
            .with_width(Engine::Valu, 2)
            .with_width(Engine::Load, 1)
            .with_width(Engine::Alu, 3);
        let params = KernelParams::new(5, 40, 5);

        // Act
        let (kernel, _) = build_and_run(&params, &config, &BuildOptions::default(), 6);

        // Assert
        assert_within_widths(&kernel.program, &config);
        assert_legal(&kernel.program, &config);
    }

    #[test]
    fn program_is_illegal_on_a_slower_machine() {
        // Arrange: built for unit latencies, checked against slow loads
        let kernel = build(&KernelParams::new(4, 32, 4), &default_machine(), &BuildOptions::default());

        // Act
        let found = violations(&kernel.program, &slow_machine());

        // Assert
        assert!(found.iter().any(|v| matches!(v, LegalityViolation::StaleRead { .. })));
    }
}

// =============================================================================
// Hand-built Violation Tests
// =============================================================================

mod hand_built {
    use super::*;
    use forest_kernel::core::AluOp;

    #[test]
    fn overflowing_bundle_is_located() {
        // Arrange
        let store = |i| Instruction::Store { addr: i, src: i };
        let program = program_of(vec![vec![], vec![store(0), store(1), store(2)]]);

        // Act
        let err = verify(&program, &default_machine()).unwrap_err();

        // Assert
        assert_eq!(
            err,
            LegalityViolation::SlotOverflow { cycle: 1, engine: Engine::Store, count: 3, width: 2 }
        );
    }

    #[test]
    fn early_vector_read_is_stale() {
        // Arrange
        let config = default_machine().with_latency(Engine::Valu, 2);
        let program = program_of(vec![
            vec![Instruction::Valu { op: AluOp::Add, dest: 16, a: 0, b: 8 }],
            vec![Instruction::Valu { op: AluOp::Mul, dest: 24, a: 16, b: 16 }],
        ]);

        // Act
        let found = violations(&program, &config);

        // Assert: every lane of the operand is reported once
        assert_eq!(found.len(), 8);
        assert!(found.iter().all(|v| matches!(v, LegalityViolation::StaleRead { cycle: 1, writer_cycle: 0, .. })));
    }

    #[test]
    fn waiting_out_the_latency_is_legal() {
        // Arrange
        let config = default_machine().with_latency(Engine::Valu, 2);
        let program = program_of(vec![
            vec![Instruction::Valu { op: AluOp::Add, dest: 16, a: 0, b: 8 }],
            vec![],
            vec![Instruction::Valu { op: AluOp::Mul, dest: 24, a: 16, b: 16 }],
        ]);

        // Act & Assert
        assert!(verify(&program, &config).is_ok());
    }

    #[test]
    fn overtaking_write_is_rejected() {
        // Arrange: a slow const followed by a fast add to the same word
        let config = default_machine().with_latency(Engine::Load, 3);
        let program = program_of(vec![
            vec![Instruction::Const { dest: 4, value: 1 }],
            vec![Instruction::Alu { op: AluOp::Add, dest: 4, a: 0, b: 0 }],
            vec![],
            vec![],
        ]);

        // Act
        let err = verify(&program, &config).unwrap_err();
        let mut machine = Machine::new(&config, vec![0; 8]);
        machine.run(&program).unwrap();

        // Assert: the earlier write lands last, which is what the checker reports
        assert!(matches!(err, LegalityViolation::CommitOrder { addr: 4, earlier: 0, later: 1, .. }));
        assert_eq!(machine.scratch()[4], 1);
    }

    #[test]
    fn verify_reports_the_first_violation() {
        // Arrange
        let load = |d| Instruction::Const { dest: d, value: d };
        let program = program_of(vec![vec![load(0), load(1), load(2)], vec![load(3), load(4), load(5)]]);

        // Act
        let first = verify(&program, &default_machine()).unwrap_err();
        let all = violations(&program, &default_machine());

        // Assert
        assert_eq!(all.len(), 2);
        assert_eq!(first, all[0]);
    }
}
