//! Core types shared by the generator and the simulator.
//!
//! - **Config**: Machine description (engines, widths, latencies, vlen, scratch size)
//! - **Isa**: Addresses, words and the instruction set
//! - **Program**: Bundles, programs and slot statistics
//! - **Error**: Error hierarchy for build, legality, correctness and execution
//!
//! # Layer 0 - No Internal Dependencies
//!
//! This module has no dependencies on other crate modules,
//! allowing it to be imported by all other layers.

pub mod config;
pub mod error;
pub mod isa;
pub mod program;

pub use config::{Engine, EngineSpec, EngineTable, MachineConfig};
pub use error::{
    BatchField, BuildError, BuildResult, CorrectnessMismatch, ErrorCategory, ExecError,
    ExecResult, KernelError, KernelResult, LegalityViolation,
};
pub use isa::{Addr, AluOp, Instruction, TraceKey, TraceStage, Word};
pub use program::{Bundle, DebugInfo, Program, ProgramStats};
