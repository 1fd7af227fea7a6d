//! Error types for kernel generation and execution.
//!
//! # Error Categories
//!
//! - **Build Errors**: The generator cannot produce a program for the given
//!   machine and parameters (scratch exhausted, invalid description)
//! - **Legality Violations**: A program breaks an issue width or latency
//!   rule of the machine. Raised only by the static verifier.
//! - **Correctness Mismatches**: A program ran but disagrees with the
//!   reference walk, either on a traced intermediate or on the final image
//! - **Execution Errors**: The simulator hit a fault while running a program
//!
//! # Design Principles
//!
//! 1. **Fatal at build time**: A build error aborts the build. No partial
//!    program is ever returned.
//! 2. **Context-Rich**: Every error carries the addresses, cycles or
//!    elements needed to locate the fault
//! 3. **Typed**: Each layer returns its own error type. `KernelError` unifies them
//!    for callers that drive the whole pipeline.

use thiserror::Error;

use super::config::Engine;
use super::isa::{Addr, TraceKey, Word};

/// Which batch array a final-image mismatch was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BatchField {
    Indices,
    Values,
}

impl std::fmt::Display for BatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchField::Indices => f.write_str("indices"),
            BatchField::Values => f.write_str("values"),
        }
    }
}

/// Fatal errors raised while generating a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Requested scratch range does not fit in the remaining capacity.
    #[error("scratch exhausted allocating {width} words for '{name}': {used} of {capacity} already in use")]
    ScratchExhausted {
        name: String,
        width: usize,
        used: usize,
        capacity: usize,
    },

    /// Machine description cannot host any program.
    #[error("invalid machine description: {0}")]
    InvalidConfig(String),

    /// Workload parameters are inconsistent.
    #[error("invalid kernel parameters: {0}")]
    InvalidParams(String),

    /// Machine description text could not be parsed.
    #[error("cannot parse machine description: {0}")]
    ConfigParse(String),
}

/// Ways a program can break the machine's issue rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LegalityViolation {
    /// More operations on one engine than its issue width.
    #[error("cycle {cycle}: {count} {engine} operations exceed width {width}")]
    SlotOverflow {
        cycle: usize,
        engine: Engine,
        count: usize,
        width: usize,
    },

    /// Operand read while an earlier write to it is still in flight.
    #[error("cycle {cycle}: s{addr} read before the write issued at cycle {writer_cycle} is visible at cycle {visible_at}")]
    StaleRead {
        cycle: usize,
        addr: Addr,
        writer_cycle: usize,
        visible_at: usize,
    },

    /// Two writes to one scratch word commit in the same cycle.
    #[error("s{addr}: writes issued at cycles {first} and {second} commit together at cycle {commit}")]
    WriteConflict {
        addr: Addr,
        first: usize,
        second: usize,
        commit: usize,
    },

    /// A later write to a scratch word commits before an earlier one.
    #[error("s{addr}: write issued at cycle {later} commits at cycle {later_commit}, before the write issued at cycle {earlier} (commit {earlier_commit})")]
    CommitOrder {
        addr: Addr,
        earlier: usize,
        earlier_commit: usize,
        later: usize,
        later_commit: usize,
    },
}

/// A program disagrees with the reference walk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectnessMismatch {
    /// A traced intermediate differs.
    #[error("round {round}, chunk {chunk}, element {element}, {stage}: expected {expected:#010x}, found {found:#010x}")]
    Trace {
        round: u32,
        chunk: usize,
        element: u32,
        stage: String,
        expected: Word,
        found: Word,
    },

    /// The final memory image differs.
    #[error("final {field}[{element}] (chunk {chunk}): expected {expected:#010x}, found {found:#010x}")]
    FinalImage {
        field: BatchField,
        element: usize,
        chunk: usize,
        expected: Word,
        found: Word,
    },
}

/// Faults raised by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("cycle {cycle}: memory address {addr} out of bounds (size {size})")]
    MemoryOutOfBounds { cycle: usize, addr: usize, size: usize },

    #[error("cycle {cycle}: scratch address {addr} out of bounds (size {size})")]
    ScratchOutOfBounds { cycle: usize, addr: usize, size: usize },

    #[error("cycle {cycle}: division by zero")]
    DivisionByZero { cycle: usize },

    #[error("cycle {cycle}: no reference value for {key}")]
    MissingTrace { cycle: usize, key: TraceKey },

    #[error(transparent)]
    Mismatch(#[from] CorrectnessMismatch),
}

/// Unified error for callers that drive build, verification and execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Legality(#[from] LegalityViolation),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Mismatch(#[from] CorrectnessMismatch),
}

/// Coarse classification for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Resource,
    Legality,
    Correctness,
    Execution,
}

impl KernelError {
    /// Category for reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            KernelError::Build(BuildError::ScratchExhausted { .. }) => ErrorCategory::Resource,
            KernelError::Build(_) => ErrorCategory::Configuration,
            KernelError::Legality(_) => ErrorCategory::Legality,
            KernelError::Exec(ExecError::Mismatch(_)) | KernelError::Mismatch(_) => {
                ErrorCategory::Correctness
            }
            KernelError::Exec(_) => ErrorCategory::Execution,
        }
    }

    /// Whether the error reflects a defect in a generated program rather than bad input.
    pub fn is_defect(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Legality | ErrorCategory::Correctness | ErrorCategory::Execution
        )
    }

    /// Whether a build with different settings could succeed.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Resource
    }
}

/// Result type for program generation.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for simulation.
pub type ExecResult<T> = Result<T, ExecError>;

/// Result type for the full pipeline.
pub type KernelResult<T> = Result<T, KernelError>;
