//! Execution side of the crate.
//!
//! - **Machine**: cycle-stepped simulator with delayed commits
//! - **Legality**: static check of issue widths and latencies
//! - **Harness**: verify, simulate and compare against the oracle
//!
//! # Timing Model
//!
//! Bundle `t` issues at cycle `t` and reads every operand at issue. A result
//! with latency `L` becomes visible to bundle `t + L`. The legality checker
//! and the simulator share this model, so a program the checker accepts
//! computes the same values on the simulator regardless of latencies.
//!
//! # Layer 3 - depends on core, workload, codegen

pub mod harness;
pub mod legality;
pub mod machine;

pub use harness::{check_program, Workload};
pub use legality::{verify, violations};
pub use machine::{Machine, RunStats};
