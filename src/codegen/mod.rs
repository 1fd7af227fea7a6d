//! Program generation.
//!
//! - **Scratch**: Bump allocator and constant interning
//! - **Emitter**: Cap-enforcing bundle packing
//! - **Graph**: Latency-annotated dependency graph in program order
//! - **Schedule**: Per-engine ready-list scheduler
//! - **Plan**: Per-round lowering choices from tracked tree levels
//! - **Kernel**: Lowering of the walk for one parallelism degree
//! - **Search**: Parallel selection of the parallelism degree
//!
//! # Layer 2 - depends on core, workload

pub mod emitter;
pub mod graph;
pub mod kernel;
pub mod params;
pub mod plan;
pub mod schedule;
pub mod scratch;
pub mod search;

pub use emitter::{BundleEmitter, OpSink};
pub use graph::{MemAccess, MemRegion, OpGraph, OpId, OpNode};
pub use kernel::KernelBuilder;
pub use params::{parallelism_candidates, BuildOptions, KernelParams, Parallelism};
pub use plan::{plan_rounds, GatherMode, IndexUpdate, RoundPlan};
pub use schedule::{schedule, ScheduleStats};
pub use scratch::{ConstantPool, ScratchAllocator};
pub use search::{build_kernel, Kernel};
