//! The walk workload: mixing function, data generation and the reference walk.
//!
//! # Layer 1 - depends on core

pub mod hash;
pub mod model;
pub mod oracle;

pub use hash::{myhash, HashStage, StageLowering, HASH_STAGES, HASH_STAGE_COUNT};
pub use model::{build_mem_image, node_count, Batch, MemoryLayout, Tree, HEADER_WORDS};
pub use oracle::{check_output, reference_image, reference_kernel, step, ValueTrace};
