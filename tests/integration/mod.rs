//! Integration tests for forest-kernel.
//!
//! This module organises integration tests by component.

pub mod edge_cases;
pub mod kernel;
pub mod legality;
pub mod scratch;
