//! Scratch allocation and constant interning.
//!
//! Scratch is a bump region: slots are handed out once per build and never
//! freed, so live slots can never overlap. Constants are materialized once
//! and shared by every user.

use std::collections::HashMap;

use crate::core::{Addr, BuildError, BuildResult, DebugInfo, Instruction, Word};

use super::emitter::OpSink;

/// Monotonic scratch allocator with a debug name map.
#[derive(Debug, Clone)]
pub struct ScratchAllocator {
    cursor: usize,
    capacity: usize,
    debug: DebugInfo,
}

impl ScratchAllocator {
    pub fn new(capacity: usize) -> Self {
        Self { cursor: 0, capacity, debug: DebugInfo::default() }
    }

    /// Reserve `width` consecutive words.
    pub fn alloc(&mut self, name: Option<&str>, width: usize) -> BuildResult<Addr> {
        let end = self.cursor.checked_add(width).filter(|&end| end <= self.capacity);
        let Some(end) = end else {
            return Err(BuildError::ScratchExhausted {
                name: name.unwrap_or("<anonymous>").to_string(),
                width,
                used: self.cursor,
                capacity: self.capacity,
            });
        };
        let addr = self.cursor as Addr;
        if let Some(name) = name {
            self.debug.scratch_map.insert(addr, (name.to_string(), width));
        }
        self.cursor = end;
        Ok(addr)
    }

    /// Reserve one word.
    #[inline]
    pub fn scalar(&mut self, name: &str) -> BuildResult<Addr> {
        self.alloc(Some(name), 1)
    }

    /// Reserve one vector register.
    #[inline]
    pub fn vector(&mut self, name: &str, vlen: usize) -> BuildResult<Addr> {
        self.alloc(Some(name), vlen)
    }

    /// Words handed out so far.
    pub fn used(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }

    pub fn labels(&self) -> &DebugInfo {
        &self.debug
    }

    pub fn into_debug_info(self) -> DebugInfo {
        self.debug
    }
}

/// Interned scalar and broadcast-vector constants.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    scalars: HashMap<Word, Addr>,
    vectors: HashMap<Word, Addr>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address holding `value`, materialized with one `const` on first use.
    pub fn scalar<S: OpSink + ?Sized>(
        &mut self,
        alloc: &mut ScratchAllocator,
        sink: &mut S,
        value: Word,
    ) -> BuildResult<Addr> {
        if let Some(&addr) = self.scalars.get(&value) {
            return Ok(addr);
        }
        let addr = alloc.scalar(&format!("const_{:#x}", value))?;
        sink.push_op(Instruction::Const { dest: addr, value });
        self.scalars.insert(value, addr);
        Ok(addr)
    }

    /// Vector with `value` in every lane, broadcast once from the interned scalar.
    pub fn vector<S: OpSink + ?Sized>(
        &mut self,
        alloc: &mut ScratchAllocator,
        sink: &mut S,
        value: Word,
        vlen: usize,
    ) -> BuildResult<Addr> {
        if let Some(&addr) = self.vectors.get(&value) {
            return Ok(addr);
        }
        let src = self.scalar(alloc, sink, value)?;
        let addr = alloc.vector(&format!("vconst_{:#x}", value), vlen)?;
        sink.push_op(Instruction::VBroadcast { dest: addr, src });
        self.vectors.insert(value, addr);
        Ok(addr)
    }

    /// Distinct scalar constants.
    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }
}
