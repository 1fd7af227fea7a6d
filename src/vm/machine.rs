//! Cycle-stepped simulator.
//!
//! Bundle `t` issues at cycle `t`. Every operand of every operation in the
//! bundle is read before any result of the bundle lands. A result of an
//! operation with latency `L` commits at the end of cycle `t + L - 1`; writes
//! committing in the same cycle land in issue order. Results still in
//! flight when the program ends are drained in commit order.

use std::collections::BTreeMap;

use crate::core::{
    Addr, AluOp, CorrectnessMismatch, Engine, ExecError, ExecResult, Instruction, MachineConfig, Program,
    TraceKey, Word,
};
use crate::workload::ValueTrace;

/// Where a pending write lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Scratch,
    Memory,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    target: Target,
    addr: usize,
    value: Word,
}

/// Counters from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: usize,
    pub ops: usize,
    pub trace_checks: usize,
}

/// Processor state for one program run.
#[derive(Debug, Clone)]
pub struct Machine<'a> {
    config: &'a MachineConfig,
    scratch: Vec<Word>,
    mem: Vec<Word>,
    trace: Option<&'a ValueTrace>,
    pending: BTreeMap<usize, Vec<PendingWrite>>,
    cycle: usize,
    halted: bool,
    stats: RunStats,
}

impl<'a> Machine<'a> {
    pub fn new(config: &'a MachineConfig, mem: Vec<Word>) -> Self {
        Self {
            config,
            scratch: vec![0; config.scratch_size],
            mem,
            trace: None,
            pending: BTreeMap::new(),
            cycle: 0,
            halted: false,
            stats: RunStats::default(),
        }
    }

    /// Enable trace comparisons against a reference run.
    pub fn with_trace(mut self, trace: &'a ValueTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Run every bundle, then drain results still in flight.
    pub fn run(&mut self, program: &Program) -> ExecResult<RunStats> {
        for bundle in &program.bundles {
            if self.halted {
                break;
            }
            self.issue(bundle.ops())?;
            self.commit_through(self.cycle);
            self.cycle += 1;
        }
        self.commit_through(usize::MAX);
        self.stats.cycles = self.cycle;
        Ok(self.stats)
    }

    pub fn memory(&self) -> &[Word] {
        &self.mem
    }

    pub fn into_memory(self) -> Vec<Word> {
        self.mem
    }

    pub fn scratch(&self) -> &[Word] {
        &self.scratch
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    fn commit_through(&mut self, cycle: usize) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > cycle {
                break;
            }
            for write in entry.remove() {
                match write.target {
                    Target::Scratch => self.scratch[write.addr] = write.value,
                    Target::Memory => self.mem[write.addr] = write.value,
                }
            }
        }
    }

    fn issue<'b>(&mut self, ops: impl Iterator<Item = &'b Instruction>) -> ExecResult<()> {
        let mut writes: Vec<(Engine, PendingWrite)> = Vec::new();
        for op in ops {
            self.stats.ops += 1;
            self.execute(op, &mut writes)?;
        }
        for (engine, write) in writes {
            let commit = self.cycle + (self.config.latency(engine) as usize).saturating_sub(1);
            self.pending.entry(commit).or_default().push(write);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Operand access
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    fn s(&self, addr: Addr) -> ExecResult<Word> {
        self.scratch.get(addr as usize).copied().ok_or(ExecError::ScratchOutOfBounds {
            cycle: self.cycle,
            addr: addr as usize,
            size: self.scratch.len(),
        })
    }

    #[inline]
    fn m(&self, addr: usize) -> ExecResult<Word> {
        self.mem.get(addr).copied().ok_or(ExecError::MemoryOutOfBounds {
            cycle: self.cycle,
            addr,
            size: self.mem.len(),
        })
    }

    fn scratch_target(&self, addr: Addr) -> ExecResult<usize> {
        let addr = addr as usize;
        if addr < self.scratch.len() {
            Ok(addr)
        } else {
            Err(ExecError::ScratchOutOfBounds { cycle: self.cycle, addr, size: self.scratch.len() })
        }
    }

    fn memory_target(&self, addr: usize) -> ExecResult<usize> {
        if addr < self.mem.len() {
            Ok(addr)
        } else {
            Err(ExecError::MemoryOutOfBounds { cycle: self.cycle, addr, size: self.mem.len() })
        }
    }

    fn alu(&self, op: AluOp, a: Word, b: Word) -> ExecResult<Word> {
        op.apply(a, b).ok_or(ExecError::DivisionByZero { cycle: self.cycle })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════

    fn execute(&mut self, op: &Instruction, out: &mut Vec<(Engine, PendingWrite)>) -> ExecResult<()> {
        let engine = op.engine();
        let vlen = self.config.vlen as Addr;
        let mut to_scratch = |this: &Self, addr: Addr, value: Word| -> ExecResult<()> {
            let addr = this.scratch_target(addr)?;
            out.push((engine, PendingWrite { target: Target::Scratch, addr, value }));
            Ok(())
        };

        match *op {
            Instruction::Alu { op, dest, a, b } => {
                let value = self.alu(op, self.s(a)?, self.s(b)?)?;
                to_scratch(self, dest, value)?;
            }
            Instruction::Valu { op, dest, a, b } => {
                for i in 0..vlen {
                    let value = self.alu(op, self.s(a + i)?, self.s(b + i)?)?;
                    to_scratch(self, dest + i, value)?;
                }
            }
            Instruction::VBroadcast { dest, src } => {
                let value = self.s(src)?;
                for i in 0..vlen {
                    to_scratch(self, dest + i, value)?;
                }
            }
            Instruction::MultiplyAdd { dest, a, b, c } => {
                for i in 0..vlen {
                    let value = self.s(a + i)?.wrapping_mul(self.s(b + i)?).wrapping_add(self.s(c + i)?);
                    to_scratch(self, dest + i, value)?;
                }
            }
            Instruction::Load { dest, addr } => {
                let value = self.m(self.s(addr)? as usize)?;
                to_scratch(self, dest, value)?;
            }
            Instruction::LoadOffset { dest, addr, offset } => {
                let value = self.m(self.s(addr + offset)? as usize)?;
                to_scratch(self, dest + offset, value)?;
            }
            Instruction::VLoad { dest, addr } => {
                let base = self.s(addr)? as usize;
                for i in 0..vlen {
                    let value = self.m(base + i as usize)?;
                    to_scratch(self, dest + i, value)?;
                }
            }
            Instruction::Const { dest, value } => to_scratch(self, dest, value)?,
            Instruction::Store { addr, src } => {
                let target = self.memory_target(self.s(addr)? as usize)?;
                let value = self.s(src)?;
                out.push((engine, PendingWrite { target: Target::Memory, addr: target, value }));
            }
            Instruction::VStore { addr, src } => {
                let base = self.s(addr)? as usize;
                for i in 0..vlen {
                    let target = self.memory_target(base + i as usize)?;
                    let value = self.s(src + i)?;
                    out.push((engine, PendingWrite { target: Target::Memory, addr: target, value }));
                }
            }
            Instruction::Select { dest, cond, a, b } => {
                let value = if self.s(cond)? != 0 { self.s(a)? } else { self.s(b)? };
                to_scratch(self, dest, value)?;
            }
            Instruction::VSelect { dest, cond, a, b } => {
                for i in 0..vlen {
                    let value = if self.s(cond + i)? != 0 { self.s(a + i)? } else { self.s(b + i)? };
                    to_scratch(self, dest + i, value)?;
                }
            }
            Instruction::AddImm { dest, a, imm } => {
                let value = self.s(a)?.wrapping_add(imm);
                to_scratch(self, dest, value)?;
            }
            Instruction::Halt => self.halted = true,
            Instruction::Compare { loc, key } => self.compare(loc, &key)?,
            Instruction::VCompare { loc, ref keys } => {
                for (i, key) in keys.iter().enumerate() {
                    self.compare(loc + i as Addr, key)?;
                }
            }
        }
        Ok(())
    }

    fn compare(&mut self, loc: Addr, key: &TraceKey) -> ExecResult<()> {
        let Some(trace) = self.trace else {
            return Ok(());
        };
        let found = self.s(loc)?;
        let expected = trace
            .get(key)
            .ok_or(ExecError::MissingTrace { cycle: self.cycle, key: *key })?;
        self.stats.trace_checks += 1;
        if found != expected {
            return Err(CorrectnessMismatch::Trace {
                round: key.round,
                chunk: key.element as usize / self.config.vlen.max(1),
                element: key.element,
                stage: format!("{:?}", key.stage),
                expected,
                found,
            }
            .into());
        }
        Ok(())
    }
}
