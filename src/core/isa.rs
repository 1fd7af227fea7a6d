//! Instruction set of the target processor.
//!
//! Every operand is a scratch address. Vector operands name the first of
//! `vlen` consecutive words. Memory is addressed indirectly: load and store
//! instructions take the scratch word that holds the memory address.
//!
//! All arithmetic is on 32-bit words and wraps modulo 2^32.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::Engine;

/// Scratch or memory address.
pub type Addr = u32;

/// Machine word.
pub type Word = u32;

/// Binary integer operations shared by the scalar and vector units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Xor,
    And,
    Or,
    Shl,
    Shr,
    Lt,
    Eq,
}

impl AluOp {
    /// Evaluate on two words. `None` on division or modulo by zero.
    #[inline]
    pub fn apply(self, a: Word, b: Word) -> Option<Word> {
        Some(match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Div => a.checked_div(b)?,
            AluOp::Mod => a.checked_rem(b)?,
            AluOp::Xor => a ^ b,
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Shl => a.checked_shl(b).unwrap_or(0),
            AluOp::Shr => a.checked_shr(b).unwrap_or(0),
            AluOp::Lt => (a < b) as Word,
            AluOp::Eq => (a == b) as Word,
        })
    }

    /// Conventional operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            AluOp::Add => "+",
            AluOp::Sub => "-",
            AluOp::Mul => "*",
            AluOp::Div => "//",
            AluOp::Mod => "%",
            AluOp::Xor => "^",
            AluOp::And => "&",
            AluOp::Or => "|",
            AluOp::Shl => "<<",
            AluOp::Shr => ">>",
            AluOp::Lt => "<",
            AluOp::Eq => "==",
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Which intermediate of the walk a trace entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TraceStage {
    /// Index at the start of the round.
    Index,
    /// Accumulator at the start of the round.
    Value,
    /// Tree value gathered at the current index.
    NodeValue,
    /// Accumulator after mixing stage `n`.
    HashStage(u8),
    /// Accumulator after all mixing stages.
    HashedValue,
    /// Child index before the range check.
    NextIndex,
    /// Index after the range check.
    WrappedIndex,
}

/// Identifies one traced intermediate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraceKey {
    pub round: u32,
    pub element: u32,
    pub stage: TraceStage,
}

impl TraceKey {
    pub fn new(round: u32, element: u32, stage: TraceStage) -> Self {
        Self { round, element, stage }
    }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {} element {} {:?}", self.round, self.element, self.stage)
    }
}

/// One machine operation.
///
/// Semantics (`s` is scratch, `m` is memory, vector forms act on `vlen` lanes):
///
/// | Instruction | Effect |
/// |---|---|
/// | `Alu` | `s[dest] = op(s[a], s[b])` |
/// | `Valu` | `s[dest+i] = op(s[a+i], s[b+i])` |
/// | `VBroadcast` | `s[dest+i] = s[src]` |
/// | `MultiplyAdd` | `s[dest+i] = s[a+i] * s[b+i] + s[c+i]` |
/// | `Load` | `s[dest] = m[s[addr]]` |
/// | `LoadOffset` | `s[dest+offset] = m[s[addr+offset]]` |
/// | `VLoad` | `s[dest+i] = m[s[addr]+i]` |
/// | `Const` | `s[dest] = value` |
/// | `Store` | `m[s[addr]] = s[src]` |
/// | `VStore` | `m[s[addr]+i] = s[src+i]` |
/// | `Select` | `s[dest] = s[cond] != 0 ? s[a] : s[b]` |
/// | `VSelect` | lane-wise `Select` |
/// | `AddImm` | `s[dest] = s[a] + imm` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "opcode", rename_all = "snake_case")]
pub enum Instruction {
    Alu { op: AluOp, dest: Addr, a: Addr, b: Addr },
    Valu { op: AluOp, dest: Addr, a: Addr, b: Addr },
    VBroadcast { dest: Addr, src: Addr },
    MultiplyAdd { dest: Addr, a: Addr, b: Addr, c: Addr },
    Load { dest: Addr, addr: Addr },
    LoadOffset { dest: Addr, addr: Addr, offset: u32 },
    VLoad { dest: Addr, addr: Addr },
    Const { dest: Addr, value: Word },
    Store { addr: Addr, src: Addr },
    VStore { addr: Addr, src: Addr },
    Select { dest: Addr, cond: Addr, a: Addr, b: Addr },
    VSelect { dest: Addr, cond: Addr, a: Addr, b: Addr },
    AddImm { dest: Addr, a: Addr, imm: Word },
    Halt,
    /// Check `s[loc]` against the reference trace.
    Compare { loc: Addr, key: TraceKey },
    /// Check `s[loc+i]` against `keys[i]`, one key per live lane.
    VCompare { loc: Addr, keys: Vec<TraceKey> },
}

fn span(base: Addr, len: usize) -> impl Iterator<Item = Addr> {
    (0..len as Addr).map(move |i| base + i)
}

impl Instruction {
    /// Engine that executes this instruction.
    pub fn engine(&self) -> Engine {
        match self {
            Instruction::Alu { .. } => Engine::Alu,
            Instruction::Valu { .. }
            | Instruction::VBroadcast { .. }
            | Instruction::MultiplyAdd { .. } => Engine::Valu,
            Instruction::Load { .. }
            | Instruction::LoadOffset { .. }
            | Instruction::VLoad { .. }
            | Instruction::Const { .. } => Engine::Load,
            Instruction::Store { .. } | Instruction::VStore { .. } => Engine::Store,
            Instruction::Select { .. }
            | Instruction::VSelect { .. }
            | Instruction::AddImm { .. }
            | Instruction::Halt => Engine::Flow,
            Instruction::Compare { .. } | Instruction::VCompare { .. } => Engine::Debug,
        }
    }

    /// Scratch addresses read at issue.
    pub fn reads(&self, vlen: usize) -> Vec<Addr> {
        match *self {
            Instruction::Alu { a, b, .. } => vec![a, b],
            Instruction::Valu { a, b, .. } => span(a, vlen).chain(span(b, vlen)).collect(),
            Instruction::VBroadcast { src, .. } => vec![src],
            Instruction::MultiplyAdd { a, b, c, .. } => {
                span(a, vlen).chain(span(b, vlen)).chain(span(c, vlen)).collect()
            }
            Instruction::Load { addr, .. } => vec![addr],
            Instruction::LoadOffset { addr, offset, .. } => vec![addr + offset],
            Instruction::VLoad { addr, .. } => vec![addr],
            Instruction::Const { .. } | Instruction::Halt => Vec::new(),
            Instruction::Store { addr, src } => vec![addr, src],
            Instruction::VStore { addr, src } => std::iter::once(addr).chain(span(src, vlen)).collect(),
            Instruction::Select { cond, a, b, .. } => vec![cond, a, b],
            Instruction::VSelect { cond, a, b, .. } => {
                span(cond, vlen).chain(span(a, vlen)).chain(span(b, vlen)).collect()
            }
            Instruction::AddImm { a, .. } => vec![a],
            Instruction::Compare { loc, .. } => vec![loc],
            Instruction::VCompare { loc, ref keys } => span(loc, keys.len()).collect(),
        }
    }

    /// Scratch addresses written when the result commits.
    pub fn writes(&self, vlen: usize) -> Vec<Addr> {
        match *self {
            Instruction::Alu { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::Const { dest, .. }
            | Instruction::Select { dest, .. }
            | Instruction::AddImm { dest, .. } => vec![dest],
            Instruction::Valu { dest, .. }
            | Instruction::VBroadcast { dest, .. }
            | Instruction::MultiplyAdd { dest, .. }
            | Instruction::VLoad { dest, .. }
            | Instruction::VSelect { dest, .. } => span(dest, vlen).collect(),
            Instruction::LoadOffset { dest, offset, .. } => vec![dest + offset],
            Instruction::Store { .. }
            | Instruction::VStore { .. }
            | Instruction::Halt
            | Instruction::Compare { .. }
            | Instruction::VCompare { .. } => Vec::new(),
        }
    }

    /// True for instructions that write memory.
    pub fn writes_memory(&self) -> bool {
        matches!(self, Instruction::Store { .. } | Instruction::VStore { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alu { op, dest, a, b } => write!(f, "alu {} s{} s{} s{}", op, dest, a, b),
            Instruction::Valu { op, dest, a, b } => write!(f, "valu {} v{} v{} v{}", op, dest, a, b),
            Instruction::VBroadcast { dest, src } => write!(f, "vbroadcast v{} s{}", dest, src),
            Instruction::MultiplyAdd { dest, a, b, c } => {
                write!(f, "multiply_add v{} v{} v{} v{}", dest, a, b, c)
            }
            Instruction::Load { dest, addr } => write!(f, "load s{} [s{}]", dest, addr),
            Instruction::LoadOffset { dest, addr, offset } => {
                write!(f, "load_offset s{}+{} [s{}+{}]", dest, offset, addr, offset)
            }
            Instruction::VLoad { dest, addr } => write!(f, "vload v{} [s{}]", dest, addr),
            Instruction::Const { dest, value } => write!(f, "const s{} {:#x}", dest, value),
            Instruction::Store { addr, src } => write!(f, "store [s{}] s{}", addr, src),
            Instruction::VStore { addr, src } => write!(f, "vstore [s{}] v{}", addr, src),
            Instruction::Select { dest, cond, a, b } => {
                write!(f, "select s{} s{} s{} s{}", dest, cond, a, b)
            }
            Instruction::VSelect { dest, cond, a, b } => {
                write!(f, "vselect v{} v{} v{} v{}", dest, cond, a, b)
            }
            Instruction::AddImm { dest, a, imm } => write!(f, "add_imm s{} s{} {}", dest, a, imm),
            Instruction::Halt => write!(f, "halt"),
            Instruction::Compare { loc, key } => write!(f, "compare s{} ({})", loc, key),
            Instruction::VCompare { loc, keys } => write!(f, "vcompare v{} x{}", loc, keys.len()),
        }
    }
}
