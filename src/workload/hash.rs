//! The fixed six-stage integer mixing function.
//!
//! Each stage computes `combine(op_a(a, const_a), op_b(a, const_b))` on
//! 32-bit words. Stages of the shape `(+, c, +, <<, k)` collapse to the
//! affine form `a * (1 + 2^k) + c`, which the vector unit evaluates with a
//! single `multiply_add`.

use crate::core::{AluOp, Word};

/// One mixing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashStage {
    pub op_a: AluOp,
    pub const_a: Word,
    pub combine: AluOp,
    pub op_b: AluOp,
    pub const_b: Word,
}

/// How a stage is lowered to vector operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLowering {
    /// `a = a * multiplier + addend` as one `multiply_add`.
    MultiplyAdd { multiplier: Word, addend: Word },
    /// `t = op_a(a, const_a); u = op_b(a, const_b); a = combine(t, u)`.
    ThreeOp,
}

impl HashStage {
    const fn new(op_a: AluOp, const_a: Word, combine: AluOp, op_b: AluOp, const_b: Word) -> Self {
        Self { op_a, const_a, combine, op_b, const_b }
    }

    /// Apply the stage to one word.
    #[inline]
    pub fn apply(&self, a: Word) -> Word {
        // Stage operators are all total, so `apply` never yields `None` here.
        let t = self.op_a.apply(a, self.const_a).unwrap_or_default();
        let u = self.op_b.apply(a, self.const_b).unwrap_or_default();
        self.combine.apply(t, u).unwrap_or_default()
    }

    /// Cheapest lowering for this stage.
    pub fn lowering(&self) -> StageLowering {
        let affine = self.op_a == AluOp::Add
            && self.combine == AluOp::Add
            && self.op_b == AluOp::Shl
            && self.const_b < 32;
        if affine {
            StageLowering::MultiplyAdd {
                multiplier: 1u32.wrapping_add(1u32 << self.const_b),
                addend: self.const_a,
            }
        } else {
            StageLowering::ThreeOp
        }
    }
}

/// Number of mixing stages.
pub const HASH_STAGE_COUNT: usize = 6;

/// The mixing table, in application order.
pub const HASH_STAGES: [HashStage; HASH_STAGE_COUNT] = [
    HashStage::new(AluOp::Add, 0x7ED5_5D16, AluOp::Add, AluOp::Shl, 12),
    HashStage::new(AluOp::Xor, 0xC761_C23C, AluOp::Xor, AluOp::Shr, 19),
    HashStage::new(AluOp::Add, 0x1656_67B1, AluOp::Add, AluOp::Shl, 5),
    HashStage::new(AluOp::Add, 0xD3A2_646C, AluOp::Xor, AluOp::Shl, 9),
    HashStage::new(AluOp::Add, 0xFD70_46C5, AluOp::Add, AluOp::Shl, 3),
    HashStage::new(AluOp::Xor, 0xB55A_4F09, AluOp::Xor, AluOp::Shr, 16),
];

/// Run a word through every stage.
pub fn myhash(a: Word) -> Word {
    HASH_STAGES.iter().fold(a, |acc, stage| stage.apply(acc))
}

/// Run a word through every stage, keeping each intermediate.
pub fn myhash_traced(a: Word) -> [Word; HASH_STAGE_COUNT] {
    let mut out = [0; HASH_STAGE_COUNT];
    let mut acc = a;
    for (slot, stage) in out.iter_mut().zip(HASH_STAGES.iter()) {
        acc = stage.apply(acc);
        *slot = acc;
    }
    out
}
