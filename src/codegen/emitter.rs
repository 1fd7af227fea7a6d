//! Bundle emitter: packs operations into bundles under per-engine caps.

use crate::core::{Bundle, Engine, Instruction, MachineConfig};

/// Anything that accepts operations in program order.
///
/// The constant pool and the kernel builder push through this seam, so the
/// same code can feed a dependency graph, an emitter or a plain list.
pub trait OpSink {
    fn push_op(&mut self, op: Instruction);
}

impl OpSink for Vec<Instruction> {
    fn push_op(&mut self, op: Instruction) {
        self.push(op);
    }
}

/// Append-only bundle builder.
///
/// `emit` places an operation in the open bundle. When the operation's
/// engine is already at its width, the open bundle is closed first. Caps
/// are per engine, so a full engine never blocks another engine.
#[derive(Debug, Clone)]
pub struct BundleEmitter {
    widths: [usize; Engine::COUNT],
    current: Bundle,
    bundles: Vec<Bundle>,
}

impl BundleEmitter {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            widths: config.engines.widths(),
            current: Bundle::new(),
            bundles: Vec::new(),
        }
    }

    /// Whether the open bundle can take one more operation on `engine`.
    #[inline]
    pub fn has_room(&self, engine: Engine) -> bool {
        self.current.count(engine) < self.widths[engine.index()]
    }

    /// Place an operation, opening a new bundle if its engine is full.
    pub fn emit(&mut self, op: Instruction) {
        if !self.has_room(op.engine()) {
            self.close_cycle();
        }
        self.current.push(op);
    }

    /// Close the open bundle if it holds anything.
    pub fn flush(&mut self) {
        if !self.current.is_empty() {
            self.close_cycle();
        }
    }

    /// Close the open bundle unconditionally. An empty bundle is an idle cycle.
    pub fn close_cycle(&mut self) {
        let bundle = std::mem::take(&mut self.current);
        self.bundles.push(bundle);
    }

    /// Flush and hand over the bundle sequence.
    pub fn finish(mut self) -> Vec<Bundle> {
        self.flush();
        self.bundles
    }
}

impl OpSink for BundleEmitter {
    fn push_op(&mut self, op: Instruction) {
        self.emit(op);
    }
}
