//! Bundles and programs.
//!
//! A program is a straight-line sequence of bundles. Bundle `i` issues at
//! cycle `i`, so the cycle count of a program is its bundle count.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::{Engine, MachineConfig};
use super::isa::{Addr, Instruction};

/// One cycle's operations, grouped by engine in `Engine::ALL` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    slots: [Vec<Instruction>; Engine::COUNT],
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to its engine's slot list.
    pub fn push(&mut self, op: Instruction) {
        self.slots[op.engine().index()].push(op);
    }

    /// Operations on one engine, in slot order.
    #[inline]
    pub fn slot(&self, engine: Engine) -> &[Instruction] {
        &self.slots[engine.index()]
    }

    /// Number of operations on one engine.
    #[inline]
    pub fn count(&self, engine: Engine) -> usize {
        self.slots[engine.index()].len()
    }

    /// Total operations across all engines.
    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// All operations, engine by engine.
    pub fn ops(&self) -> impl Iterator<Item = &Instruction> {
        self.slots.iter().flatten()
    }
}

/// Names attached to scratch ranges for debugging dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Start address to (name, width).
    pub scratch_map: BTreeMap<Addr, (String, usize)>,
}

impl DebugInfo {
    /// Name of the range containing `addr`, with the lane offset inside it.
    pub fn describe(&self, addr: Addr) -> Option<(&str, usize)> {
        let (&start, (name, width)) = self.scratch_map.range(..=addr).next_back()?;
        let offset = (addr - start) as usize;
        (offset < *width).then_some((name.as_str(), offset))
    }

    /// One past the highest named scratch word.
    pub fn extent(&self) -> usize {
        self.scratch_map
            .iter()
            .map(|(&start, (_, width))| start as usize + width)
            .max()
            .unwrap_or(0)
    }
}

/// A complete generated program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub bundles: Vec<Bundle>,
    pub debug: DebugInfo,
}

impl Program {
    pub fn new(bundles: Vec<Bundle>, debug: DebugInfo) -> Self {
        Self { bundles, debug }
    }

    /// Cycles needed to issue every bundle.
    #[inline]
    pub fn cycle_count(&self) -> usize {
        self.bundles.len()
    }

    /// Total operations in the program.
    pub fn op_count(&self) -> usize {
        self.bundles.iter().map(Bundle::len).sum()
    }

    /// All operations in issue order, tagged with their cycle.
    pub fn ops(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.bundles
            .iter()
            .enumerate()
            .flat_map(|(cycle, bundle)| bundle.ops().map(move |op| (cycle, op)))
    }

    /// Compact JSON rendering, stable for identical programs.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Slot usage summary against a machine description.
    pub fn stats(&self, config: &MachineConfig) -> ProgramStats {
        let mut ops = [0usize; Engine::COUNT];
        let mut idle = 0;
        for bundle in &self.bundles {
            if bundle.is_empty() {
                idle += 1;
            }
            for engine in Engine::ALL {
                ops[engine.index()] += bundle.count(engine);
            }
        }
        ProgramStats {
            cycles: self.cycle_count(),
            idle_cycles: idle,
            ops,
            widths: config.engines.widths(),
        }
    }
}

/// Per-engine slot usage of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// Bundles in the program.
    pub cycles: usize,
    /// Bundles with no operation at all.
    pub idle_cycles: usize,
    /// Operations per engine, indexed by `Engine::index`.
    pub ops: [usize; Engine::COUNT],
    /// Issue widths the program was measured against.
    pub widths: [usize; Engine::COUNT],
}

impl ProgramStats {
    /// Operations on one engine.
    pub fn ops_on(&self, engine: Engine) -> usize {
        self.ops[engine.index()]
    }

    /// Fraction of one engine's slots that carry an operation.
    pub fn utilization(&self, engine: Engine) -> f64 {
        let slots = self.cycles * self.widths[engine.index()];
        if slots == 0 {
            0.0
        } else {
            self.ops[engine.index()] as f64 / slots as f64
        }
    }

    /// Lower bound on cycles implied by slot counts alone.
    pub fn resource_bound(&self) -> usize {
        Engine::ALL
            .iter()
            .filter(|&&e| e != Engine::Debug)
            .map(|&e| self.ops[e.index()].div_ceil(self.widths[e.index()].max(1)))
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for ProgramStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                 SCHEDULE STATISTICS                   ")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "Cycles:                {:>6}", self.cycles)?;
        writeln!(f, "Idle cycles:           {:>6}", self.idle_cycles)?;
        writeln!(f, "Resource bound:        {:>6}", self.resource_bound())?;
        writeln!(f, "───────────────────────────────────────────────────────")?;
        for engine in Engine::ALL {
            writeln!(
                f,
                "{:<6} ops: {:>7}   width {:>2}   utilization {:>5.1}%",
                engine.name(),
                self.ops_on(engine),
                self.widths[engine.index()],
                self.utilization(engine) * 100.0
            )?;
        }
        writeln!(f, "═══════════════════════════════════════════════════════")
    }
}
