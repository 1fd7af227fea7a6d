//! Dependency graph over a straight-line operation list.
//!
//! Operations are pushed in program order. Every edge `p -> n` carries the
//! minimum number of cycles between the issue of `p` and the issue of `n`:
//!
//! | Hazard | Distance |
//! |---|---|
//! | read after write | `latency(p)` |
//! | write after read | `0` |
//! | write after write | `max(0, latency(p) + 1 - latency(n))` |
//!
//! Operands are read at issue and results commit at the end of cycle
//! `issue + latency - 1`, which is where these distances come from.
//! Memory is tracked per region instead of per word, because memory
//! addresses are only known at run time.

use std::collections::{BTreeMap, HashMap};

use crate::core::{Addr, BatchField, Engine, Instruction, MachineConfig};

/// Index of an operation in its graph.
pub type OpId = usize;

/// Coarse memory region an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemRegion {
    Header,
    Tree,
    Batch { field: BatchField, chunk: usize },
}

/// Memory effect of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccess {
    Read(MemRegion),
    Write(MemRegion),
}

/// One operation and its edges.
#[derive(Debug, Clone)]
pub struct OpNode {
    pub op: Instruction,
    pub engine: Engine,
    /// Predecessors with their minimum issue distance.
    pub preds: Vec<(OpId, u32)>,
    /// Successors with their minimum issue distance.
    pub succs: Vec<(OpId, u32)>,
    /// Latency-weighted longest path from this operation to any sink.
    pub height: u64,
}

/// Hazard tracking for one location.
#[derive(Debug, Clone, Default)]
struct Hazards {
    writer: Option<OpId>,
    readers: Vec<OpId>,
}

/// Operation graph built in program order.
#[derive(Debug, Clone)]
pub struct OpGraph {
    nodes: Vec<OpNode>,
    latencies: [u32; Engine::COUNT],
    vlen: usize,
    scratch: HashMap<Addr, Hazards>,
    memory: HashMap<MemRegion, Hazards>,
    heights_valid: bool,
}

impl OpGraph {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            nodes: Vec::new(),
            latencies: config.engines.latencies(),
            vlen: config.vlen,
            scratch: HashMap::new(),
            memory: HashMap::new(),
            heights_valid: true,
        }
    }

    #[inline]
    fn latency(&self, engine: Engine) -> u32 {
        self.latencies[engine.index()]
    }

    /// Append an operation with no memory effect beyond what its kind implies.
    pub fn push(&mut self, op: Instruction) -> OpId {
        self.push_mem(op, None)
    }

    /// Append an operation, recording its memory region.
    pub fn push_mem(&mut self, op: Instruction, access: Option<MemAccess>) -> OpId {
        let id = self.nodes.len();
        let engine = op.engine();
        let lat = self.latency(engine);
        let reads = op.reads(self.vlen);
        let writes = op.writes(self.vlen);

        let mut deps: BTreeMap<OpId, u32> = BTreeMap::new();
        let add = |deps: &mut BTreeMap<OpId, u32>, from: OpId, dist: u32| {
            let entry = deps.entry(from).or_insert(0);
            *entry = (*entry).max(dist);
        };

        for addr in &reads {
            if let Some(w) = self.scratch.get(addr).and_then(|h| h.writer) {
                add(&mut deps, w, self.latency(self.nodes[w].engine));
            }
        }
        for addr in &writes {
            if let Some(h) = self.scratch.get(addr) {
                if let Some(w) = h.writer {
                    let prev = self.latency(self.nodes[w].engine);
                    add(&mut deps, w, (prev + 1).saturating_sub(lat));
                }
                for &r in &h.readers {
                    add(&mut deps, r, 0);
                }
            }
        }
        match access {
            Some(MemAccess::Read(region)) => {
                if let Some(w) = self.memory.get(&region).and_then(|h| h.writer) {
                    add(&mut deps, w, self.latency(self.nodes[w].engine));
                }
            }
            Some(MemAccess::Write(region)) => {
                if let Some(h) = self.memory.get(&region) {
                    if let Some(w) = h.writer {
                        let prev = self.latency(self.nodes[w].engine);
                        add(&mut deps, w, (prev + 1).saturating_sub(lat));
                    }
                    for &r in &h.readers {
                        add(&mut deps, r, 0);
                    }
                }
            }
            None => {}
        }

        for addr in reads {
            let h = self.scratch.entry(addr).or_default();
            if h.readers.last() != Some(&id) {
                h.readers.push(id);
            }
        }
        for addr in writes {
            let h = self.scratch.entry(addr).or_default();
            h.writer = Some(id);
            h.readers.clear();
        }
        match access {
            Some(MemAccess::Read(region)) => self.memory.entry(region).or_default().readers.push(id),
            Some(MemAccess::Write(region)) => {
                let h = self.memory.entry(region).or_default();
                h.writer = Some(id);
                h.readers.clear();
            }
            None => {}
        }

        let preds: Vec<(OpId, u32)> = deps.into_iter().collect();
        for &(p, dist) in &preds {
            self.nodes[p].succs.push((id, dist));
        }
        self.nodes.push(OpNode { op, engine, preds, succs: Vec::new(), height: 0 });
        self.heights_valid = false;
        id
    }

    /// Recompute critical-path heights. Edges only point forward, so one
    /// reverse sweep suffices.
    pub fn compute_heights(&mut self) {
        for id in (0..self.nodes.len()).rev() {
            let own = self.latency(self.nodes[id].engine) as u64;
            let height = self.nodes[id]
                .succs
                .iter()
                .map(|&(s, dist)| dist as u64 + self.nodes[s].height)
                .fold(own, u64::max);
            self.nodes[id].height = height;
        }
        self.heights_valid = true;
    }

    /// Longest latency-weighted path through the graph.
    pub fn critical_path(&mut self) -> u64 {
        if !self.heights_valid {
            self.compute_heights();
        }
        self.nodes
            .iter()
            .filter(|n| n.preds.is_empty())
            .map(|n| n.height)
            .max()
            .unwrap_or(0)
    }

    /// Heights are current.
    pub fn heights_valid(&self) -> bool {
        self.heights_valid
    }

    #[inline]
    pub fn node(&self, id: OpId) -> &OpNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[OpNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Issue latencies indexed by `Engine::index`.
    pub fn latencies(&self) -> [u32; Engine::COUNT] {
        self.latencies
    }
}

impl super::emitter::OpSink for OpGraph {
    fn push_op(&mut self, op: Instruction) {
        self.push(op);
    }
}
