//! Lowering of the walk into a dependency graph and then a program.
//!
//! Every chunk owns persistent index and value vectors for the whole build.
//! Temporaries come from `parallelism` shared sets, chunk `c` borrowing set
//! `c % parallelism`. Operations are pushed round by round, chunk by chunk;
//! the list scheduler then interleaves independent chunks to hide latency.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::core::{
    Addr, AluOp, BatchField, BuildError, BuildResult, Instruction, MachineConfig, Program, TraceKey,
    TraceStage, Word,
};
use crate::workload::model::header;
use crate::workload::{StageLowering, HASH_STAGES};

use super::graph::{MemAccess, MemRegion, OpGraph};
use super::params::{validate, BuildOptions, KernelParams};
use super::plan::{plan_rounds, reads_initial_indices, GatherMode, IndexUpdate, RoundPlan};
use super::schedule::{schedule, ScheduleStats};
use super::scratch::{ConstantPool, ScratchAllocator};

/// Registers and addresses owned by one chunk.
#[derive(Debug, Clone)]
struct Chunk {
    index: usize,
    /// First batch element covered.
    base: usize,
    /// Live lanes, `vlen` except possibly for the last chunk.
    lanes: usize,
    idx: Addr,
    val: Addr,
    /// Scalar holding the memory address of this chunk's indices.
    idx_addr: Addr,
    /// Scalar holding the memory address of this chunk's values.
    val_addr: Addr,
    /// Per-lane memory addresses for partial chunks: (indices, values).
    lane_addrs: Option<(Addr, Addr)>,
}

impl Chunk {
    fn region(&self, field: BatchField) -> MemRegion {
        MemRegion::Batch { field, chunk: self.index }
    }
}

/// Temporaries shared by the chunks that map to one set.
#[derive(Debug, Clone, Copy)]
struct TempSet {
    node: Addr,
    aux: Addr,
}

/// Broadcast vectors shared by every chunk, created on demand.
#[derive(Debug, Clone, Default)]
struct SharedRegs {
    forest: Option<Addr>,
    root: Option<Addr>,
    /// `tree[2]` and `tree[1] - tree[2]` for the level-1 select.
    pair: Option<(Addr, Addr)>,
    n_nodes: Option<Addr>,
}

/// Single-use builder that owns all state of one build.
pub struct KernelBuilder<'a> {
    config: &'a MachineConfig,
    params: KernelParams,
    options: BuildOptions,
    parallelism: usize,
    vlen: usize,
    alloc: ScratchAllocator,
    pool: ConstantPool,
    graph: OpGraph,
    header: HashMap<u32, Addr>,
    shared: SharedRegs,
    chunks: Vec<Chunk>,
    temps: Vec<TempSet>,
}

impl<'a> KernelBuilder<'a> {
    pub fn new(
        config: &'a MachineConfig,
        params: KernelParams,
        options: BuildOptions,
        parallelism: usize,
    ) -> BuildResult<Self> {
        validate(&params, config)?;
        Ok(Self {
            config,
            params,
            options,
            parallelism: parallelism.max(1),
            vlen: config.vlen,
            alloc: ScratchAllocator::new(config.scratch_size),
            pool: ConstantPool::new(),
            graph: OpGraph::new(config),
            header: HashMap::new(),
            shared: SharedRegs::default(),
            chunks: Vec::new(),
            temps: Vec::new(),
        })
    }

    /// Generate and schedule the program.
    pub fn build(self) -> BuildResult<Program> {
        self.build_with_stats().map(|(program, _)| program)
    }

    /// Generate and schedule the program, keeping scheduler counters.
    pub fn build_with_stats(mut self) -> BuildResult<(Program, ScheduleStats)> {
        let plans = plan_rounds(
            self.params.rounds,
            self.params.n_nodes,
            self.options.start_at_root,
            self.options.shortcuts,
        )?;
        let n_chunks = self.params.chunk_count(self.vlen);
        if n_chunks > 0 {
            self.lower(&plans, n_chunks)?;
        }
        debug!(
            ops = self.graph.len(),
            scratch = self.alloc.used(),
            parallelism = self.parallelism,
            "lowered kernel"
        );

        let (bundles, stats) = schedule(&mut self.graph, self.config);
        Ok((Program::new(bundles, self.alloc.into_debug_info()), stats))
    }

    fn lower(&mut self, plans: &[RoundPlan], n_chunks: usize) -> BuildResult<()> {
        self.allocate_chunks(n_chunks)?;
        let sets = self.parallelism.min(n_chunks);
        for set in 0..sets {
            let node = self.alloc.vector(&format!("node_{}", set), self.vlen)?;
            let aux = self.alloc.vector(&format!("aux_{}", set), self.vlen)?;
            self.temps.push(TempSet { node, aux });
        }

        self.compute_chunk_addresses()?;
        self.prepare_shared(plans)?;

        let load_indices = reads_initial_indices(plans);
        for c in 0..self.chunks.len() {
            if load_indices {
                self.load_vector(c, BatchField::Indices);
            }
            self.load_vector(c, BatchField::Values);
        }

        let last = plans.len().checked_sub(1);
        for plan in plans {
            trace!(round = plan.round, gather = ?plan.gather, update = ?plan.update, "round plan");
            for c in 0..self.chunks.len() {
                self.lower_round(plan, Some(plan.round) == last, c)?;
            }
        }

        for c in 0..self.chunks.len() {
            self.store_vector(c, BatchField::Indices);
            self.store_vector(c, BatchField::Values);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registers and addresses
    // ═══════════════════════════════════════════════════════════════════

    fn allocate_chunks(&mut self, n_chunks: usize) -> BuildResult<()> {
        for c in 0..n_chunks {
            let base = c * self.vlen;
            let lanes = (self.params.batch_size - base).min(self.vlen);
            let idx = self.alloc.vector(&format!("idx_{}", c), self.vlen)?;
            let val = self.alloc.vector(&format!("val_{}", c), self.vlen)?;
            self.chunks.push(Chunk {
                index: c,
                base,
                lanes,
                idx,
                val,
                idx_addr: 0,
                val_addr: 0,
                lane_addrs: None,
            });
        }
        Ok(())
    }

    /// Chain the chunk base addresses off the header pointers with the scalar unit.
    fn compute_chunk_addresses(&mut self) -> BuildResult<()> {
        let mut idx_addr = self.header_field(header::INP_INDICES_P, "inp_indices_p")?;
        let mut val_addr = self.header_field(header::INP_VALUES_P, "inp_values_p")?;
        let step = self.konst(self.vlen as Word)?;

        for c in 0..self.chunks.len() {
            if c > 0 {
                let next_idx = self.alloc.scalar(&format!("idx_addr_{}", c))?;
                let next_val = self.alloc.scalar(&format!("val_addr_{}", c))?;
                self.emit(Instruction::Alu { op: AluOp::Add, dest: next_idx, a: idx_addr, b: step });
                self.emit(Instruction::Alu { op: AluOp::Add, dest: next_val, a: val_addr, b: step });
                idx_addr = next_idx;
                val_addr = next_val;
            }
            self.chunks[c].idx_addr = idx_addr;
            self.chunks[c].val_addr = val_addr;

            let lanes = self.chunks[c].lanes;
            if lanes < self.vlen {
                let idx_lanes = self.alloc.alloc(Some(&format!("idx_lanes_{}", c)), lanes)?;
                let val_lanes = self.alloc.alloc(Some(&format!("val_lanes_{}", c)), lanes)?;
                for l in 0..lanes {
                    let offset = self.konst(l as Word)?;
                    let l = l as Addr;
                    self.emit(Instruction::Alu { op: AluOp::Add, dest: idx_lanes + l, a: idx_addr, b: offset });
                    self.emit(Instruction::Alu { op: AluOp::Add, dest: val_lanes + l, a: val_addr, b: offset });
                }
                self.chunks[c].lane_addrs = Some((idx_lanes, val_lanes));
            }
        }
        Ok(())
    }

    /// Shared vectors and constants the plans will need.
    fn prepare_shared(&mut self, plans: &[RoundPlan]) -> BuildResult<()> {
        let any_gather = |mode| plans.iter().any(|p| p.gather == mode);
        let needs_forest = !plans.is_empty();

        if needs_forest {
            let forest_p = self.header_field(header::FOREST_VALUES_P, "forest_values_p")?;
            if any_gather(GatherMode::Gather) {
                let forest = self.alloc.vector("forest_values_p_vec", self.vlen)?;
                self.emit(Instruction::VBroadcast { dest: forest, src: forest_p });
                self.shared.forest = Some(forest);
            }
            if any_gather(GatherMode::Broadcast) {
                let root = self.tree_word(forest_p, 0)?;
                let vec = self.alloc.vector("tree_0_vec", self.vlen)?;
                self.emit(Instruction::VBroadcast { dest: vec, src: root });
                self.shared.root = Some(vec);
            }
            if any_gather(GatherMode::SelectPair) {
                let left = self.tree_word(forest_p, 1)?;
                let right = self.tree_word(forest_p, 2)?;
                let diff = self.alloc.scalar("tree_1_minus_2")?;
                self.emit(Instruction::Alu { op: AluOp::Sub, dest: diff, a: left, b: right });
                let right_vec = self.alloc.vector("tree_2_vec", self.vlen)?;
                let diff_vec = self.alloc.vector("tree_diff_vec", self.vlen)?;
                self.emit(Instruction::VBroadcast { dest: right_vec, src: right });
                self.emit(Instruction::VBroadcast { dest: diff_vec, src: diff });
                self.shared.pair = Some((right_vec, diff_vec));
            }
        }
        if plans.iter().any(RoundPlan::needs_node_count) {
            let n = self.header_field(header::N_NODES, "n_nodes")?;
            let vec = self.alloc.vector("n_nodes_vec", self.vlen)?;
            self.emit(Instruction::VBroadcast { dest: vec, src: n });
            self.shared.n_nodes = Some(vec);
        }

        if !plans.is_empty() {
            self.vconst(1)?;
            self.vconst(2)?;
            for stage in HASH_STAGES.iter() {
                match stage.lowering() {
                    StageLowering::MultiplyAdd { multiplier, addend } => {
                        self.vconst(multiplier)?;
                        self.vconst(addend)?;
                    }
                    StageLowering::ThreeOp => {
                        self.vconst(stage.const_a)?;
                        self.vconst(stage.const_b)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Scalar load of `tree[offset]`.
    fn tree_word(&mut self, forest_p: Addr, offset: Word) -> BuildResult<Addr> {
        let addr = if offset == 0 {
            forest_p
        } else {
            let k = self.konst(offset)?;
            let addr = self.alloc.scalar(&format!("tree_{}_addr", offset))?;
            self.emit(Instruction::Alu { op: AluOp::Add, dest: addr, a: forest_p, b: k });
            addr
        };
        let dest = self.alloc.scalar(&format!("tree_{}", offset))?;
        self.emit_mem(Instruction::Load { dest, addr }, MemAccess::Read(MemRegion::Tree));
        Ok(dest)
    }

    /// Scalar holding one header word, loaded once.
    fn header_field(&mut self, slot: u32, name: &str) -> BuildResult<Addr> {
        if let Some(&addr) = self.header.get(&slot) {
            return Ok(addr);
        }
        let at = self.konst(slot)?;
        let dest = self.alloc.scalar(name)?;
        self.emit_mem(Instruction::Load { dest, addr: at }, MemAccess::Read(MemRegion::Header));
        self.header.insert(slot, dest);
        Ok(dest)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Batch transfer
    // ═══════════════════════════════════════════════════════════════════

    fn batch_regs(&self, c: usize, field: BatchField) -> (Addr, Addr, Option<Addr>) {
        let chunk = &self.chunks[c];
        match field {
            BatchField::Indices => (chunk.idx, chunk.idx_addr, chunk.lane_addrs.map(|(i, _)| i)),
            BatchField::Values => (chunk.val, chunk.val_addr, chunk.lane_addrs.map(|(_, v)| v)),
        }
    }

    fn load_vector(&mut self, c: usize, field: BatchField) {
        let (reg, addr, lanes_addr) = self.batch_regs(c, field);
        let access = MemAccess::Read(self.chunks[c].region(field));
        match lanes_addr {
            None => self.emit_mem(Instruction::VLoad { dest: reg, addr }, access),
            Some(lanes_addr) => {
                for l in 0..self.chunks[c].lanes as u32 {
                    self.emit_mem(Instruction::LoadOffset { dest: reg, addr: lanes_addr, offset: l }, access);
                }
            }
        }
    }

    fn store_vector(&mut self, c: usize, field: BatchField) {
        let (reg, addr, lanes_addr) = self.batch_regs(c, field);
        let access = MemAccess::Write(self.chunks[c].region(field));
        match lanes_addr {
            None => self.emit_mem(Instruction::VStore { addr, src: reg }, access),
            Some(lanes_addr) => {
                for l in 0..self.chunks[c].lanes as u32 {
                    self.emit_mem(Instruction::Store { addr: lanes_addr + l, src: reg + l }, access);
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Round body
    // ═══════════════════════════════════════════════════════════════════

    fn lower_round(&mut self, plan: &RoundPlan, last: bool, c: usize) -> BuildResult<()> {
        let TempSet { node, aux } = self.temps[c % self.temps.len()];
        let (idx, val, lanes) = {
            let chunk = &self.chunks[c];
            (chunk.idx, chunk.val, chunk.lanes)
        };
        let one = self.vconst(1)?;

        let node_src = match plan.gather {
            GatherMode::Broadcast => self.shared_reg(self.shared.root, "tree_0_vec")?,
            GatherMode::SelectPair => {
                let (right, diff) = self.shared_pair()?;
                self.emit(Instruction::Valu { op: AluOp::And, dest: node, a: idx, b: one });
                self.select_by_mask(node, node, diff, right);
                node
            }
            GatherMode::Gather => {
                let forest = self.shared_reg(self.shared.forest, "forest_values_p_vec")?;
                self.emit(Instruction::Valu { op: AluOp::Add, dest: node, a: idx, b: forest });
                for l in 0..lanes as u32 {
                    self.emit_mem(
                        Instruction::LoadOffset { dest: node, addr: node, offset: l },
                        MemAccess::Read(MemRegion::Tree),
                    );
                }
                node
            }
        };
        self.check(plan.round, c, node_src, TraceStage::NodeValue);

        self.emit(Instruction::Valu { op: AluOp::Xor, dest: val, a: val, b: node_src });
        for (i, stage) in HASH_STAGES.iter().enumerate() {
            match stage.lowering() {
                StageLowering::MultiplyAdd { multiplier, addend } => {
                    let m = self.vconst(multiplier)?;
                    let k = self.vconst(addend)?;
                    self.emit(Instruction::MultiplyAdd { dest: val, a: val, b: m, c: k });
                }
                StageLowering::ThreeOp => {
                    let ka = self.vconst(stage.const_a)?;
                    let kb = self.vconst(stage.const_b)?;
                    self.emit(Instruction::Valu { op: stage.op_a, dest: node, a: val, b: ka });
                    self.emit(Instruction::Valu { op: stage.op_b, dest: aux, a: val, b: kb });
                    self.emit(Instruction::Valu { op: stage.combine, dest: val, a: node, b: aux });
                }
            }
            self.check(plan.round, c, val, TraceStage::HashStage(i as u8));
        }

        let two = self.vconst(2)?;
        match plan.update {
            IndexUpdate::FromRoot => {
                self.emit(Instruction::Valu { op: AluOp::And, dest: aux, a: val, b: one });
                self.emit(Instruction::Valu { op: AluOp::Add, dest: idx, a: aux, b: one });
            }
            IndexUpdate::Descend | IndexUpdate::DescendClamped => {
                self.emit(Instruction::Valu { op: AluOp::And, dest: aux, a: val, b: one });
                self.emit(Instruction::MultiplyAdd { dest: idx, a: idx, b: two, c: one });
                self.emit(Instruction::Valu { op: AluOp::Add, dest: idx, a: idx, b: aux });
                if plan.update == IndexUpdate::DescendClamped {
                    let n_vec = self.shared_reg(self.shared.n_nodes, "n_nodes_vec")?;
                    self.clamp_to_root(idx, node, n_vec);
                }
            }
            IndexUpdate::ResetToRoot => {
                // The next round starts at the root without reading the
                // index, so only the final value has to exist.
                if !last {
                    return Ok(());
                }
                self.emit(Instruction::Valu { op: AluOp::Xor, dest: idx, a: idx, b: idx });
            }
        }
        self.check(plan.round, c, idx, TraceStage::WrappedIndex);
        Ok(())
    }

    /// `dest = base + mask * diff`, with `mask` in {0, 1} per lane.
    pub(crate) fn select_by_mask(&mut self, dest: Addr, mask: Addr, diff: Addr, base: Addr) {
        self.emit(Instruction::MultiplyAdd { dest, a: mask, b: diff, c: base });
    }

    /// `idx = idx * (idx < n_nodes)`, using `scratch` for the mask.
    pub(crate) fn clamp_to_root(&mut self, idx: Addr, scratch: Addr, n_vec: Addr) {
        self.emit(Instruction::Valu { op: AluOp::Lt, dest: scratch, a: idx, b: n_vec });
        self.emit(Instruction::Valu { op: AluOp::Mul, dest: idx, a: idx, b: scratch });
    }

    /// Trace comparison of the live lanes of `loc`.
    fn check(&mut self, round: usize, c: usize, loc: Addr, stage: TraceStage) {
        if !self.options.trace_checks {
            return;
        }
        let chunk = &self.chunks[c];
        let keys: Vec<TraceKey> = (0..chunk.lanes)
            .map(|l| TraceKey::new(round as u32, (chunk.base + l) as u32, stage))
            .collect();
        self.emit(Instruction::VCompare { loc, keys });
    }

    fn shared_reg(&self, reg: Option<Addr>, name: &str) -> BuildResult<Addr> {
        reg.ok_or_else(|| BuildError::InvalidParams(format!("{} was never prepared", name)))
    }

    fn shared_pair(&self) -> BuildResult<(Addr, Addr)> {
        self.shared
            .pair
            .ok_or_else(|| BuildError::InvalidParams("tree pair was never prepared".into()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Emission helpers
    // ═══════════════════════════════════════════════════════════════════

    #[inline]
    fn emit(&mut self, op: Instruction) {
        self.graph.push(op);
    }

    #[inline]
    fn emit_mem(&mut self, op: Instruction, access: MemAccess) {
        self.graph.push_mem(op, Some(access));
    }

    fn konst(&mut self, value: Word) -> BuildResult<Addr> {
        self.pool.scalar(&mut self.alloc, &mut self.graph, value)
    }

    fn vconst(&mut self, value: Word) -> BuildResult<Addr> {
        self.pool.vector(&mut self.alloc, &mut self.graph, value, self.vlen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Engine;

    fn build(params: KernelParams, options: BuildOptions, parallelism: usize) -> Program {
        let config = MachineConfig::default();
        KernelBuilder::new(&config, params, options, parallelism)
            .unwrap()
            .build()
            .unwrap()
    }

    fn count(program: &Program, pred: impl Fn(&Instruction) -> bool) -> usize {
        program.ops().filter(|(_, op)| pred(op)).count()
    }

    #[test]
    fn empty_batch_gives_empty_program() {
        let program = build(KernelParams::new(4, 0, 3), BuildOptions::default(), 4);
        assert_eq!(program.cycle_count(), 0);
    }

    #[test]
    fn zero_rounds_copies_batch() {
        let program = build(KernelParams::new(4, 16, 0), BuildOptions::default(), 2);
        assert_eq!(count(&program, |op| matches!(op, Instruction::VLoad { .. })), 4);
        assert_eq!(count(&program, |op| matches!(op, Instruction::VStore { .. })), 4);
        assert_eq!(count(&program, |op| op.engine() == Engine::Valu), 0);
    }

    #[test]
    fn root_start_skips_index_loads() {
        let program = build(KernelParams::new(4, 16, 2), BuildOptions::default(), 2);
        // Only the two value vectors are loaded.
        assert_eq!(count(&program, |op| matches!(op, Instruction::VLoad { .. })), 2);
    }

    #[test]
    fn general_mode_gathers_every_round() {
        let program = build(KernelParams::new(4, 8, 3), BuildOptions::general(), 1);
        assert_eq!(count(&program, |op| matches!(op, Instruction::LoadOffset { .. })), 3 * 8);
        assert_eq!(count(&program, |op| matches!(op, Instruction::VLoad { .. })), 2);
    }

    #[test]
    fn constants_are_interned_once() {
        let program = build(KernelParams::new(5, 32, 4), BuildOptions::default(), 4);
        let mut seen = std::collections::HashSet::new();
        for (_, op) in program.ops() {
            if let Instruction::Const { value, .. } = op {
                assert!(seen.insert(*value), "constant {:#x} materialized twice", value);
            }
        }
    }

    #[test]
    fn partial_chunk_uses_lane_transfers() {
        let program = build(KernelParams::new(3, 11, 1), BuildOptions::general(), 2);
        // Three live lanes in the tail chunk: one load per field per lane.
        assert_eq!(count(&program, |op| matches!(op, Instruction::Store { .. })), 6);
        assert_eq!(count(&program, |op| matches!(op, Instruction::VStore { .. })), 2);
    }

    #[test]
    fn trace_checks_emit_vcompares() {
        let options = BuildOptions { trace_checks: true, ..BuildOptions::default() };
        let program = build(KernelParams::new(3, 8, 1), options, 1);
        // Node value, six stages and the wrapped index.
        assert_eq!(count(&program, |op| matches!(op, Instruction::VCompare { .. })), 8);
    }

    #[test]
    fn tiny_scratch_reports_exhaustion() {
        let config = MachineConfig { scratch_size: 40, ..MachineConfig::default() };
        let err = KernelBuilder::new(&config, KernelParams::new(3, 64, 2), BuildOptions::default(), 8)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::ScratchExhausted { .. }));
    }
}
