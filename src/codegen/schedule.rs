//! Cycle-driven list scheduler.
//!
//! Each engine keeps its own ready heap ordered by critical-path height
//! (ties to the earlier operation). Every cycle the scheduler drains the
//! heaps into the open bundle while the emitter reports room, repeating
//! until no engine makes progress so that zero-distance successors can join
//! the same bundle. Then it closes the cycle, idle or not.
//!
//! Issue caps are enforced by the emitter and latency distances by the
//! earliest-cycle bookkeeping, so the result is legal by construction.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::debug;

use crate::core::{Bundle, Engine, MachineConfig};

use super::emitter::BundleEmitter;
use super::graph::{OpGraph, OpId};

/// Ready-queue entry: higher height first, then lower id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ready {
    height: u64,
    id: OpId,
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .cmp(&other.height)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Counters gathered while scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub ops: usize,
    pub cycles: usize,
    pub idle_cycles: usize,
    pub critical_path: u64,
}

/// Pack a dependency graph into bundles.
pub fn schedule(graph: &mut OpGraph, config: &MachineConfig) -> (Vec<Bundle>, ScheduleStats) {
    let critical_path = graph.critical_path();
    let total = graph.len();

    let mut remaining: Vec<usize> = graph.nodes().iter().map(|n| n.preds.len()).collect();
    let mut earliest: Vec<u64> = vec![0; total];
    let mut ready: [BinaryHeap<Ready>; Engine::COUNT] = Default::default();
    let mut waiting: BinaryHeap<Reverse<(u64, OpId)>> = BinaryHeap::new();

    for (id, node) in graph.nodes().iter().enumerate() {
        if node.preds.is_empty() {
            waiting.push(Reverse((0, id)));
        }
    }

    let mut emitter = BundleEmitter::new(config);
    let mut scheduled = 0usize;
    let mut idle_cycles = 0usize;
    let mut cycle: u64 = 0;

    while scheduled < total {
        while let Some(&Reverse((at, id))) = waiting.peek() {
            if at > cycle {
                break;
            }
            waiting.pop();
            let node = graph.node(id);
            ready[node.engine.index()].push(Ready { height: node.height, id });
        }

        let mut issued_this_cycle = 0usize;
        loop {
            let mut progress = false;
            for engine in Engine::ALL {
                while emitter.has_room(engine) {
                    let Some(Ready { id, .. }) = ready[engine.index()].pop() else {
                        break;
                    };
                    let node = graph.node(id);
                    emitter.emit(node.op.clone());
                    scheduled += 1;
                    issued_this_cycle += 1;
                    progress = true;

                    for &(succ, dist) in &node.succs {
                        earliest[succ] = earliest[succ].max(cycle + dist as u64);
                        remaining[succ] -= 1;
                        if remaining[succ] == 0 {
                            if earliest[succ] <= cycle {
                                let s = graph.node(succ);
                                ready[s.engine.index()].push(Ready { height: s.height, id: succ });
                            } else {
                                waiting.push(Reverse((earliest[succ], succ)));
                            }
                        }
                    }
                }
            }
            if !progress {
                break;
            }
        }

        if issued_this_cycle == 0 {
            if waiting.is_empty() && ready.iter().all(BinaryHeap::is_empty) {
                // Nothing can ever become ready: the graph is exhausted.
                break;
            }
            idle_cycles += 1;
        }
        emitter.close_cycle();
        cycle += 1;
    }

    let bundles = emitter.finish();
    let stats = ScheduleStats {
        ops: scheduled,
        cycles: bundles.len(),
        idle_cycles,
        critical_path,
    };
    debug!(ops = stats.ops, cycles = stats.cycles, idle = stats.idle_cycles, critical_path, "scheduled graph");
    (bundles, stats)
}
