//! Static issue-rule checks on a finished program.
//!
//! Four rules are enforced:
//!
//! - no bundle carries more operations on an engine than its width;
//! - no operand is read while an earlier write to it is still in flight;
//! - no two writes to the same scratch word commit in the same cycle;
//! - writes to a scratch word commit in the order they were issued.
//!
//! A read in the issue cycle of a write sees the old value and is legal.

use std::collections::HashMap;

use crate::core::{Addr, Engine, LegalityViolation, MachineConfig, Program};

/// First violation in issue order, if any.
pub fn verify(program: &Program, config: &MachineConfig) -> Result<(), LegalityViolation> {
    match scan(program, config, true).into_iter().next() {
        Some(violation) => Err(violation),
        None => Ok(()),
    }
}

/// Every violation in issue order.
pub fn violations(program: &Program, config: &MachineConfig) -> Vec<LegalityViolation> {
    scan(program, config, false)
}

/// Latest write issued to an address: (issue cycle, first cycle it is visible).
type InFlight = HashMap<Addr, (usize, usize)>;

fn scan(program: &Program, config: &MachineConfig, first_only: bool) -> Vec<LegalityViolation> {
    let mut found = Vec::new();
    let mut in_flight: InFlight = HashMap::new();
    // Latest commit per address: (issue cycle, commit cycle).
    let mut commits: HashMap<Addr, (usize, usize)> = HashMap::new();

    for (cycle, bundle) in program.bundles.iter().enumerate() {
        for engine in Engine::ALL {
            let count = bundle.count(engine);
            let width = config.width(engine);
            if count > width {
                found.push(LegalityViolation::SlotOverflow { cycle, engine, count, width });
            }
        }

        for op in bundle.ops() {
            let mut reads = op.reads(config.vlen);
            reads.sort_unstable();
            reads.dedup();
            for addr in reads {
                if let Some(&(writer_cycle, visible_at)) = in_flight.get(&addr) {
                    if writer_cycle < cycle && cycle < visible_at {
                        found.push(LegalityViolation::StaleRead { cycle, addr, writer_cycle, visible_at });
                    }
                }
            }
        }

        for op in bundle.ops() {
            let latency = config.latency(op.engine()) as usize;
            let commit = cycle + latency.saturating_sub(1);
            for addr in op.writes(config.vlen) {
                match commits.get(&addr) {
                    Some(&(first, latest)) if latest == commit => {
                        found.push(LegalityViolation::WriteConflict { addr, first, second: cycle, commit });
                    }
                    Some(&(earlier, earlier_commit)) if earlier_commit > commit => {
                        found.push(LegalityViolation::CommitOrder {
                            addr,
                            earlier,
                            earlier_commit,
                            later: cycle,
                            later_commit: commit,
                        });
                    }
                    _ => {
                        commits.insert(addr, (cycle, commit));
                    }
                }
                in_flight.insert(addr, (cycle, cycle + latency));
            }
        }

        if first_only && !found.is_empty() {
            found.truncate(1);
            break;
        }
    }
    found
}
