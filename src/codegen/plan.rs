//! Per-round lowering plans.
//!
//! When every walker starts at the root, all walkers of a batch sit on the
//! same tree level in every round until the first wrap. The plan tracks that
//! level and picks cheaper lowerings while it is known:
//!
//! - level 0: the node value is one broadcast constant
//! - level 1: the node value is one of two broadcast constants, picked by mask
//! - a level whose children all lie past the end of the tree resets every
//!   walker to the root without computing the child index
//!
//! Once the level is unknown every later round gathers and clamps.

use crate::core::{BuildError, BuildResult};

/// How the node value of a round is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherMode {
    /// All walkers at the root: broadcast `tree[0]`.
    Broadcast,
    /// All walkers on level 1: select `tree[1]` or `tree[2]` by the low index bit.
    SelectPair,
    /// Per-lane loads at `forest_values_p + idx`.
    Gather,
}

/// How the index is advanced at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    /// Index known to be 0: `idx = 1 + bit`.
    FromRoot,
    /// Children known in range: `idx = 2 * idx + 1 + bit`.
    Descend,
    /// Children may fall off the tree: descend, then reset overflow to 0.
    DescendClamped,
    /// Every child falls off the tree: `idx = 0`.
    ResetToRoot,
}

/// Lowering choices for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPlan {
    pub round: usize,
    pub gather: GatherMode,
    pub update: IndexUpdate,
    /// Tree level of every walker at the start of the round, when known.
    pub level: Option<u32>,
}

impl RoundPlan {
    /// Whether the round reads the incoming index register.
    pub fn reads_index(&self) -> bool {
        let gather = matches!(self.gather, GatherMode::Gather | GatherMode::SelectPair);
        let update = matches!(self.update, IndexUpdate::Descend | IndexUpdate::DescendClamped);
        gather || update
    }

    /// Whether the round needs `n_nodes` in a register.
    pub fn needs_node_count(&self) -> bool {
        self.update == IndexUpdate::DescendClamped
    }
}

/// First node index on a level.
#[inline]
fn level_start(level: u32) -> u64 {
    (1u64 << level) - 1
}

/// Build the plan for every round.
///
/// `known_root` states that every walker starts at index 0; `shortcuts`
/// enables the level-based lowerings. Without both, every round gathers and
/// clamps.
pub fn plan_rounds(rounds: usize, n_nodes: usize, known_root: bool, shortcuts: bool) -> BuildResult<Vec<RoundPlan>> {
    if n_nodes == 0 {
        return Err(BuildError::InvalidParams("tree must have at least one node".into()));
    }
    let n = n_nodes as u64;
    let mut level: Option<u32> = (known_root && shortcuts).then_some(0);
    let mut plans = Vec::with_capacity(rounds);

    for round in 0..rounds {
        let plan = match level {
            Some(l) => {
                let gather = match l {
                    0 => GatherMode::Broadcast,
                    1 if n >= 3 => GatherMode::SelectPair,
                    _ => GatherMode::Gather,
                };
                let next_start = level_start(l + 1);
                let next_end = level_start(l + 2);
                let (update, next) = if next_start >= n {
                    (IndexUpdate::ResetToRoot, Some(0))
                } else if next_end <= n {
                    let update = if l == 0 { IndexUpdate::FromRoot } else { IndexUpdate::Descend };
                    (update, Some(l + 1))
                } else {
                    (IndexUpdate::DescendClamped, None)
                };
                level = next;
                RoundPlan { round, gather, update, level: Some(l) }
            }
            None => RoundPlan {
                round,
                gather: GatherMode::Gather,
                update: IndexUpdate::DescendClamped,
                level: None,
            },
        };
        plans.push(plan);
    }
    Ok(plans)
}

/// Whether the initial index vectors must be loaded from memory.
pub fn reads_initial_indices(plans: &[RoundPlan]) -> bool {
    plans.first().map_or(true, RoundPlan::reads_index)
}
