use tracing::debug;

use crate::models::{ConsistencyHints, StageKind};

/// How the outcome reached the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The stored result was fetched on activation
    Refreshed,
    /// The stage successfully recomputed
    Recomputed,
}

/// One `is_current` flag that changed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    pub stage: StageKind,
    pub is_current: bool,
}

/// Decide the `is_current` flags after `stage` produced an outcome.
///
/// Invalidation is easy and validation is recompute-only:
/// 1. A successful recompute marks `stage` current; nothing else is ever set to true.
/// 2. A refresh whose hints say the stored result was not current marks `stage` stale.
/// 3. A "not current" hint marks the next stage stale; a rules response may
///    also report the classification stage stale directly.
/// 4. Staleness then flows forward: a stale stage makes every later stage stale.
pub fn propagate(
    flags: [bool; 3],
    stage: StageKind,
    trigger: Trigger,
    hints: &ConsistencyHints,
) -> [bool; 3] {
    let mut next = flags;
    let position = stage.position();
    let upstream_current = hints.upstream_current(stage);

    match trigger {
        Trigger::Recomputed => next[position] = true,
        Trigger::Refreshed => {
            if upstream_current == Some(false) {
                next[position] = false;
            }
        }
    }

    if upstream_current == Some(false) {
        if let Some(downstream) = stage.downstream() {
            next[downstream.position()] = false;
        }
    }

    let classification_current = hints.classification.as_ref().and_then(|c| c.is_current());
    if stage < StageKind::Classification && classification_current == Some(false) {
        next[StageKind::Classification.position()] = false;
    }

    for later in stage.downstream_chain() {
        let index = later.position();
        if !next[index - 1] {
            next[index] = false;
        }
    }

    next
}

/// Flags that differ between two snapshots
pub fn diff(before: [bool; 3], after: [bool; 3]) -> Vec<FlagChange> {
    StageKind::ALL
        .into_iter()
        .filter(|kind| before[kind.position()] != after[kind.position()])
        .map(|stage| {
            let is_current = after[stage.position()];
            debug!("{} is_current -> {}", stage, is_current);
            FlagChange { stage, is_current }
        })
        .collect()
}
