//! Continuation decision taken after every generate round

use super::state::RunState;
use serde::Serialize;
use std::fmt;

/// Why a run stopped recursing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The last generate round discovered nothing
    NoNewTargets,
    /// `recursion_depth` reached `max_recursions`
    DepthLimit,
    /// Every new target had already been recorded in an earlier round
    AllProcessed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::NoNewTargets => write!(f, "no new targets"),
            EndReason::DepthLimit => write!(f, "depth limit reached"),
            EndReason::AllProcessed => write!(f, "all targets already processed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    Continue,
    End(EndReason),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Continue => write!(f, "continue"),
            Decision::End(reason) => write!(f, "end ({})", reason),
        }
    }
}

/// Decide whether to run another retrieve round.
///
/// Checks run in a fixed order and the first match wins:
/// 1. no new targets
/// 2. depth limit
/// 3. every new target was already processed before this round
pub fn decide(state: &RunState) -> Decision {
    let new_targets = state.new_targets();

    if new_targets.is_empty() {
        return Decision::End(EndReason::NoNewTargets);
    }

    if state.recursion_depth() >= state.max_recursions() {
        return Decision::End(EndReason::DepthLimit);
    }

    // `processed_targets` already ends with this round's targets
    let processed = state.processed_targets();
    let earlier = &processed[..processed.len().saturating_sub(new_targets.len())];
    if new_targets.iter().all(|t| earlier.contains(t)) {
        return Decision::End(EndReason::AllProcessed);
    }

    Decision::Continue
}
