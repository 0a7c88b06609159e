//! Executor phases and the legal transitions between them
//!
//! ```text
//! Start -> Retrieving -> Generating -> Deciding -+-> Finalizing -> Done
//!              ^                                 |
//!              +----------- Continue ------------+
//! ```

use super::decision::Decision;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Retrieving,
    Generating,
    Deciding,
    Finalizing,
    Done,
}

impl Phase {
    /// Successor phase.
    ///
    /// `decision` is consulted only when leaving `Deciding`, where it is
    /// required. Returns `None` from `Done` or from `Deciding` without a
    /// decision.
    pub fn next(self, decision: Option<Decision>) -> Option<Phase> {
        match self {
            Phase::Start => Some(Phase::Retrieving),
            Phase::Retrieving => Some(Phase::Generating),
            Phase::Generating => Some(Phase::Deciding),
            Phase::Deciding => match decision? {
                Decision::Continue => Some(Phase::Retrieving),
                Decision::End(_) => Some(Phase::Finalizing),
            },
            Phase::Finalizing => Some(Phase::Done),
            Phase::Done => None,
        }
    }

    pub fn can_transition_to(self, to: Phase) -> bool {
        matches!(
            (self, to),
            (Phase::Start, Phase::Retrieving)
                | (Phase::Retrieving, Phase::Generating)
                | (Phase::Generating, Phase::Deciding)
                | (Phase::Deciding, Phase::Retrieving)
                | (Phase::Deciding, Phase::Finalizing)
                | (Phase::Finalizing, Phase::Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Retrieving => "retrieving",
            Phase::Generating => "generating",
            Phase::Deciding => "deciding",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Phase::Start),
            "retrieving" => Ok(Phase::Retrieving),
            "generating" => Ok(Phase::Generating),
            "deciding" => Ok(Phase::Deciding),
            "finalizing" => Ok(Phase::Finalizing),
            "done" => Ok(Phase::Done),
            other => Err(format!("Unknown phase: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::decision::EndReason;

    const ALL: [Phase; 6] = [
        Phase::Start,
        Phase::Retrieving,
        Phase::Generating,
        Phase::Deciding,
        Phase::Finalizing,
        Phase::Done,
    ];

    #[test]
    fn test_linear_successors() {
        assert_eq!(Phase::Start.next(None), Some(Phase::Retrieving));
        assert_eq!(Phase::Retrieving.next(None), Some(Phase::Generating));
        assert_eq!(Phase::Generating.next(None), Some(Phase::Deciding));
        assert_eq!(Phase::Finalizing.next(None), Some(Phase::Done));
        assert_eq!(Phase::Done.next(None), None);
    }

    #[test]
    fn test_deciding_branches_on_decision() {
        assert_eq!(
            Phase::Deciding.next(Some(Decision::Continue)),
            Some(Phase::Retrieving)
        );
        assert_eq!(
            Phase::Deciding.next(Some(Decision::End(EndReason::NoNewTargets))),
            Some(Phase::Finalizing)
        );
        assert_eq!(Phase::Deciding.next(None), None);
    }

    #[test]
    fn test_every_successor_is_a_legal_transition() {
        let decisions = [
            None,
            Some(Decision::Continue),
            Some(Decision::End(EndReason::DepthLimit)),
        ];
        for phase in ALL {
            for decision in decisions {
                if let Some(to) = phase.next(decision) {
                    assert!(phase.can_transition_to(to), "{} -> {}", phase, to);
                }
            }
        }
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!Phase::Start.can_transition_to(Phase::Finalizing));
        assert!(!Phase::Generating.can_transition_to(Phase::Retrieving));
        assert!(!Phase::Finalizing.can_transition_to(Phase::Retrieving));
        assert!(!Phase::Done.can_transition_to(Phase::Start));
        for phase in ALL {
            assert!(!phase.can_transition_to(phase));
        }
    }

    #[test]
    fn test_string_forms_parse_back() {
        for phase in ALL {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("bogus".parse::<Phase>().is_err());
    }
}
