use thiserror::Error;

/// Phases a voting round can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundPhase {
    /// Members are picking cards; values stay private to their owners.
    #[default]
    Collecting,
    /// Every vote is visible to every member and the round is frozen.
    Revealed,
}

/// Events that can be applied to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// A member sets or retracts their vote.
    CastVote,
    /// Votes become visible to everyone.
    Reveal,
    /// Votes are cleared and a new round starts.
    Reset,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the round was in when the event was received.
    pub from: RoundPhase,
    /// The rejected event.
    pub event: RoundEvent,
}

impl RoundPhase {
    /// Whether votes are currently visible to everyone.
    pub fn is_revealed(self) -> bool {
        matches!(self, RoundPhase::Revealed)
    }

    /// Compute the phase reached by applying `event`, without mutating anything.
    pub fn transition(self, event: RoundEvent) -> Result<RoundPhase, InvalidTransition> {
        let next = match (self, event) {
            (RoundPhase::Collecting, RoundEvent::CastVote) => RoundPhase::Collecting,
            (RoundPhase::Collecting, RoundEvent::Reveal) => RoundPhase::Revealed,
            (RoundPhase::Revealed, RoundEvent::Reveal) => RoundPhase::Revealed,
            (_, RoundEvent::Reset) => RoundPhase::Collecting,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
