//! Mirror state machine.
//!
//! Every mirrored catalog entity moves through
//! `Unmirrored -> Submitting -> {Mirrored | MirrorFailed}`. A failed mirror
//! goes back to `Submitting` only through an explicit retry, and a mirrored
//! entity becomes `MirrorFailed` only when reconciliation sees its receipt
//! revert.

use mirror_types::{MirrorInfo, MirrorState};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MirrorStateError {
	#[error("Invalid mirror transition from {from} to {to}")]
	InvalidTransition { from: MirrorState, to: MirrorState },
}

/// Validates and applies mirror state transitions.
pub struct MirrorStateMachine;

impl MirrorStateMachine {
	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: MirrorState, to: MirrorState) -> bool {
		static TRANSITIONS: Lazy<HashMap<MirrorState, HashSet<MirrorState>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(
				MirrorState::Unmirrored,
				HashSet::from([MirrorState::Submitting]),
			);
			m.insert(
				MirrorState::Submitting,
				HashSet::from([MirrorState::Mirrored, MirrorState::MirrorFailed]),
			);
			m.insert(
				MirrorState::MirrorFailed,
				HashSet::from([MirrorState::Submitting]),
			);
			m.insert(
				MirrorState::Mirrored,
				HashSet::from([MirrorState::MirrorFailed]),
			);
			m
		});

		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	/// Moves `info` to `to`, or leaves it untouched if the move is invalid.
	pub fn transition(info: &mut MirrorInfo, to: MirrorState) -> Result<(), MirrorStateError> {
		if !Self::is_valid_transition(info.state, to) {
			return Err(MirrorStateError::InvalidTransition {
				from: info.state,
				to,
			});
		}
		tracing::debug!(from = %info.state, to = %to, "Mirror state transition");
		info.state = to;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use MirrorState::*;

	#[test]
	fn test_transition_table() {
		let all = [Unmirrored, Submitting, Mirrored, MirrorFailed];
		let allowed = [
			(Unmirrored, Submitting),
			(Submitting, Mirrored),
			(Submitting, MirrorFailed),
			(MirrorFailed, Submitting),
			(Mirrored, MirrorFailed),
		];

		for from in all {
			for to in all {
				assert_eq!(
					MirrorStateMachine::is_valid_transition(from, to),
					allowed.contains(&(from, to)),
					"{} -> {}",
					from,
					to
				);
			}
		}
	}

	#[test]
	fn test_rejected_transition_leaves_state() {
		let mut info = MirrorInfo::default();
		let err = MirrorStateMachine::transition(&mut info, Mirrored).unwrap_err();
		assert_eq!(
			err,
			MirrorStateError::InvalidTransition {
				from: Unmirrored,
				to: Mirrored
			}
		);
		assert_eq!(info.state, Unmirrored);

		MirrorStateMachine::transition(&mut info, Submitting).unwrap();
		assert_eq!(info.state, Submitting);
	}
}
