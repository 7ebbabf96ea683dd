//! Machine states.

use std::fmt;

/// State tag stored in a [`StateMachineData`](super::StateMachineData) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// A transition is in progress.
    Working,
    /// The stored code matches no known state.
    Unknown,
    /// Initial state of a zero-filled record.
    State0,
    /// Application state 1.
    State1,
    /// Application state 2.
    State2,
    /// Application state 3.
    State3,
}

impl MachineState {
    /// The stored code of this state.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Working => -2,
            Self::Unknown => -1,
            Self::State0 => 0,
            Self::State1 => 1,
            Self::State2 => 2,
            Self::State3 => 3,
        }
    }

    /// Maps a stored code back to a state; unrecognized codes are `Unknown`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -2 => Self::Working,
            0 => Self::State0,
            1 => Self::State1,
            2 => Self::State2,
            3 => Self::State3,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Working => "WORKING",
            Self::Unknown => "UNKNOWN",
            Self::State0 => "STATE_0",
            Self::State1 => "STATE_1",
            Self::State2 => "STATE_2",
            Self::State3 => "STATE_3",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for state in [
            MachineState::Working,
            MachineState::Unknown,
            MachineState::State0,
            MachineState::State1,
            MachineState::State2,
            MachineState::State3,
        ] {
            assert_eq!(MachineState::from_code(state.code()), state);
        }
    }

    #[test]
    fn unrecognized_codes_are_unknown() {
        assert_eq!(MachineState::from_code(42), MachineState::Unknown);
        assert_eq!(MachineState::from_code(-7), MachineState::Unknown);
    }
}
