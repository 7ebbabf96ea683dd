//! State machine records coordinated purely through field-level atomics.
//!
//! A [`StateMachineData`] record holds a state tag and one data word. Any
//! number of threads or processes bind views to the same record and move it
//! between states with compare-and-swap; the reserved
//! [`MachineState::Working`] state marks a transition in progress so that
//! exactly one party acts on each state.

mod data;
mod processor;
mod state;

pub use data::StateMachineData;
pub use processor::StateMachineProcessor;
pub use state::MachineState;
