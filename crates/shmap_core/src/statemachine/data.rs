//! The state machine record.

use super::state::MachineState;
use crate::backoff::Backoff;
use crate::error::StoreResult;
use crate::view::{FieldId, FieldType, Schema, ValueRecord, ValueView};
use std::time::{Duration, Instant};

/// A `{ state: Int32, data: Int32 }` record bound in place.
///
/// Cloning yields another handle onto the same record.
#[derive(Debug, Clone)]
pub struct StateMachineData {
    view: ValueView,
    state: FieldId,
    data: FieldId,
}

impl StateMachineData {
    /// Schema name used in the registry.
    pub const SCHEMA_NAME: &'static str = "StateMachineData";

    /// Reads the current state.
    pub fn state(&self) -> StoreResult<MachineState> {
        Ok(MachineState::from_code(self.view.get_i32(self.state)?))
    }

    /// Overwrites the state unconditionally.
    pub fn set_state(&self, state: MachineState) -> StoreResult<()> {
        self.view.set_i32(self.state, state.code())
    }

    /// Moves from `from` to `to` if the record is in `from`.
    ///
    /// Returns `false`, leaving the record untouched, if it was in any other
    /// state. Of several callers racing on the same `from`, exactly one wins.
    pub fn transition(&self, from: MachineState, to: MachineState) -> StoreResult<bool> {
        let moved = self.view.compare_and_swap(
            self.state,
            i64::from(from.code()),
            i64::from(to.code()),
        )?;
        if moved {
            tracing::trace!(%from, %to, "state transition");
        }
        Ok(moved)
    }

    /// Waits until the record is in `from`, then moves it to `to`.
    ///
    /// Retries in a tight loop for [`Backoff::SPIN_LIMIT`] rounds, then
    /// yields between attempts. Does not return until the transition happens.
    pub fn wait_for_state(&self, from: MachineState, to: MachineState) -> StoreResult<()> {
        let mut backoff = Backoff::new();
        while !self.transition(from, to)? {
            backoff.snooze();
        }
        Ok(())
    }

    /// Like [`wait_for_state`](Self::wait_for_state) but gives up after
    /// `timeout`. Returns whether the transition happened.
    pub fn wait_for_state_timeout(
        &self,
        from: MachineState,
        to: MachineState,
        timeout: Duration,
    ) -> StoreResult<bool> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if self.transition(from, to)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            backoff.snooze();
        }
    }

    /// Reads the data word.
    pub fn state_data(&self) -> StoreResult<i32> {
        self.view.get_i32(self.data)
    }

    /// Writes the data word.
    pub fn set_state_data(&self, data: i32) -> StoreResult<()> {
        self.view.set_i32(self.data, data)
    }
}

impl ValueRecord for StateMachineData {
    fn schema() -> Schema {
        Schema::packed(
            Self::SCHEMA_NAME,
            &[("state", FieldType::Int32), ("data", FieldType::Int32)],
        )
    }

    fn from_view(view: ValueView) -> StoreResult<Self> {
        let state = view.field_id("state")?;
        let data = view.field_id("data")?;
        Ok(Self { view, state, data })
    }

    fn view(&self) -> &ValueView {
        &self.view
    }

    fn into_view(self) -> ValueView {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmap_region::MappedRegion;
    use std::sync::Arc;

    fn record(region: &Arc<MappedRegion>) -> StateMachineData {
        let mut view = ValueView::new(Arc::new(StateMachineData::schema()));
        view.bind(region, 0, 8).unwrap();
        StateMachineData::from_view(view).unwrap()
    }

    #[test]
    fn zeroed_record_starts_in_state0() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let smd = record(&region);
        assert_eq!(smd.state().unwrap(), MachineState::State0);
        assert_eq!(smd.state_data().unwrap(), 0);
    }

    #[test]
    fn transition_only_from_expected_state() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let smd = record(&region);
        assert!(!smd
            .transition(MachineState::State1, MachineState::State2)
            .unwrap());
        assert!(smd
            .transition(MachineState::State0, MachineState::State1)
            .unwrap());
        assert_eq!(smd.state().unwrap(), MachineState::State1);
    }

    #[test]
    fn wait_times_out() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let smd = record(&region);
        let moved = smd
            .wait_for_state_timeout(
                MachineState::State2,
                MachineState::State3,
                Duration::from_millis(20),
            )
            .unwrap();
        assert!(!moved);
        assert_eq!(smd.state().unwrap(), MachineState::State0);
    }

    #[test]
    fn garbage_state_reads_unknown() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let smd = record(&region);
        smd.view().set_i32("state", 99).unwrap();
        assert_eq!(smd.state().unwrap(), MachineState::Unknown);
        smd.set_state_data(7).unwrap();
        assert_eq!(smd.state_data().unwrap(), 7);
    }

    #[test]
    fn waiter_released_by_other_thread() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let smd = record(&region);
        let waiter = {
            let smd = smd.clone();
            std::thread::spawn(move || {
                smd.wait_for_state(MachineState::State1, MachineState::State2)
                    .unwrap();
            })
        };
        smd.set_state(MachineState::State1).unwrap();
        waiter.join().unwrap();
        assert_eq!(smd.state().unwrap(), MachineState::State2);
    }
}
