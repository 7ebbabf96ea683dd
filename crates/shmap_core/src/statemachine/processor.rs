//! A worker that drives one edge of a state machine.

use super::data::StateMachineData;
use super::state::MachineState;
use crate::error::{StoreError, StoreResult};

/// Repeatedly performs the transition `from -> to` on a shared record.
///
/// Each step waits for `from`, claims the record by moving it to
/// [`MachineState::Working`], stores `from`'s code in the data word and
/// releases the record in state `to`. Several processors for different edges
/// sharing one record form a ring in which exactly one of them can fire at a
/// time.
#[derive(Debug, Clone)]
pub struct StateMachineProcessor {
    data: StateMachineData,
    from: MachineState,
    to: MachineState,
    iterations: usize,
}

impl StateMachineProcessor {
    /// Creates a processor for the edge `from -> to`.
    #[must_use]
    pub fn new(
        data: StateMachineData,
        iterations: usize,
        from: MachineState,
        to: MachineState,
    ) -> Self {
        Self {
            data,
            from,
            to,
            iterations,
        }
    }

    /// Performs one transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if another party changed the
    /// record while this processor held it in `Working`.
    pub fn step(&self) -> StoreResult<()> {
        self.data.wait_for_state(self.from, MachineState::Working)?;
        self.data.set_state_data(self.from.code())?;
        if !self.data.transition(MachineState::Working, self.to)? {
            return Err(StoreError::invalid_operation(format!(
                "record left WORKING during {} => {}",
                self.from, self.to
            )));
        }
        Ok(())
    }

    /// Runs all iterations and returns how many transitions completed.
    pub fn run(&self) -> StoreResult<usize> {
        for i in 0..self.iterations {
            tracing::trace!(from = %self.from, to = %self.to, iteration = i, "waiting");
            self.step()?;
        }
        Ok(self.iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{ValueRecord, ValueView};
    use shmap_region::MappedRegion;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ring_of_three_completes() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let mut view = ValueView::new(Arc::new(StateMachineData::schema()));
        view.bind(&region, 0, 8).unwrap();
        let smd = StateMachineData::from_view(view).unwrap();

        let edges = [
            (MachineState::State1, MachineState::State2),
            (MachineState::State2, MachineState::State3),
            (MachineState::State3, MachineState::State1),
        ];
        let workers: Vec<_> = edges
            .into_iter()
            .map(|(from, to)| {
                let processor = StateMachineProcessor::new(smd.clone(), 5, from, to);
                thread::spawn(move || processor.run().unwrap())
            })
            .collect();

        assert!(smd
            .transition(MachineState::State0, MachineState::State1)
            .unwrap());
        let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(total, 15);
        assert_eq!(smd.state().unwrap(), MachineState::State1);
        assert_eq!(smd.state_data().unwrap(), MachineState::State3.code());
    }
}
