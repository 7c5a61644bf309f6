//! Event scheduling on the LPs bound to a worker.
//!
//! Each call to [`schedule`] performs one unit of work on the LP with the
//! smallest candidate timestamp: either a pending rollback, the resumption of
//! a suspended event or the forward execution of the next event.
use crate::message::Msg;
use crate::model::Model;
use crate::process::{Lp, LpState};
use crate::simulation::SimulationError;

pub(crate) mod binding;
mod stf;

pub(crate) use stf::smallest_timestamp_first;

/// Performs one scheduling step.
///
/// Messages sent as a result of the step are appended to `out`. Returns
/// `false` if no LP had anything to do.
#[track_caller]
pub(crate) fn schedule<M: Model>(
    model: &M,
    lps: &mut [Lp<M::State>],
    lp_count: usize,
    out: &mut Vec<Msg>,
) -> Result<bool, SimulationError> {
    let Some(index) = smallest_timestamp_first(lps) else {
        return Ok(false);
    };
    let lp = &mut lps[index];

    if lp.state == LpState::Rollback {
        lp.rollback(model, lp_count, out)?;
        return Ok(true);
    }

    let (key, resumed) = if lp.state == LpState::ReadyForSynch {
        let Some(bound) = lp.bound() else {
            return Err(SimulationError::InvalidState {
                lp: lp.gid,
                description: "resumption requested without a suspended event",
                location: std::panic::Location::caller(),
            });
        };
        (bound, true)
    } else {
        match lp.advance_to_next_event() {
            Some(key) => (key, false),
            None => return Ok(false),
        }
    };

    lp.process_event(model, key, lp_count, resumed)?;
    lp.send_outgoing(out);
    lp.log_state();

    Ok(true)
}
