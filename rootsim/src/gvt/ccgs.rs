//! Consistent committed global state: evaluation of the termination
//! predicate of the model on the committed state of the LPs.
use crate::model::Model;
use crate::process::Lp;
use crate::simulation::TerminationMode;
use crate::time::SimTime;

/// Evaluates the termination predicate on the committed state of the LPs of
/// a worker and returns `true` if all of them agree to terminate.
pub(crate) fn evaluate<M: Model>(
    model: &M,
    lps: &mut [Lp<M::State>],
    gvt: SimTime,
    mode: TerminationMode,
    lp_count: usize,
) -> bool {
    match mode {
        TerminationMode::Normal | TerminationMode::Accurate => {
            let accurate = mode == TerminationMode::Accurate;
            // Every LP is asked, even after a refusal.
            lps.iter().fold(true, |all, lp| {
                lp.committed_on_gvt(model, gvt, accurate, lp_count) && all
            })
        }
        TerminationMode::Incremental => {
            for lp in lps.iter_mut().filter(|lp| !lp.ccgs_done) {
                if !lp.committed_on_gvt(model, gvt, false, lp_count) {
                    return false;
                }
                lp.ccgs_done = true;
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::{event, new_lp, run_pending, t, Recorder};
    use crate::simulation::Checkpointing;

    #[test]
    fn incremental_mode_remembers_agreement() {
        let mut lps = vec![new_lp(0, Checkpointing::Copy), new_lp(1, Checkpointing::Copy)];
        let mut out = Vec::new();
        for i in 1..=3 {
            lps[0].receive(event(1, 0, i as f64, 0, i)).unwrap();
            lps[1].receive(event(0, 1, (i + 3) as f64, 0, i)).unwrap();
        }
        for lp in &mut lps {
            run_pending(lp, &mut out);
        }

        // LP 0 has 3 committed events at GVT 5, LP 1 only one.
        assert!(!evaluate(&Recorder, &mut lps, t(5.0), TerminationMode::Incremental, 2));
        assert!(lps[0].ccgs_done);
        assert!(!lps[1].ccgs_done);

        assert!(evaluate(&Recorder, &mut lps, t(10.0), TerminationMode::Incremental, 2));
        assert!(lps[1].ccgs_done);
    }

    #[test]
    fn normal_mode_requires_all_lps() {
        let mut lps = vec![new_lp(0, Checkpointing::Copy), new_lp(1, Checkpointing::Copy)];
        let mut out = Vec::new();
        for i in 1..=3 {
            lps[0].receive(event(1, 0, i as f64, 0, i)).unwrap();
        }
        run_pending(&mut lps[0], &mut out);

        assert!(!evaluate(&Recorder, &mut lps, t(10.0), TerminationMode::Normal, 2));
        assert!(evaluate(&Recorder, &mut lps[..1], t(10.0), TerminationMode::Normal, 2));
    }
}
