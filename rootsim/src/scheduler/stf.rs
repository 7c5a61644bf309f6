use crate::process::Lp;

/// Returns the index of the LP with the smallest candidate timestamp, if any
/// LP can be scheduled.
///
/// Ties go to the LP with the lowest index.
pub(crate) fn smallest_timestamp_first<S: Clone>(lps: &[Lp<S>]) -> Option<usize> {
    let mut best = None;
    for (index, lp) in lps.iter().enumerate() {
        let Some(ts) = lp.next_event_timestamp() else {
            continue;
        };
        if ts.is_infinite() {
            continue;
        }
        match best {
            Some((_, best_ts)) if best_ts <= ts => {}
            _ => best = Some((index, ts)),
        }
    }

    best.map(|(index, _)| index)
}
