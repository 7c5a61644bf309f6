//! Assignment of LPs to workers.
use crate::model::LpId;
use crate::simulation::LpBinding;

/// Returns the LPs bound to each of the `workers` workers.
///
/// Every LP is bound to exactly one worker, and the LPs of each worker are in
/// increasing order.
pub(crate) fn bind(binding: LpBinding, lp_count: usize, workers: usize) -> Vec<Vec<LpId>> {
    let workers = workers.clamp(1, lp_count.max(1));
    let mut bound = vec![Vec::new(); workers];

    match binding {
        LpBinding::Block | LpBinding::Knapsack => {
            // The first `lp_count % workers` workers get one extra LP.
            let base = lp_count / workers;
            let extra = lp_count % workers;
            let mut next = 0;
            for (worker, lps) in bound.iter_mut().enumerate() {
                let len = base + usize::from(worker < extra);
                lps.extend((next..next + len).map(LpId::new));
                next += len;
            }
        }
        LpBinding::Circular => {
            for gid in 0..lp_count {
                bound[gid % workers].push(LpId::new(gid));
            }
        }
    }

    bound
}

/// Assigns LPs to workers so that the sum of the workloads of the LPs of each
/// worker approaches the mean load, and returns the worker of each LP.
///
/// The heaviest LPs are assigned first, one per worker. The following ones go
/// to the first worker that can take them without exceeding the mean load;
/// once an LP fits nowhere, the remaining LPs are assigned in round-robin.
pub(crate) fn knapsack(workloads: &[f64], workers: usize) -> Vec<usize> {
    let lp_count = workloads.len();
    let workers = workers.clamp(1, lp_count.max(1));
    let cost = |gid: usize| {
        let w = workloads[gid];
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    };
    let reference = (0..lp_count).map(cost).sum::<f64>() / workers as f64;

    // Stable sort: equal workloads keep the LP order.
    let mut order: Vec<usize> = (0..lp_count).collect();
    order.sort_by(|&a, &b| cost(b).total_cmp(&cost(a)));

    let mut owners = vec![0; lp_count];
    let mut loads = vec![0.0; workers];
    let mut pending = order.into_iter().peekable();
    for (worker, load) in loads.iter_mut().enumerate() {
        let Some(gid) = pending.next() else {
            break;
        };
        owners[gid] = worker;
        *load += cost(gid);
    }
    while let Some(&gid) = pending.peek() {
        let Some(worker) = loads.iter().position(|&load| load + cost(gid) <= reference) else {
            break;
        };
        owners[gid] = worker;
        loads[worker] += cost(gid);
        pending.next();
    }
    for (i, gid) in pending.enumerate() {
        owners[gid] = i % workers;
    }

    owners
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(bound: &[Vec<LpId>]) -> Vec<Vec<usize>> {
        bound
            .iter()
            .map(|lps| lps.iter().map(|lp| lp.index()).collect())
            .collect()
    }

    #[test]
    fn block_binding() {
        let bound = bind(LpBinding::Block, 7, 3);
        assert_eq!(indices(&bound), vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn circular_binding() {
        let bound = bind(LpBinding::Circular, 7, 3);
        assert_eq!(indices(&bound), vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn knapsack_balances_load() {
        let workloads = [8.0, 1.0, 1.0, 1.0, 1.0, 4.0, 2.0, 2.0];
        let owners = knapsack(&workloads, 2);

        assert_eq!(owners, vec![0, 1, 1, 1, 1, 1, 0, 1]);
        let load = |worker| {
            owners
                .iter()
                .zip(workloads)
                .filter(|(owner, _)| **owner == worker)
                .map(|(_, w)| w)
                .sum::<f64>()
        };
        assert_eq!(load(0), 10.0);
        assert_eq!(load(1), 10.0);
    }

    #[test]
    fn knapsack_leftovers_are_spread() {
        assert_eq!(knapsack(&[5.0, 5.0, 5.0], 2), vec![0, 1, 0]);
    }

    #[test]
    fn knapsack_gives_every_worker_an_lp() {
        // No measurement yet: all workloads are zero or invalid.
        let owners = knapsack(&[0.0, f64::NAN, 0.0, f64::INFINITY, 0.0], 3);
        for worker in 0..3 {
            assert!(owners.contains(&worker));
        }
        assert!(owners.iter().all(|&owner| owner < 3));
    }

    #[test]
    fn more_workers_than_lps() {
        let bound = bind(LpBinding::Block, 2, 4);
        assert_eq!(indices(&bound), vec![vec![0], vec![1]]);
    }
}
