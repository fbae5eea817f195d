//! Origin (anchor chain) resolution.
//!
//! An item may be placed relative to another item of the same bucket. Chains
//! of any depth resolve in passes: each pass places the items whose origin is
//! already settled. Missing or dropped origins fall back to the base point;
//! items caught in a cycle fall back to the base point once the passes stall,
//! and their dependents then resolve normally.

/// Place every eligible item. `place(i, origin)` computes item `i` relative
/// to its origin's placement (`None` = base point) and may itself fail.
pub fn resolve_in_passes<P, O, F>(eligible: &[bool], origin_of: O, mut place: F) -> Vec<Option<P>>
where
    O: Fn(usize) -> Option<usize>,
    F: FnMut(usize, Option<&P>) -> Option<P>,
{
    let n = eligible.len();
    let mut placed: Vec<Option<P>> = (0..n).map(|_| None).collect();
    let mut settled: Vec<bool> = eligible.iter().map(|e| !e).collect();
    let mut pending: Vec<usize> = (0..n).filter(|&i| eligible[i]).collect();
    let origin = |i: usize| origin_of(i).filter(|&j| j < n && j != i);

    while !pending.is_empty() {
        let mut waiting = Vec::with_capacity(pending.len());
        for &i in &pending {
            match origin(i) {
                Some(j) if !settled[j] => waiting.push(i),
                target => {
                    let result = place(i, target.and_then(|j| placed[j].as_ref()));
                    placed[i] = result;
                    settled[i] = true;
                }
            }
        }

        if waiting.len() == pending.len() {
            // Stalled: only cycles (and their dependents) remain. Break every
            // cycle at its members and let the dependents follow next pass.
            let mut broke = false;
            for &i in &waiting {
                if on_cycle(i, n, &origin) {
                    placed[i] = place(i, None);
                    settled[i] = true;
                    broke = true;
                }
            }
            if !broke {
                break;
            }
            waiting.retain(|&i| !settled[i]);
        }
        pending = waiting;
    }
    placed
}

fn on_cycle(start: usize, n: usize, origin: &impl Fn(usize) -> Option<usize>) -> bool {
    let mut current = start;
    for _ in 0..n {
        match origin(current) {
            Some(next) if next == start => return true,
            Some(next) => current = next,
            None => return false,
        }
    }
    false
}
