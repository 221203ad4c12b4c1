use std::cmp::Ordering;

/// Greedy max-min selection of up to `k` mutually distant items.
///
/// Items are ranked best first; item 0 is always kept. Each further pick is the
/// remaining item farthest from its nearest selected item, ties broken by the
/// larger average distance to the selection, then by rank. Returns indices in
/// selection order.
///
/// * `n` - Number of ranked items.
/// * `k` - Number of items to select.
/// * `dist` - Distance between two items.
pub fn select_diverse<F>(n: usize, k: usize, dist: F) -> Vec<usize>
where
    F: Fn(usize, usize) -> f64,
{
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let mut selected = vec![0];
    // Nearest and summed distance of every item to the selection.
    let mut nearest: Vec<f64> = (0..n).map(|i| dist(i, 0)).collect();
    let mut summed = nearest.clone();
    let mut taken = vec![false; n];
    taken[0] = true;

    while selected.len() < k.min(n) {
        let mut best: Option<usize> = None;
        for i in (0..n).filter(|i| !taken[*i]) {
            let better = match best {
                None => true,
                Some(b) => match nearest[i].partial_cmp(&nearest[b]).unwrap_or(Ordering::Equal) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => summed[i] > summed[b],
                },
            };
            if better {
                best = Some(i);
            }
        }
        let Some(pick) = best else { break };
        taken[pick] = true;
        selected.push(pick);
        for i in 0..n {
            let d = dist(i, pick);
            nearest[i] = nearest[i].min(d);
            summed[i] += d;
        }
    }
    selected
}
