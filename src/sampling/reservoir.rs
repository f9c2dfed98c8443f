use rand::Rng;

/// Single-pass uniform sample of `k` items from a stream of unknown length
/// (Algorithm R). Each input item survives with probability `k / n`.
pub fn reservoir_sample<T, I, R>(items: I, k: usize, rng: &mut R) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    R: Rng + ?Sized,
{
    let mut reservoir = Vec::with_capacity(k);
    if k == 0 {
        return reservoir;
    }

    for (i, item) in items.into_iter().enumerate() {
        if i < k {
            reservoir.push(item);
        } else {
            let j = rng.gen_range(0..=i);
            if j < k {
                reservoir[j] = item;
            }
        }
    }

    reservoir
}

/// Reservoir capacity for a relative error: `max(100, round(N * (1 - eps)))`
pub fn reservoir_size(total_rows: usize, epsilon: f64) -> usize {
    ((total_rows as f64 * (1.0 - epsilon)).round() as usize).max(100)
}
