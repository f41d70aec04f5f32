/// Sparse geometric size schedule used for one-shot region extraction.
///
/// Returns every size of the form `2^k` or `3 * 2^k` in `[min_size, max_size)`,
/// largest first.
#[must_use]
pub fn region_sizes(min_size: usize, max_size: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut power: usize = 1;
    while power < max_size {
        for size in [power, power.saturating_mul(3)] {
            if (min_size..max_size).contains(&size) {
                sizes.push(size);
            }
        }
        let Some(next) = power.checked_mul(2) else {
            break;
        };
        power = next;
    }
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();
    sizes
}
