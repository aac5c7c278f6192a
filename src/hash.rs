use fnv::FnvHasher;
use murmur3::murmur3_x64_128;
use std::hash::Hasher;
use std::io::Cursor;

pub(crate) fn hash_murmur64(key: &[u8]) -> u64 {
    let mut cursor = Cursor::new(key);
    let h = murmur3_x64_128(&mut cursor, 0).expect("Failed to compute Murmur3 hash");
    h as u64
}

pub(crate) fn hash_fnv64(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish()
}

/// Derives `num_hashes` cell indices in `[0, num_cells)` for a key using
/// the double-hashing scheme.
///
/// Two independent 64-bit hashes are combined as h(i) = (h1 + i * h2) mod
/// num_cells, where h1 is the low half of a 128-bit Murmur3 and h2 is a
/// 64-bit FNV-1a. Kirsch–Mitzenmacher showed this keeps the asymptotic
/// false-positive rate of `num_hashes` independent hash functions at the
/// cost of two.
///
/// The indices are deterministic for a given key, so the same key always
/// touches the same cells for the lifetime of a filter.
pub fn cell_indexes(key: &[u8], num_hashes: usize, num_cells: usize) -> Vec<usize> {
    let h1 = hash_murmur64(key);
    let h2 = hash_fnv64(key);
    (0..num_hashes as u64)
        .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % num_cells as u64) as usize)
        .collect()
}

/// Calculates the optimal number of cells for the target false-positive
/// rate, using the standard Bloom sizing m = -n * ln(fpr) / (ln 2)^2.
pub fn optimal_num_cells(capacity: usize, fpr: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    ((-(capacity as f64) * fpr.ln()) / (ln2 * ln2)).ceil() as usize
}

/// Calculates the optimal number of hash functions, k = (m/n) * ln 2.
pub fn optimal_num_hashes(capacity: usize, num_cells: usize) -> usize {
    ((num_cells as f64 / capacity as f64) * std::f64::consts::LN_2).ceil() as usize
}
