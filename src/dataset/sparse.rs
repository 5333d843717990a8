use super::Float;

/// Collect one CSR row into `buf` as ordered `(index, value)` pairs.
///
/// Duplicate indices are summed into a single entry. CSR storage keeps the
/// indices of a row in nondecreasing order, so duplicates are always
/// adjacent. The whole row is folded either way; the return value is
/// `false` when any value was non-finite, letting training passes reject
/// the row before touching any model state.
pub fn fold_row_into<F: Float>(indices: &[usize], values: &[F], buf: &mut Vec<(usize, F)>) -> bool {
    buf.clear();
    let mut finite = true;
    for (&idx, &value) in indices.iter().zip(values.iter()) {
        finite &= value.is_finite();
        match buf.last_mut() {
            Some((last, acc)) if *last == idx => *acc += value,
            _ => buf.push((idx, value)),
        }
    }
    finite
}
