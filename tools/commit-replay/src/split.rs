/// Selects chunk `split_idx` of `split_total` contiguous chunks of `files`.
///
/// Chunks are `max(1, len / split_total)` wide and the last chunk absorbs
/// the remainder. When there are fewer files than parts, the trailing
/// chunks come back empty.
pub fn select_chunk<T>(files: &[T], split_idx: usize, split_total: usize) -> &[T] {
    if files.is_empty() || split_total == 0 || split_idx >= split_total {
        return &[];
    }
    let width = (files.len() / split_total).max(1);
    let start = split_idx.saturating_mul(width).min(files.len());
    if split_idx == split_total - 1 {
        return &files[start..];
    }
    let end = start.saturating_add(width).min(files.len());
    &files[start..end]
}
