use std::collections::HashMap;

use itertools::Itertools;

/// Maps each identifier to its position
pub fn index_map(ids: &[String]) -> HashMap<&str, usize> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect()
}

/// Returns the first identifier occurring more than once
pub fn first_duplicate(ids: &[String]) -> Option<&String> {
    ids.iter().duplicates().next()
}

pub fn select_indices<T: Clone>(indices: &[usize], data: &[T]) -> Vec<T> {
    indices.iter().map(|i| data[*i].clone()).collect()
}

/// Counts the occurence of each neighborhood size, sorted by size
pub fn calculate_size_counts(sizes: &[usize]) -> Vec<(usize, usize)> {
    let mut counts = HashMap::new();
    for size in sizes {
        *counts.entry(*size).or_insert(0) += 1;
    }
    counts.into_iter().sorted_unstable().collect()
}
