use crate::models::TextChunk;
use std::cmp::Ordering;

pub const DEFAULT_TOP_K: usize = 3;

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    dot / (left_norm * right_norm)
}

/// Returns the `k` chunks most similar to `question`, best first.
///
/// The sort is stable, so chunks with equal scores keep their extraction
/// order. NaN scores rank below every real score. `chunk_vectors[i]` must
/// belong to `chunks[i]`; surplus entries on either side are ignored.
pub fn rank_top_k(
    chunks: &[TextChunk],
    chunk_vectors: &[Vec<f32>],
    question: &[f32],
    k: usize,
) -> Vec<TextChunk> {
    let mut scored = chunks
        .iter()
        .zip(chunk_vectors)
        .map(|(chunk, vector)| (chunk, cosine_similarity(vector, question)))
        .collect::<Vec<_>>();

    scored.sort_by(|(_, left), (_, right)| descending(*left, *right));

    scored
        .into_iter()
        .take(k)
        .map(|(chunk, _)| chunk.clone())
        .collect()
}

fn descending(left: f32, right: f32) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => right.total_cmp(&left),
    }
}

pub fn build_context(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
