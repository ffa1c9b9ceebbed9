//! Cosine similarity between embedding vectors

/// Score returned when two inputs cannot be compared
pub const NO_MATCH: f32 = 0.0;

/// Cosine similarity clamped to `[0, 1]`.
///
/// Empty vectors, mismatched dimensions, zero norms and non-finite values all
/// yield [`NO_MATCH`] instead of an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return NO_MATCH;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return NO_MATCH;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !score.is_finite() {
        return NO_MATCH;
    }

    score.clamp(0.0, 1.0) as f32
}
