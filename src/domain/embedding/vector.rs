//! Pure vector utilities used by similarity search

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 for empty or mismatched-length inputs rather than raising.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Scale a vector to unit length.
///
/// A zero-magnitude vector is returned unchanged.
pub fn normalize_vector(v: Vec<f32>) -> Vec<f32> {
    let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude == 0.0 {
        return v;
    }

    v.into_iter().map(|x| x / magnitude).collect()
}
