//! Vector similarity primitives shared by the fan-out and re-rank stages.
//! Grounded on the teacher's `VectorIndex::calculate_distance` cosine branch,
//! expressed as a similarity (higher is better) rather than a distance.

/// Cosine similarity in `[-1, 1]`; `0.0` for a zero-length or empty vector.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Z-score normalize a set of similarities, then min-max clip into `[0, 1]`.
/// A single-candidate or zero-variance set normalizes to a flat `0.5` rather
/// than dividing by zero.
pub fn z_score_then_clip(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    let std_dev = variance.sqrt();

    if std_dev < f32::EPSILON {
        return vec![0.5; values.len()];
    }

    let z_scores: Vec<f32> = values.iter().map(|v| (v - mean) / std_dev).collect();
    let min = z_scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = z_scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return vec![0.5; values.len()];
    }
    z_scores.iter().map(|z| (z - min) / (max - min)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-5);
    }

    #[test]
    fn z_score_clip_keeps_relative_order() {
        let normalized = z_score_then_clip(&[0.1, 0.5, 0.9]);
        assert!(normalized[0] < normalized[1]);
        assert!(normalized[1] < normalized[2]);
        assert!((normalized[0] - 0.0).abs() < 1e-5);
        assert!((normalized[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn z_score_clip_handles_uniform_input() {
        let normalized = z_score_then_clip(&[0.3, 0.3, 0.3]);
        assert_eq!(normalized, vec![0.5, 0.5, 0.5]);
    }
}
