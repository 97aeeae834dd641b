//! 2-D t-SNE projection of face embeddings (exact t-SNE from `bhtsne`).

use crate::types::Embedding;
use thiserror::Error;

/// Smallest number of embeddings worth projecting.
pub const MIN_POINTS: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum ProjectionError {
    #[error("need at least {MIN_POINTS} faces to project, got {0}")]
    TooFewPoints(usize),
    #[error("embedding {index} has {got} dimensions, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, got: usize },
    #[error("projection produced {got} coordinates for {points} points")]
    BadOutput { points: usize, got: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionParams {
    pub perplexity: f32,
    pub epochs: usize,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self { perplexity: 5.0, epochs: 1000 }
    }
}

impl ProjectionParams {
    /// Perplexity actually used for `n` points: t-SNE needs `3 * perplexity < n`.
    pub fn effective_perplexity(&self, n: usize) -> f32 {
        let ceiling = (n.saturating_sub(1)) as f32 / 3.0;
        self.perplexity.min(ceiling).max(f32::MIN_POSITIVE)
    }
}

fn euclidean(a: &&[f32], b: &&[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// Project embeddings onto the plane, one `(x, y)` per input in input order.
pub fn project_2d(
    embeddings: &[&Embedding],
    params: &ProjectionParams,
) -> Result<Vec<(f32, f32)>, ProjectionError> {
    let n = embeddings.len();
    if n < MIN_POINTS {
        return Err(ProjectionError::TooFewPoints(n));
    }

    let dim = embeddings[0].dim();
    if let Some((index, e)) = embeddings.iter().enumerate().find(|(_, e)| e.dim() != dim) {
        return Err(ProjectionError::DimensionMismatch { index, expected: dim, got: e.dim() });
    }

    let samples: Vec<&[f32]> = embeddings.iter().map(|e| e.values.as_slice()).collect();
    let perplexity = params.effective_perplexity(n);
    tracing::debug!(points = n, dim, perplexity, epochs = params.epochs, "running t-SNE");

    let mut tsne = bhtsne::tSNE::new(&samples);
    tsne.embedding_dim(2)
        .perplexity(perplexity)
        .epochs(params.epochs)
        .exact(euclidean);
    let flat: Vec<f32> = tsne.embedding();

    if flat.len() != n * 2 {
        return Err(ProjectionError::BadOutput { points: n, got: flat.len() });
    }
    Ok(flat.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(center: f32, jitter: &[f32]) -> Vec<Embedding> {
        jitter
            .iter()
            .map(|j| Embedding::new(vec![center + j, center - j, center, center * 0.5 + j]))
            .collect()
    }

    #[test]
    fn test_too_few_points() {
        let e = Embedding::new(vec![1.0, 2.0]);
        let err = project_2d(&[&e, &e, &e], &ProjectionParams::default()).unwrap_err();
        assert_eq!(err, ProjectionError::TooFewPoints(3));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        let err = project_2d(&[&a, &a, &b, &a], &ProjectionParams::default()).unwrap_err();
        assert_eq!(err, ProjectionError::DimensionMismatch { index: 2, expected: 2, got: 3 });
    }

    #[test]
    fn test_effective_perplexity_clamps() {
        let params = ProjectionParams::default();
        assert!((params.effective_perplexity(4) - 1.0).abs() < 1e-6);
        assert!((params.effective_perplexity(100) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_projection_shape_and_separation() {
        let mut points = cluster(0.0, &[0.0, 0.01, 0.02, 0.03, 0.04]);
        points.extend(cluster(10.0, &[0.0, 0.01, 0.02, 0.03, 0.04]));
        let refs: Vec<&Embedding> = points.iter().collect();

        let params = ProjectionParams { perplexity: 2.0, epochs: 500 };
        let coords = project_2d(&refs, &params).expect("projection");
        assert_eq!(coords.len(), 10);
        assert!(coords.iter().all(|(x, y)| x.is_finite() && y.is_finite()));

        let centroid = |pts: &[(f32, f32)]| {
            let n = pts.len() as f32;
            (pts.iter().map(|p| p.0).sum::<f32>() / n, pts.iter().map(|p| p.1).sum::<f32>() / n)
        };
        let spread = |pts: &[(f32, f32)], c: (f32, f32)| {
            pts.iter()
                .map(|p| ((p.0 - c.0).powi(2) + (p.1 - c.1).powi(2)).sqrt())
                .fold(0.0f32, f32::max)
        };
        let (ca, cb) = (centroid(&coords[..5]), centroid(&coords[5..]));
        let between = ((ca.0 - cb.0).powi(2) + (ca.1 - cb.1).powi(2)).sqrt();
        assert!(between > spread(&coords[..5], ca), "clusters should not overlap");
    }
}
