use serde::{Deserialize, Serialize};

/// Bounding box for a detected face in source-image pixels, with optional landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Integer pixel rectangle `(x, y, w, h)` clamped to an image of the given size.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn to_pixel_rect(&self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.floor().clamp(0.0, img_width as f32) as u32;
        let y0 = self.y.floor().clamp(0.0, img_height as f32) as u32;
        let x1 = (self.x + self.width).ceil().clamp(0.0, img_width as f32) as u32;
        let y1 = (self.y + self.height).ceil().clamp(0.0, img_height as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Zero vectors compare as 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// `1 - euclidean_distance`: 1.0 for identical faces, lower is less alike.
    pub fn likeness(&self, other: &Embedding) -> f32 {
        1.0 - self.euclidean_distance(other)
    }
}

/// A face found in an image, together with its embedding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Anything that can sit in a gallery and be matched by name.
pub trait Labeled {
    fn label(&self) -> &str;
    fn embedding(&self) -> &Embedding;
}

/// Nearest gallery entry for a probe embedding.
#[derive(Debug)]
pub struct Nearest<'a, T> {
    pub entry: &'a T,
    pub index: usize,
    pub distance: f32,
}

impl<T> Nearest<'_, T> {
    pub fn likeness(&self) -> f32 {
        1.0 - self.distance
    }
}

// Manual impls: derives would require `T: Clone`.
impl<T> Clone for Nearest<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Nearest<'_, T> {}

/// Linear scan for the entry with the smallest Euclidean distance to `probe`.
///
/// Every entry is visited. On an exact tie the earlier entry wins.
pub fn nearest<'a, T: Labeled>(probe: &Embedding, gallery: &'a [T]) -> Option<Nearest<'a, T>> {
    let mut best: Option<Nearest<'a, T>> = None;

    for (index, entry) in gallery.iter().enumerate() {
        let distance = probe.euclidean_distance(entry.embedding());
        let better = match &best {
            None => true,
            Some(prev) => distance < prev.distance,
        };
        if better {
            best = Some(Nearest { entry, index, distance });
        }
    }

    best
}

/// Strategy for deciding whether a probe embedding belongs to a gallery entry.
pub trait Matcher {
    fn identify<'a, T: Labeled>(
        &self,
        probe: &Embedding,
        gallery: &'a [T],
    ) -> Option<Nearest<'a, T>>;
}

/// Accepts the nearest entry when it lies within `max_distance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub max_distance: f32,
}

impl Matcher for EuclideanMatcher {
    fn identify<'a, T: Labeled>(
        &self,
        probe: &Embedding,
        gallery: &'a [T],
    ) -> Option<Nearest<'a, T>> {
        nearest(probe, gallery).filter(|n| n.distance <= self.max_distance)
    }
}
