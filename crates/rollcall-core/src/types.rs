use serde::{Deserialize, Serialize};

/// A known person enrolled for attendance.
///
/// Immutable once enrolled; only the enrollment sample set may grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub name: String,
}

/// Grayscale image buffer exchanged with the detector and extractor.
#[derive(Clone)]
pub struct ImageData {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Bounding box for one detected face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    /// A region with no area cannot be aligned or embedded.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Face embedding vector. Dimensionality is fixed by the extraction model
/// and must agree across the whole system; the gallery enforces this at
/// load time and the matcher re-checks every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_region() {
        let mut region = FaceRegion {
            x: 10.0,
            y: 10.0,
            width: 40.0,
            height: 40.0,
            confidence: 0.9,
        };
        assert!(!region.is_degenerate());

        region.width = 0.0;
        assert!(region.is_degenerate());

        region.width = 40.0;
        region.height = -1.0;
        assert!(region.is_degenerate());
    }

    #[test]
    fn test_embedding_dim() {
        assert_eq!(Embedding::new(vec![0.0; 128]).dim(), 128);
        assert_eq!(Embedding::new(vec![]).dim(), 0);
    }
}
