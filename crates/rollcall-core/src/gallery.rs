//! Enrollment gallery — per-identity embedding sets with a fixed
//! dimensionality, built once from the identity store and replaced
//! atomically on reload.

use crate::pipeline::{EmbeddingExtractor, FaceDetector};
use crate::types::{Embedding, Identity, ImageData};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("embedding dimension mismatch for '{name}': expected {expected}, got {found}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate identity id {0}")]
    DuplicateIdentity(i64),
    #[error("identity store failure: {0}")]
    Store(String),
    #[error("enrollment sample '{reference}' for '{name}': {reason}")]
    Sample {
        name: String,
        reference: String,
        reason: String,
    },
}

/// Read side of the persistent identity store, consumed once per gallery
/// build. Implementations live outside the core.
pub trait IdentityStore {
    /// Every known identity with references to its enrollment images.
    fn list_identities(&self) -> Result<Vec<(Identity, Vec<String>)>, LoadError>;

    /// Load one enrollment image by reference.
    fn load_image(&self, reference: &str) -> Result<ImageData, LoadError>;
}

/// One identity together with its enrollment embeddings.
///
/// For any entry reachable through a loaded [`Gallery`], `embeddings` is
/// non-empty: identities without samples are excluded at load time.
#[derive(Debug, Clone)]
pub struct EnrolledIdentity {
    identity: Identity,
    embeddings: Vec<Embedding>,
}

impl EnrolledIdentity {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }
}

/// The full set of enrolled identities and their reference embeddings.
///
/// Read-only after load; a reload builds a fresh `Gallery` and swaps it in
/// through [`GalleryHandle`].
#[derive(Debug, Clone)]
pub struct Gallery {
    entries: Vec<EnrolledIdentity>,
    excluded: Vec<Identity>,
    dim: Option<usize>,
}

impl Gallery {
    /// Validate and assemble a gallery.
    ///
    /// The first embedding observed fixes the gallery dimensionality; any
    /// later disagreement is a hard error. Identities with zero embeddings
    /// are excluded from matching but retained on [`Gallery::excluded`] for
    /// reporting.
    pub fn load(entries: Vec<(Identity, Vec<Embedding>)>) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        let mut loaded = Vec::with_capacity(entries.len());
        let mut excluded = Vec::new();
        let mut dim: Option<usize> = None;

        for (identity, embeddings) in entries {
            if !seen.insert(identity.id) {
                return Err(LoadError::DuplicateIdentity(identity.id));
            }

            if embeddings.is_empty() {
                tracing::warn!(
                    id = identity.id,
                    name = %identity.name,
                    "identity has no enrollment samples; excluded from matching"
                );
                excluded.push(identity);
                continue;
            }

            for embedding in &embeddings {
                let expected = *dim.get_or_insert(embedding.dim());
                if embedding.dim() != expected {
                    return Err(LoadError::DimensionMismatch {
                        name: identity.name.clone(),
                        expected,
                        found: embedding.dim(),
                    });
                }
            }

            loaded.push(EnrolledIdentity {
                identity,
                embeddings,
            });
        }

        Ok(Self {
            entries: loaded,
            excluded,
            dim,
        })
    }

    /// Gallery dimensionality; `None` when no embeddings are loaded.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn entries(&self) -> &[EnrolledIdentity] {
        &self.entries
    }

    /// Enrollment embeddings for one identity. Non-empty whenever `Some`.
    pub fn embeddings_of(&self, id: i64) -> Option<&[Embedding]> {
        self.entries
            .iter()
            .find(|e| e.identity.id == id)
            .map(|e| e.embeddings.as_slice())
    }

    /// Identities present in the store but excluded from matching for lack
    /// of enrollment samples.
    pub fn excluded(&self) -> &[Identity] {
        &self.excluded
    }

    pub fn identity_count(&self) -> usize {
        self.entries.len()
    }

    pub fn sample_count(&self) -> usize {
        self.entries.iter().map(|e| e.embeddings.len()).sum()
    }
}

/// Build a gallery from the identity store: load every enrollment image,
/// detect the face, extract its embedding. However many samples the store
/// returns per identity, all of them are enrolled.
///
/// Any missing image, undetectable face, or failed extraction is fatal to
/// the build; gallery construction failures surface at startup, never at
/// match time.
pub fn build_gallery(
    store: &dyn IdentityStore,
    detector: &mut dyn FaceDetector,
    extractor: &mut dyn EmbeddingExtractor,
) -> Result<Gallery, LoadError> {
    let identities = store.list_identities()?;
    let mut entries = Vec::with_capacity(identities.len());

    for (identity, references) in identities {
        let mut embeddings = Vec::with_capacity(references.len());

        for reference in &references {
            let image = store.load_image(reference)?;

            let regions = detector.detect(&image).map_err(|e| LoadError::Sample {
                name: identity.name.clone(),
                reference: reference.clone(),
                reason: e.to_string(),
            })?;

            // Detectors return regions sorted by confidence; enroll the best.
            let face = regions.first().ok_or_else(|| LoadError::Sample {
                name: identity.name.clone(),
                reference: reference.clone(),
                reason: "no face detected".into(),
            })?;

            let embedding =
                extractor
                    .extract(&image, face)
                    .map_err(|e| LoadError::Sample {
                        name: identity.name.clone(),
                        reference: reference.clone(),
                        reason: e.to_string(),
                    })?;
            embeddings.push(embedding);
        }

        entries.push((identity, embeddings));
    }

    let gallery = Gallery::load(entries)?;
    tracing::info!(
        identities = gallery.identity_count(),
        samples = gallery.sample_count(),
        excluded = gallery.excluded().len(),
        dim = ?gallery.dim(),
        "gallery built"
    );
    Ok(gallery)
}

/// Shared, atomically replaceable gallery reference.
///
/// Matching passes take an `Arc<Gallery>` snapshot and keep using it for
/// the whole pass; [`GalleryHandle::replace`] swaps the entire gallery so
/// an in-flight pass never observes a partial reload.
pub struct GalleryHandle {
    inner: RwLock<Arc<Gallery>>,
}

impl GalleryHandle {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            inner: RwLock::new(Arc::new(gallery)),
        }
    }

    pub fn snapshot(&self) -> Arc<Gallery> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, gallery: Gallery) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(gallery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DetectError, ExtractError};
    use crate::types::FaceRegion;
    use std::collections::HashMap;

    fn identity(id: i64, name: &str) -> Identity {
        Identity {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_load_fixes_dimensionality() {
        let gallery = Gallery::load(vec![
            (identity(1, "ada"), vec![Embedding::new(vec![0.0; 128])]),
            (
                identity(2, "grace"),
                vec![
                    Embedding::new(vec![1.0; 128]),
                    Embedding::new(vec![2.0; 128]),
                ],
            ),
        ])
        .unwrap();

        assert_eq!(gallery.dim(), Some(128));
        assert_eq!(gallery.identity_count(), 2);
        assert_eq!(gallery.sample_count(), 3);
        assert_eq!(gallery.embeddings_of(2).unwrap().len(), 2);
    }

    #[test]
    fn test_load_rejects_mixed_dimensionality() {
        let result = Gallery::load(vec![
            (identity(1, "ada"), vec![Embedding::new(vec![0.0; 128])]),
            (identity(2, "grace"), vec![Embedding::new(vec![0.0; 64])]),
        ]);

        match result {
            Err(LoadError::DimensionMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 128);
                assert_eq!(found, 64);
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_mixed_dimensionality_within_identity() {
        let result = Gallery::load(vec![(
            identity(1, "ada"),
            vec![
                Embedding::new(vec![0.0; 128]),
                Embedding::new(vec![0.0; 64]),
            ],
        )]);
        assert!(matches!(
            result,
            Err(LoadError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let result = Gallery::load(vec![
            (identity(7, "ada"), vec![Embedding::new(vec![0.0; 4])]),
            (identity(7, "ada again"), vec![Embedding::new(vec![1.0; 4])]),
        ]);
        assert!(matches!(result, Err(LoadError::DuplicateIdentity(7))));
    }

    #[test]
    fn test_empty_identity_is_excluded_not_fatal() {
        let gallery = Gallery::load(vec![
            (identity(1, "ada"), vec![Embedding::new(vec![0.0; 16])]),
            (identity(2, "ghost"), vec![]),
        ])
        .unwrap();

        assert_eq!(gallery.identity_count(), 1);
        assert_eq!(gallery.excluded().len(), 1);
        assert_eq!(gallery.excluded()[0].id, 2);
        assert!(gallery.embeddings_of(2).is_none());
    }

    #[test]
    fn test_empty_gallery() {
        let gallery = Gallery::load(vec![]).unwrap();
        assert_eq!(gallery.dim(), None);
        assert_eq!(gallery.identity_count(), 0);
    }

    #[test]
    fn test_handle_replace_is_whole_gallery_swap() {
        let handle = GalleryHandle::new(
            Gallery::load(vec![(
                identity(1, "ada"),
                vec![Embedding::new(vec![0.0; 8])],
            )])
            .unwrap(),
        );

        let before = handle.snapshot();
        handle.replace(
            Gallery::load(vec![
                (identity(1, "ada"), vec![Embedding::new(vec![0.0; 8])]),
                (identity(2, "grace"), vec![Embedding::new(vec![1.0; 8])]),
            ])
            .unwrap(),
        );
        let after = handle.snapshot();

        // The pre-reload snapshot is still intact; no in-place mutation.
        assert_eq!(before.identity_count(), 1);
        assert_eq!(after.identity_count(), 2);
    }

    // --- build_gallery against fake collaborators ---

    struct FakeIdentityStore {
        identities: Vec<(Identity, Vec<String>)>,
        images: HashMap<String, ImageData>,
    }

    impl IdentityStore for FakeIdentityStore {
        fn list_identities(&self) -> Result<Vec<(Identity, Vec<String>)>, LoadError> {
            Ok(self.identities.clone())
        }

        fn load_image(&self, reference: &str) -> Result<ImageData, LoadError> {
            self.images
                .get(reference)
                .cloned()
                .ok_or_else(|| LoadError::Store(format!("missing image: {reference}")))
        }
    }

    struct WholeFrameDetector;

    impl FaceDetector for WholeFrameDetector {
        fn detect(&mut self, image: &ImageData) -> Result<Vec<FaceRegion>, DetectError> {
            Ok(vec![FaceRegion {
                x: 0.0,
                y: 0.0,
                width: image.width as f32,
                height: image.height as f32,
                confidence: 1.0,
            }])
        }
    }

    /// Embeds the first pixel value into a fixed-length vector.
    struct PixelExtractor;

    impl EmbeddingExtractor for PixelExtractor {
        fn extract(
            &mut self,
            image: &ImageData,
            _region: &FaceRegion,
        ) -> Result<Embedding, ExtractError> {
            let v = image.data.first().copied().unwrap_or(0) as f32;
            Ok(Embedding::new(vec![v; 4]))
        }
    }

    fn one_pixel_image(value: u8) -> ImageData {
        ImageData {
            data: vec![value],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn test_build_gallery_enrolls_every_store_sample() {
        let store = FakeIdentityStore {
            identities: vec![
                (
                    identity(1, "ada"),
                    vec!["a1".to_string(), "a2".to_string()],
                ),
                (identity(2, "grace"), vec!["g1".to_string()]),
            ],
            images: HashMap::from([
                ("a1".to_string(), one_pixel_image(10)),
                ("a2".to_string(), one_pixel_image(11)),
                ("g1".to_string(), one_pixel_image(20)),
            ]),
        };

        let gallery =
            build_gallery(&store, &mut WholeFrameDetector, &mut PixelExtractor).unwrap();

        assert_eq!(gallery.identity_count(), 2);
        // Two samples for ada, one for grace: whatever the store returned.
        assert_eq!(gallery.embeddings_of(1).unwrap().len(), 2);
        assert_eq!(gallery.embeddings_of(2).unwrap().len(), 1);
    }

    #[test]
    fn test_build_gallery_fails_on_missing_image() {
        let store = FakeIdentityStore {
            identities: vec![(identity(1, "ada"), vec!["gone".to_string()])],
            images: HashMap::new(),
        };

        let result = build_gallery(&store, &mut WholeFrameDetector, &mut PixelExtractor);
        assert!(matches!(result, Err(LoadError::Store(_))));
    }

    #[test]
    fn test_build_gallery_fails_when_no_face_in_sample() {
        struct NoFaceDetector;
        impl FaceDetector for NoFaceDetector {
            fn detect(&mut self, _image: &ImageData) -> Result<Vec<FaceRegion>, DetectError> {
                Ok(vec![])
            }
        }

        let store = FakeIdentityStore {
            identities: vec![(identity(1, "ada"), vec!["a1".to_string()])],
            images: HashMap::from([("a1".to_string(), one_pixel_image(10))]),
        };

        let result = build_gallery(&store, &mut NoFaceDetector, &mut PixelExtractor);
        assert!(matches!(result, Err(LoadError::Sample { .. })));
    }
}
