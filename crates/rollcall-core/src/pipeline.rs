//! Single-image processing pass: detect faces, extract embeddings, match
//! against the gallery, resolve, record. One face's failure never aborts
//! the remaining faces in the same image.

use crate::gallery::Gallery;
use crate::matcher::{DimensionMismatch, Matcher};
use crate::policy::{MatchOutcome, ResolutionPolicy};
use crate::recorder::{AttendanceEvent, AttendanceRecorder, AttendanceStore, Clock, RecordError};
use crate::types::{Embedding, FaceRegion, ImageData};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("face detection failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("degenerate face region ({width:.0}x{height:.0})")]
    DegenerateRegion { width: f32, height: f32 },
    #[error("embedding extraction failed: {0}")]
    Backend(String),
}

/// Locates face regions in an image, best region first.
///
/// Zero regions is a normal outcome, not an error; `detect` fails only
/// when the underlying model cannot run at all.
pub trait FaceDetector {
    fn detect(&mut self, image: &ImageData) -> Result<Vec<FaceRegion>, DetectError>;
}

/// Maps one detected face region to a fixed-length embedding vector.
/// Fails on a degenerate (zero-area) region or when alignment cannot
/// proceed.
pub trait EmbeddingExtractor {
    fn extract(
        &mut self,
        image: &ImageData,
        region: &FaceRegion,
    ) -> Result<Embedding, ExtractError>;
}

/// Why one face's processing stopped early. Scoped to that face.
#[derive(Error, Debug)]
pub enum FaceError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Mismatch(#[from] DimensionMismatch),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Per-face result of one processing pass.
#[derive(Debug)]
pub struct FaceReport {
    pub region: FaceRegion,
    /// `None` when extraction or matching failed before a decision.
    pub outcome: Option<MatchOutcome>,
    /// The durable event, when one was written.
    pub event: Option<AttendanceEvent>,
    pub error: Option<FaceError>,
}

/// Process one captured image end to end.
///
/// Fails as a whole only when the detector itself fails; everything after
/// detection is isolated per face.
pub fn process_image<S: AttendanceStore, C: Clock>(
    image: &ImageData,
    detector: &mut dyn FaceDetector,
    extractor: &mut dyn EmbeddingExtractor,
    gallery: &Gallery,
    matcher: &Matcher,
    policy: &ResolutionPolicy,
    recorder: &AttendanceRecorder<S, C>,
) -> Result<Vec<FaceReport>, DetectError> {
    let regions = detector.detect(image)?;
    tracing::debug!(faces = regions.len(), "detection complete");

    let mut reports = Vec::with_capacity(regions.len());
    for region in regions {
        reports.push(process_face(
            image, region, extractor, gallery, matcher, policy, recorder,
        ));
    }
    Ok(reports)
}

fn process_face<S: AttendanceStore, C: Clock>(
    image: &ImageData,
    region: FaceRegion,
    extractor: &mut dyn EmbeddingExtractor,
    gallery: &Gallery,
    matcher: &Matcher,
    policy: &ResolutionPolicy,
    recorder: &AttendanceRecorder<S, C>,
) -> FaceReport {
    let embedding = match extractor.extract(image, &region) {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!(error = %e, "skipping face: extraction failed");
            return FaceReport {
                region,
                outcome: None,
                event: None,
                error: Some(e.into()),
            };
        }
    };

    let candidates = match matcher.candidates(&embedding, gallery) {
        Ok(candidates) => candidates,
        Err(e) => {
            // A mismatched query dimension means the wrong extractor
            // model for the enrolled gallery. Log loudly, abort this
            // face only.
            tracing::error!(error = %e, "embedding dimension mismatch; face aborted");
            return FaceReport {
                region,
                outcome: None,
                event: None,
                error: Some(e.into()),
            };
        }
    };

    let outcome = policy.resolve(&candidates);

    match recorder.record(&outcome, None) {
        Ok(event) => FaceReport {
            region,
            outcome: Some(outcome),
            event,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "attendance write failed");
            FaceReport {
                region,
                outcome: Some(outcome),
                event: None,
                error: Some(e.into()),
            }
        }
    }
}
