//! rollcall-core — Identity matching and attendance recording engine.
//!
//! Compares face embeddings from captured images against a gallery of
//! enrolled identities and records a timestamped attendance event for each
//! confident match. Face detection, embedding extraction, and persistence
//! are consumed through collaborator traits; implementations are injected
//! by the daemon and replaced with fakes in tests.

pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod policy;
pub mod recorder;
pub mod types;

pub use gallery::{build_gallery, Gallery, GalleryHandle, IdentityStore, LoadError};
pub use matcher::{DimensionMismatch, DistanceMetric, MatchCandidate, Matcher, DEFAULT_THRESHOLD};
pub use pipeline::{
    process_image, DetectError, EmbeddingExtractor, ExtractError, FaceDetector, FaceError,
    FaceReport,
};
pub use policy::{MatchOutcome, ResolutionPolicy, SelectionRule};
pub use recorder::{
    AttendanceEvent, AttendanceRecorder, AttendanceStore, Clock, RecordError, RecorderConfig,
    SystemClock, DEFAULT_STATUS,
};
pub use types::{Embedding, FaceRegion, Identity, ImageData};
