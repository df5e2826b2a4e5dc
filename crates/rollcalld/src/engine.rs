use rollcall_core::gallery::{build_gallery, GalleryHandle, IdentityStore, LoadError};
use rollcall_core::matcher::{DistanceMetric, Matcher};
use rollcall_core::pipeline::{process_image, DetectError, EmbeddingExtractor, FaceDetector, FaceReport};
use rollcall_core::policy::ResolutionPolicy;
use rollcall_core::recorder::{AttendanceRecorder, AttendanceStore, RecorderConfig, SystemClock};
use rollcall_core::types::ImageData;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gallery load failed: {0}")]
    Load(#[from] LoadError),
    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Matching and recording parameters handed to the engine at spawn.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub metric: DistanceMetric,
    pub threshold: f32,
    pub default_status: String,
    pub dedup_window: Option<Duration>,
}

/// What a gallery build or reload produced.
#[derive(Debug, Clone)]
pub struct GallerySummary {
    pub identities: usize,
    pub samples: usize,
    pub excluded: usize,
    pub dim: Option<usize>,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Process {
        image: ImageData,
        reply: oneshot::Sender<Result<Vec<FaceReport>, EngineError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<GallerySummary, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Process one captured image: detect, match, resolve, record.
    pub async fn process(&self, image: ImageData) -> Result<Vec<FaceReport>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Process {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Rebuild the gallery from the identity store and swap it in whole.
    pub async fn reload(&self) -> Result<GallerySummary, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reload { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Builds the gallery synchronously before accepting any request, so a
/// broken enrollment set fails the spawn rather than the first match.
pub fn spawn_engine<I, S>(
    mut detector: Box<dyn FaceDetector + Send>,
    mut extractor: Box<dyn EmbeddingExtractor + Send>,
    identity_store: I,
    attendance_store: S,
    config: EngineConfig,
) -> Result<EngineHandle, EngineError>
where
    I: IdentityStore + Send + 'static,
    S: AttendanceStore + Send + 'static,
{
    let gallery = build_gallery(&identity_store, detector.as_mut(), extractor.as_mut())?;
    let gallery = GalleryHandle::new(gallery);

    let matcher = Matcher::new(config.metric, config.threshold);
    let policy = ResolutionPolicy::default();
    let recorder = AttendanceRecorder::new(
        attendance_store,
        SystemClock,
        RecorderConfig {
            default_status: config.default_status.clone(),
            dedup_window: config.dedup_window,
        },
    );
    tracing::info!(
        metric = ?config.metric,
        threshold = config.threshold,
        dedup_window = ?config.dedup_window,
        "engine configured"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Process { image, reply } => {
                        let snapshot = gallery.snapshot();
                        let result = process_image(
                            &image,
                            detector.as_mut(),
                            extractor.as_mut(),
                            &snapshot,
                            &matcher,
                            &policy,
                            &recorder,
                        )
                        .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let result =
                            build_gallery(&identity_store, detector.as_mut(), extractor.as_mut())
                                .map(|fresh| {
                                    let summary = GallerySummary {
                                        identities: fresh.identity_count(),
                                        samples: fresh.sample_count(),
                                        excluded: fresh.excluded().len(),
                                        dim: fresh.dim(),
                                    };
                                    gallery.replace(fresh);
                                    summary
                                })
                                .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}
