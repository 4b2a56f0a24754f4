//! QR codes for short links
//!
//! The creation path queues `(hash, short_url)` jobs. The generation worker
//! encodes one job per tick and caches the image by hash.

use bytes::Bytes;
use dashmap::DashMap;
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, Permit, Receiver, Sender};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::database::Registry;
use crate::error::{AppError, Result};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Renders text into an image.
pub trait QrEncoder: Send + Sync {
    fn encode(&self, text: &str) -> std::result::Result<Bytes, EncodeError>;
}

/// Grayscale PNG renderer
pub struct PngQrEncoder {
    min_size: u32,
}

impl PngQrEncoder {
    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new(200)
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, text: &str) -> std::result::Result<Bytes, EncodeError> {
        let code = QrCode::new(text.as_bytes())?;
        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();

        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;
        Ok(Bytes::from(png.into_inner()))
    }
}

/// A pending QR generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrJob {
    pub hash: String,
    pub url: String,
}

/// Shared QR state: the image cache, the job queue and the encoder
#[derive(Clone)]
pub struct QrService {
    cache: Arc<DashMap<String, Bytes>>,
    tx: Sender<QrJob>,
    rx: Arc<Mutex<Receiver<QrJob>>>,
    registry: Registry,
    encoder: Arc<dyn QrEncoder>,
}

impl QrService {
    pub fn new(registry: Registry, encoder: Arc<dyn QrEncoder>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            cache: Arc::new(DashMap::new()),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            registry,
            encoder,
        }
    }

    /// Waits for room in the job queue and holds it until the permit sends
    /// a job or is dropped. `None` once the queue is closed.
    pub async fn reserve(&self) -> Option<Permit<'_, QrJob>> {
        match self.tx.reserve().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("QR queue closed");
                None
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Generates at most one queued QR code. Returns the hash of the job taken.
    pub async fn generate_next(&self) -> Option<String> {
        let job = {
            let mut rx = self.rx.lock().await;
            rx.try_recv().ok()?
        };

        match self.registry.find_by_key(&job.hash) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("QR job for {} dropped, link is gone", job.hash);
                return Some(job.hash);
            }
            Err(e) => {
                warn!("QR job for {} dropped: {}", job.hash, e);
                return Some(job.hash);
            }
        }

        match self.encoder.encode(&job.url) {
            Ok(image) => {
                debug!("QR generated for {}", job.hash);
                self.cache.insert(job.hash.clone(), image);
            }
            Err(e) => warn!("QR generation for {} failed: {}", job.hash, e),
        }
        Some(job.hash)
    }

    /// Returns the cached QR image of `hash`.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no link has this hash
    /// - `NotYetAvailable` when the link has no QR requested or the worker
    ///   has not produced it yet
    pub fn get_qr(&self, hash: &str) -> Result<Bytes> {
        let link = self
            .registry
            .find_by_key(hash)?
            .ok_or_else(|| AppError::NotFound(hash.to_string()))?;

        let not_yet = || AppError::NotYetAvailable {
            hash: hash.to_string(),
            what: "QR",
        };

        if !link.qr {
            return Err(not_yet());
        }

        self.cache.get(hash).map(|image| image.value().clone()).ok_or_else(not_yet)
    }
}
