// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Frame ingestion: producer notifications into the staging buffer.

[FrameIngestor::on_frame_ready] runs on the producer's thread.  It copies the whole payload under the
staging mutex, raises the dirty flag and publishes the frame index.  Anything that doesn't look like a
frame of the agreed size is dropped without touching any state.
*/

use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::producer::{ColorFrame, FrameProducer, ObserverToken};
use crate::staging::StagingBuffer;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wasm_safe_mutex::Mutex;

//std's Instant panics on wasm
#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;
#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;

#[derive(Debug)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
    last_frame_at: Mutex<Option<Instant>>,
}

/// Telemetry about delivered frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestStats {
    /// Frames copied into the staging buffer.
    pub frames_received: u64,
    /// Notifications without a usable frame.
    pub frames_dropped: u64,
    /// When the last frame was copied.
    pub last_frame_at: Option<Instant>,
}

/// Copies frames from a producer into a [StagingBuffer].  Cheap to clone; clones share everything.
#[derive(Debug)]
pub struct FrameIngestor<Format> {
    staging: Arc<StagingBuffer<Format>>,
    counters: Arc<Counters>,
}

impl<Format> Clone for FrameIngestor<Format> {
    fn clone(&self) -> Self {
        FrameIngestor {
            staging: self.staging.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<Format: PixelFormat> FrameIngestor<Format> {
    pub fn new(staging: Arc<StagingBuffer<Format>>) -> Self {
        FrameIngestor {
            staging,
            counters: Arc::new(Counters {
                received: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                last_frame_at: Mutex::new(None),
            }),
        }
    }

    pub fn staging(&self) -> &Arc<StagingBuffer<Format>> {
        &self.staging
    }

    /**
    Handles one frame-ready notification.

    Returns the frame index on success.  On [Error::InvalidFrame] nothing was mutated.  The frame handle
    is not retained past this call.
    */
    pub fn on_frame_ready(&self, frame: Option<&dyn ColorFrame>) -> Result<i64, Error> {
        let expected = self.staging.byte_len();
        let frame = match frame {
            Some(frame) if frame.byte_len() == expected => frame,
            other => {
                let actual = other.map(|f| f.byte_len()).unwrap_or(0);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                logwise::warn_sync!(
                    "dropping frame: {actual} bytes, expected {expected}",
                    actual = actual,
                    expected = expected
                );
                return Err(Error::InvalidFrame { expected, actual });
            }
        };
        let frame_index = frame.frame_number();
        self.staging
            .write_frame(frame_index, |bytes| frame.copy_pixel_data_to(bytes));
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        *self.counters.last_frame_at.lock_sync() = Some(Instant::now());
        logwise::trace_sync!(
            "ingested frame {index}",
            index = logwise::privacy::LogIt(&frame_index)
        );
        Ok(frame_index)
    }

    /**
    Registers this ingestor with `producer`.

    The returned [Subscription] keeps the registration alive; dropping it unsubscribes.
    */
    pub fn subscribe(&self, producer: Arc<dyn FrameProducer>) -> Subscription {
        let ingestor = self.clone();
        let token = producer.add_frame_ready(Arc::new(move |frame: Option<&dyn ColorFrame>| {
            //errors were already logged; the producer has no use for them
            let _ = ingestor.on_frame_ready(frame);
        }));
        logwise::info_sync!(
            "subscribed to producer, token {token}",
            token = logwise::privacy::LogIt(&token)
        );
        Subscription { producer, token }
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
            last_frame_at: *self.counters.last_frame_at.lock_sync(),
        }
    }
}

/// A live registration with a producer.  Unsubscribes on drop.
pub struct Subscription {
    producer: Arc<dyn FrameProducer>,
    token: ObserverToken,
}

impl Subscription {
    pub fn producer(&self) -> &Arc<dyn FrameProducer> {
        &self.producer
    }

    /// Whether this subscription is with `producer` (by identity).
    pub fn is_with(&self, producer: &Arc<dyn FrameProducer>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.producer), Arc::as_ptr(producer))
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.producer.remove_frame_ready(self.token);
        logwise::info_sync!(
            "unsubscribed from producer, token {token}",
            token = logwise::privacy::LogIt(&self.token)
        );
    }
}
