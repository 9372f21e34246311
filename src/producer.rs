// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Frame producers.

A producer is the sensor runtime: something that, on its own thread, announces "a frame is ready" to
whoever is listening.  The announcement may or may not carry a frame (sensors hand out empty handles
when a frame was already consumed, or during shutdown).

The frame handle is only valid for the duration of the notification.  Observers copy what they need and
let go; the producer disposes the handle afterwards.
*/

use crate::pixel_formats::{PixelFormat, pixel_as_bytes};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use wasm_safe_mutex::Mutex;

/// One frame, borrowed from the producer for the duration of a notification.
pub trait ColorFrame {
    /// The producer's own frame counter.
    fn frame_number(&self) -> i64;
    /// Length of the pixel payload in bytes.
    fn byte_len(&self) -> usize;
    /// Copies the pixel payload into `destination`, which is exactly [Self::byte_len] bytes.
    fn copy_pixel_data_to(&self, destination: &mut [u8]);
}

/// Callback invoked on the producer's thread for every frame-ready notification.
pub type FrameObserver = Arc<dyn Fn(Option<&dyn ColorFrame>) + Send + Sync>;

/// Identifies one registered observer so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

impl ObserverToken {
    pub const fn new(raw: u64) -> Self {
        ObserverToken(raw)
    }
}

/// Something that emits frame-ready notifications.
pub trait FrameProducer: Send + Sync {
    fn add_frame_ready(&self, observer: FrameObserver) -> ObserverToken;
    /// Removing a token that is not registered does nothing.
    fn remove_frame_ready(&self, token: ObserverToken);
}

/**
An in-process producer.

Frames are delivered synchronously, on whatever thread calls [Self::deliver].  Observers are invoked
outside the observer lock, so an observer may add or remove observers without deadlocking.
*/
pub struct LoopbackProducer {
    observers: Mutex<Vec<(ObserverToken, FrameObserver)>>,
    next_token: AtomicU64,
}

impl Debug for LoopbackProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackProducer")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Default for LoopbackProducer {
    fn default() -> Self {
        Self::new()
    }
}

struct LoopbackFrame<'a> {
    number: i64,
    bytes: &'a [u8],
}

impl ColorFrame for LoopbackFrame<'_> {
    fn frame_number(&self) -> i64 {
        self.number
    }
    fn byte_len(&self) -> usize {
        self.bytes.len()
    }
    fn copy_pixel_data_to(&self, destination: &mut [u8]) {
        destination.copy_from_slice(self.bytes);
    }
}

impl LoopbackProducer {
    pub fn new() -> Self {
        LoopbackProducer {
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock_sync().len()
    }

    /// Notifies every observer of a frame with the given raw payload.
    pub fn deliver(&self, frame_number: i64, bytes: &[u8]) {
        let frame = LoopbackFrame {
            number: frame_number,
            bytes,
        };
        self.notify(Some(&frame));
    }

    /// Notifies every observer of a frame made of `pixels`.
    pub fn deliver_pixels<Format: PixelFormat>(
        &self,
        frame_number: i64,
        pixels: &[Format::CPixel],
    ) {
        self.deliver(frame_number, pixel_as_bytes(pixels));
    }

    /// Notifies every observer without a frame, as sensors do when the frame was already gone.
    pub fn deliver_empty(&self) {
        self.notify(None);
    }

    fn notify(&self, frame: Option<&dyn ColorFrame>) {
        let observers: Vec<FrameObserver> = self
            .observers
            .lock_sync()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(frame);
        }
    }
}

impl FrameProducer for LoopbackProducer {
    fn add_frame_ready(&self, observer: FrameObserver) -> ObserverToken {
        let token = ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.observers.lock_sync().push((token, observer));
        token
    }

    fn remove_frame_ready(&self, token: ObserverToken) {
        self.observers.lock_sync().retain(|(t, _)| *t != token);
    }
}
