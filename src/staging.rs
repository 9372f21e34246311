// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The staging buffer: the most recent frame, in CPU memory.

The buffer is written by the producer thread and read by whichever threads refresh textures.  One
mutex guards both the bytes and the dirty flag.  It is held only for the duration of a copy in or out,
never across a GPU map.

The frame index is written under the same mutex but mirrored into an atomic, since the evaluation tick
only publishes it and a torn read there is harmless.

Every write bumps a generation counter.  A reader that copied a frame out gets a [FrameStamp] for it, and
the dirty flag can only be cleared with the stamp of the frame that is still current.  A frame that lands
between a copy and the clear therefore stays dirty.
*/

use crate::config::FrameConfig;
use crate::pixel_formats::PixelFormat;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use wasm_safe_mutex::Mutex;

/// The frame index before any frame has landed.
pub const NO_FRAME: i64 = -1;

#[derive(Debug)]
struct StagingState {
    bytes: Box<[u8]>,
    /// At least one context has not seen `bytes` yet.
    dirty: bool,
    /// Bumped by every write.
    generation: u64,
    frame_index: i64,
}

/// Identifies the frame a [StagingBuffer::read_frame_with] call saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStamp {
    generation: u64,
    /// The producer's index for the frame that was read.
    pub frame_index: i64,
}

/// A fixed-size buffer holding the latest frame.
#[derive(Debug)]
pub struct StagingBuffer<Format> {
    state: Mutex<StagingState>,
    frame_index: AtomicI64,
    width: u16,
    height: u16,
    format: PhantomData<Format>,
}

impl<Format: PixelFormat> StagingBuffer<Format> {
    /// Allocates a zeroed buffer for frames of `config`'s size.  The length never changes afterwards.
    pub fn new(config: &FrameConfig<'_>) -> Self {
        let len = config.byte_len::<Format>();
        StagingBuffer {
            state: Mutex::new(StagingState {
                bytes: vec![0u8; len].into_boxed_slice(),
                dirty: false,
                generation: 0,
                frame_index: NO_FRAME,
            }),
            frame_index: AtomicI64::new(NO_FRAME),
            width: config.width,
            height: config.height,
            format: PhantomData,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Bytes in one row.  Rows in the staging buffer are never padded.
    pub fn tight_stride(&self) -> usize {
        self.width as usize * Format::BYTES_PER_PIXEL as usize
    }

    pub fn byte_len(&self) -> usize {
        self.tight_stride() * self.height as usize
    }

    /**
    Overwrites the whole buffer.

    `fill` receives every byte of the buffer and must overwrite all of it.  Afterwards the buffer is
    marked dirty and `frame_index` is published.
    */
    pub fn write_frame<F: FnOnce(&mut [u8])>(&self, frame_index: i64, fill: F) {
        let mut state = self.state.lock_sync();
        fill(&mut state.bytes);
        state.dirty = true;
        state.generation = state.generation.wrapping_add(1);
        state.frame_index = frame_index;
        self.frame_index.store(frame_index, Ordering::Relaxed);
    }

    /// Runs `read` with the buffer locked.
    pub fn read_with<R, F: FnOnce(&[u8]) -> R>(&self, read: F) -> R {
        let state = self.state.lock_sync();
        read(&state.bytes)
    }

    /// Runs `read` with the buffer locked and stamps the frame it saw.
    pub fn read_frame_with<R, F: FnOnce(&[u8]) -> R>(&self, read: F) -> (R, FrameStamp) {
        let state = self.state.lock_sync();
        let stamp = FrameStamp {
            generation: state.generation,
            frame_index: state.frame_index,
        };
        (read(&state.bytes), stamp)
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock_sync().dirty
    }

    /**
    Marks the frame identified by `stamp` as uploaded.

    Does nothing and returns `false` if another frame was written since `stamp` was taken.
    */
    pub fn clear_dirty_if(&self, stamp: FrameStamp) -> bool {
        let mut state = self.state.lock_sync();
        if state.generation != stamp.generation {
            return false;
        }
        state.dirty = false;
        true
    }

    /// The index of the last frame written, or [NO_FRAME].
    pub fn frame_index(&self) -> i64 {
        self.frame_index.load(Ordering::Relaxed)
    }
}
