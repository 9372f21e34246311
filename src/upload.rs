// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Uploads from the staging buffer into one context's texture.

The staging buffer is tightly packed: `width * bytes_per_pixel` bytes per row.  A mapped texture is not.
Drivers pad rows to whatever alignment the hardware likes and report the result as the pitch.  A single
bulk copy is only correct when the two agree, so the copy goes row by row, advancing source and
destination by their own strides.

```text
staging   |row 0|row 1|row 2|
mapping   |row 0|pad|row 1|pad|row 2|pad|
```
*/

use crate::cache::ResourceCache;
use crate::context::{ContextId, ContextTexture, LockMode, RenderContext};
use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use crate::staging::{FrameStamp, StagingBuffer};
use std::fmt::Debug;
use std::sync::Arc;

/// Why [copy_rows] refused to copy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyError {
    #[error("row of {row_len} bytes does not fit in a stride of {stride}")]
    RowExceedsStride { row_len: usize, stride: usize },
    #[error("source holds {available} bytes but {required} are needed")]
    SourceTooShort { required: usize, available: usize },
    #[error("destination holds {available} bytes but {required} are needed")]
    DestinationTooShort { required: usize, available: usize },
    #[error("{row_count} rows of stride {stride} overflow the address space")]
    Overflow { stride: usize, row_count: usize },
}

/// Bytes spanned by `row_count` rows, where the last row is not padded out to `stride`.
fn required_len(stride: usize, row_len: usize, row_count: usize) -> Result<usize, CopyError> {
    (row_count - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(row_len))
        .ok_or(CopyError::Overflow { stride, row_count })
}

/**
Copies `row_count` rows of `row_len` bytes from `src` to `dst`.

Row `i` starts at `i * src_stride` in the source and `i * dst_stride` in the destination.  Bytes between
`row_len` and the stride are left untouched in the destination.

```
use frames_and_textures::upload::copy_rows;

let src = [1, 2, 3, 4];
let mut dst = [0; 6];
copy_rows(&src, 2, &mut dst, 3, 2, 2).unwrap();
assert_eq!(dst, [1, 2, 0, 3, 4, 0]);
```
*/
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_len: usize,
    row_count: usize,
) -> Result<(), CopyError> {
    if row_count == 0 || row_len == 0 {
        return Ok(());
    }
    if row_len > src_stride {
        return Err(CopyError::RowExceedsStride {
            row_len,
            stride: src_stride,
        });
    }
    if row_len > dst_stride {
        return Err(CopyError::RowExceedsStride {
            row_len,
            stride: dst_stride,
        });
    }
    let src_required = required_len(src_stride, row_len, row_count)?;
    if src.len() < src_required {
        return Err(CopyError::SourceTooShort {
            required: src_required,
            available: src.len(),
        });
    }
    let dst_required = required_len(dst_stride, row_len, row_count)?;
    if dst.len() < dst_required {
        return Err(CopyError::DestinationTooShort {
            required: dst_required,
            available: dst.len(),
        });
    }

    if src_stride == row_len && dst_stride == row_len {
        let len = row_len * row_count;
        dst[..len].copy_from_slice(&src[..len]);
        return Ok(());
    }
    for row in 0..row_count {
        let src_offset = row * src_stride;
        let dst_offset = row * dst_stride;
        dst[dst_offset..dst_offset + row_len]
            .copy_from_slice(&src[src_offset..src_offset + row_len]);
    }
    Ok(())
}

/**
A mapped mip level.

Unlocks when dropped, so every exit path releases the mapping.  Use [Self::unlock] on the success path
to observe unlock failures; the drop path can only log them.
*/
pub struct LockedRect<'t, T: ContextTexture> {
    texture: &'t mut T,
    level: u32,
    pitch: usize,
    released: bool,
}

impl<'t, T: ContextTexture> LockedRect<'t, T> {
    pub fn lock(texture: &'t mut T, level: u32, mode: LockMode) -> Result<Self, T::Error> {
        let pitch = texture.lock_rect(level, mode)?;
        Ok(LockedRect {
            texture,
            level,
            pitch,
            released: false,
        })
    }

    /// Bytes between row starts in the mapping.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn bytes(&mut self) -> &mut [u8] {
        self.texture.mapped_bytes()
    }

    pub fn unlock(mut self) -> Result<(), T::Error> {
        self.released = true;
        self.texture.unlock_rect(self.level)
    }
}

impl<T: ContextTexture> Drop for LockedRect<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.texture.unlock_rect(self.level) {
            logwise::error_sync!(
                "failed to unlock texture level {level} on the error path: {err}",
                level = self.level,
                err = logwise::privacy::LogIt(&err)
            );
        }
    }
}

impl<T: ContextTexture> Debug for LockedRect<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedRect")
            .field("level", &self.level)
            .field("pitch", &self.pitch)
            .finish()
    }
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No producer is bound; nothing was touched.
    Unbound,
    /// The dirty flag was clear.  The texture exists but was not written.
    Clean,
    /// The texture was destroyed while this refresh was running.
    Destroyed,
    /// The staging buffer was copied into the texture.
    Uploaded { frame_index: i64 },
}

/// Copies the staging buffer into per-context textures.
#[derive(Debug)]
pub struct UploadEngine<Format> {
    staging: Arc<StagingBuffer<Format>>,
}

impl<Format> Clone for UploadEngine<Format> {
    fn clone(&self) -> Self {
        UploadEngine {
            staging: self.staging.clone(),
        }
    }
}

impl<Format: PixelFormat> UploadEngine<Format> {
    pub fn new(staging: Arc<StagingBuffer<Format>>) -> Self {
        UploadEngine { staging }
    }

    /**
    Brings `context`'s texture up to date with the staging buffer.

    Call once per context per update tick.  The texture is created on first use even when nothing is
    dirty, so the context has something to sample.

    The dirty flag is shared by all contexts: the first successful upload after a delivery clears it, and
    contexts refreshed afterwards see [RefreshOutcome::Clean] until the next delivery.  A frame delivered
    while an upload is in flight keeps the flag set, so the next refresh picks it up.

    A failed lock, copy or unlock leaves the texture with its previous content and the dirty flag set,
    so the next tick tries again.
    */
    pub fn refresh<C: RenderContext>(
        &self,
        producer_bound: bool,
        cache: &ResourceCache<C, Format>,
        context: &C,
    ) -> Result<RefreshOutcome, Error> {
        if !producer_bound {
            return Ok(RefreshOutcome::Unbound);
        }
        let entry = cache.get_or_create(context)?;
        if !self.staging.is_dirty() {
            return Ok(RefreshOutcome::Clean);
        }

        let id = context.id();
        let mode = context.capability().lock_mode();
        let uploaded = entry.with_texture(|texture| self.upload_into(texture, mode, id));
        match uploaded {
            None => Ok(RefreshOutcome::Destroyed),
            Some(Err(err)) => {
                logwise::error_sync!(
                    "refresh of context {context} failed: {err}",
                    context = logwise::privacy::LogIt(&id),
                    err = logwise::privacy::LogIt(&err)
                );
                Err(err)
            }
            Some(Ok(stamp)) => {
                let frame_index = stamp.frame_index;
                if !self.staging.clear_dirty_if(stamp) {
                    logwise::trace_sync!(
                        "frame arrived during upload of {index}; staying dirty",
                        index = logwise::privacy::LogIt(&frame_index)
                    );
                }
                logwise::trace_sync!(
                    "uploaded frame {index} to context {context}",
                    index = logwise::privacy::LogIt(&frame_index),
                    context = logwise::privacy::LogIt(&id)
                );
                Ok(RefreshOutcome::Uploaded { frame_index })
            }
        }
    }

    fn upload_into<T: ContextTexture>(
        &self,
        texture: &mut T,
        mode: LockMode,
        context: ContextId,
    ) -> Result<FrameStamp, Error> {
        let _upload = logwise::perfwarn_begin!("upload_frame");
        //the staging lock is not held while mapping
        let mut locked =
            LockedRect::lock(texture, 0, mode).map_err(|e| Error::mapping(context, e))?;
        let pitch = locked.pitch();
        let tight_stride = self.staging.tight_stride();
        let height = self.staging.height() as usize;
        let (copied, stamp) = self.staging.read_frame_with(|src| {
            copy_rows(src, tight_stride, locked.bytes(), pitch, tight_stride, height)
        });
        copied.map_err(|e| Error::mapping(context, e))?;
        locked.unlock().map_err(|e| Error::mapping(context, e))?;
        Ok(stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::context::Capability;
    use crate::context::TextureDescriptor;
    use crate::imp::software::{SoftwareContext, SoftwareError};
    use crate::pixel_formats::BGRX8UNorm;

    const TINY: FrameConfig<'static> = FrameConfig {
        width: 3,
        height: 2,
        debug_name: "tiny",
    };

    struct Fixture {
        staging: Arc<StagingBuffer<BGRX8UNorm>>,
        engine: UploadEngine<BGRX8UNorm>,
        cache: ResourceCache<SoftwareContext, BGRX8UNorm>,
    }

    fn fixture() -> Fixture {
        let staging = Arc::new(StagingBuffer::new(&TINY));
        Fixture {
            engine: UploadEngine::new(staging.clone()),
            cache: ResourceCache::new(&TINY),
            staging,
        }
    }

    fn frame(seed: u8) -> Vec<u8> {
        (0..24u8).map(|i| i.wrapping_add(seed)).collect()
    }

    #[test]
    fn copy_rows_respects_both_strides() {
        let src = [1, 2, 3, 9, 4, 5, 6, 9];
        let mut dst = [0u8; 10];
        copy_rows(&src, 4, &mut dst, 5, 3, 2).unwrap();
        assert_eq!(dst, [1, 2, 3, 0, 0, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn copy_rows_validates_lengths() {
        let src = [0u8; 8];
        let mut dst = [0u8; 8];
        assert_eq!(
            copy_rows(&src, 4, &mut dst, 4, 5, 2),
            Err(CopyError::RowExceedsStride { row_len: 5, stride: 4 })
        );
        assert_eq!(
            copy_rows(&src, 4, &mut dst, 6, 4, 2),
            Err(CopyError::DestinationTooShort {
                required: 10,
                available: 8
            })
        );
        assert_eq!(
            copy_rows(&src, 4, &mut dst, 4, 4, 3),
            Err(CopyError::SourceTooShort {
                required: 12,
                available: 8
            })
        );
        //the last row needs no trailing padding
        let mut exact = [0u8; 10];
        assert!(copy_rows(&src, 4, &mut exact, 6, 4, 2).is_ok());
    }

    #[test]
    fn copy_rows_rejects_overflowing_strides() {
        let src = [0u8; 8];
        let mut dst = [0u8; 8];
        assert_eq!(
            copy_rows(&src, usize::MAX, &mut dst, 4, 4, 3),
            Err(CopyError::Overflow {
                stride: usize::MAX,
                row_count: 3
            })
        );
        assert_eq!(
            copy_rows(&src, 4, &mut dst, usize::MAX / 2 + 1, 4, 3),
            Err(CopyError::Overflow {
                stride: usize::MAX / 2 + 1,
                row_count: 3
            })
        );
    }

    #[test]
    fn copy_of_zero_rows_is_noop() {
        let mut dst = [7u8; 2];
        copy_rows(&[], 4, &mut dst, 4, 4, 0).unwrap();
        assert_eq!(dst, [7, 7]);
    }

    #[test]
    fn unbound_refresh_touches_nothing() {
        let f = fixture();
        let context = SoftwareContext::new(Capability::Standard);
        f.staging.write_frame(1, |b| b.copy_from_slice(&frame(1)));
        assert_eq!(
            f.engine.refresh(false, &f.cache, &context).unwrap(),
            RefreshOutcome::Unbound
        );
        assert!(f.cache.lookup(&context).is_none());
        assert!(f.staging.is_dirty());
    }

    #[test]
    fn clean_refresh_still_creates_texture() {
        let f = fixture();
        let context = SoftwareContext::new(Capability::Standard);
        assert_eq!(
            f.engine.refresh(true, &f.cache, &context).unwrap(),
            RefreshOutcome::Clean
        );
        let view = f.cache.lookup(&context).unwrap();
        assert_eq!(view.upload_count(), 0);
        f.cache.destroy(&context);
    }

    #[test]
    fn dirty_refresh_uploads_and_clears() {
        let f = fixture();
        let context = SoftwareContext::new(Capability::Extended);
        f.staging.write_frame(8, |b| b.copy_from_slice(&frame(3)));
        assert_eq!(
            f.engine.refresh(true, &f.cache, &context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 8 }
        );
        assert!(!f.staging.is_dirty());
        assert_eq!(f.cache.lookup(&context).unwrap().tight_bytes(), frame(3));
        f.cache.destroy(&context);
    }

    #[test]
    fn lock_failure_keeps_dirty_and_content() {
        let f = fixture();
        let context = SoftwareContext::new(Capability::Standard);
        f.staging.write_frame(1, |b| b.copy_from_slice(&frame(1)));
        f.engine.refresh(true, &f.cache, &context).unwrap();

        f.staging.write_frame(2, |b| b.copy_from_slice(&frame(2)));
        context.fail_next_lock();
        let err = f.engine.refresh(true, &f.cache, &context).unwrap_err();
        assert!(matches!(err, Error::Mapping { .. }));
        assert!(f.staging.is_dirty());
        assert_eq!(f.cache.lookup(&context).unwrap().tight_bytes(), frame(1));

        //next tick retries
        assert_eq!(
            f.engine.refresh(true, &f.cache, &context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 2 }
        );
        assert_eq!(f.cache.lookup(&context).unwrap().tight_bytes(), frame(2));
        f.cache.destroy(&context);
    }

    #[test]
    fn unlock_failure_releases_mapping() {
        let f = fixture();
        let context = SoftwareContext::new(Capability::Standard);
        f.staging.write_frame(1, |b| b.copy_from_slice(&frame(1)));
        context.fail_next_unlock();
        assert!(f.engine.refresh(true, &f.cache, &context).is_err());
        assert!(f.staging.is_dirty());
        //a leaked mapping would make this lock fail with AlreadyLocked
        assert_eq!(
            f.engine.refresh(true, &f.cache, &context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 1 }
        );
        f.cache.destroy(&context);
    }

    #[test]
    fn locked_rect_unlocks_on_drop() {
        let context = SoftwareContext::new(Capability::Standard);
        let cache: ResourceCache<SoftwareContext, BGRX8UNorm> = ResourceCache::new(&TINY);
        let entry = cache.get_or_create(&context).unwrap();
        entry
            .with_texture(|texture| {
                {
                    let mut locked = LockedRect::lock(texture, 0, LockMode::Discard).unwrap();
                    assert_eq!(locked.pitch(), 12);
                    locked.bytes().fill(5);
                }
                //dropped without unlock(): the mapping was still released and published
                let again = LockedRect::lock(texture, 0, LockMode::NoOverwrite).unwrap();
                again.unlock().unwrap();
            })
            .unwrap();
        assert!(entry.render_side().unwrap().tight_bytes().iter().all(|b| *b == 5));
        cache.destroy(&context);
    }

    /// A context whose textures land a new frame in the staging buffer while being unlocked.
    struct RacingContext {
        id: ContextId,
        staging: Arc<StagingBuffer<BGRX8UNorm>>,
    }

    struct RacingTexture {
        staging: Arc<StagingBuffer<BGRX8UNorm>>,
        pixels: Vec<u8>,
        mapping: Vec<u8>,
        race: Option<(i64, u8)>,
    }

    impl RenderContext for RacingContext {
        type Texture = RacingTexture;
        type Error = SoftwareError;

        fn id(&self) -> ContextId {
            self.id
        }

        fn capability(&self) -> Capability {
            Capability::Standard
        }

        fn create_texture(
            &self,
            descriptor: &TextureDescriptor<'_>,
        ) -> Result<RacingTexture, SoftwareError> {
            Ok(RacingTexture {
                staging: self.staging.clone(),
                pixels: vec![0; descriptor.tight_stride() * descriptor.height as usize],
                mapping: Vec::new(),
                race: Some((2, 2)),
            })
        }
    }

    impl ContextTexture for RacingTexture {
        type RenderSide = ();
        type Error = SoftwareError;

        fn lock_rect(&mut self, _level: u32, _mode: LockMode) -> Result<usize, SoftwareError> {
            self.mapping = self.pixels.clone();
            Ok(self.pixels.len() / TINY.height as usize)
        }

        fn mapped_bytes(&mut self) -> &mut [u8] {
            &mut self.mapping
        }

        fn unlock_rect(&mut self, _level: u32) -> Result<(), SoftwareError> {
            self.pixels = std::mem::take(&mut self.mapping);
            if let Some((index, fill)) = self.race.take() {
                self.staging.write_frame(index, |bytes| bytes.fill(fill));
            }
            Ok(())
        }

        fn render_side(&self) {}

        fn dispose(self) {}
    }

    #[test]
    fn frame_landing_during_upload_stays_dirty() {
        let f = fixture();
        let context = RacingContext {
            id: ContextId::next(),
            staging: f.staging.clone(),
        };
        let cache: ResourceCache<RacingContext, BGRX8UNorm> = ResourceCache::new(&TINY);
        f.staging.write_frame(1, |bytes| bytes.fill(1));

        assert_eq!(
            f.engine.refresh(true, &cache, &context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 1 }
        );
        //frame 2 arrived after the copy, so it has not been uploaded anywhere yet
        assert_eq!(f.staging.frame_index(), 2);
        assert!(f.staging.is_dirty());

        assert_eq!(
            f.engine.refresh(true, &cache, &context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 2 }
        );
        assert!(!f.staging.is_dirty());
        let pixels = cache
            .entry(&context)
            .unwrap()
            .with_texture(|texture| texture.pixels.clone())
            .unwrap();
        assert!(pixels.iter().all(|b| *b == 2));
        cache.destroy(&context);
    }
}
