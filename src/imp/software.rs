// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A rendering backend in CPU memory.

Textures are plain byte vectors laid out with a row pitch rounded up to the context's row alignment, the
way drivers pad rows.  Locking hands out a private copy that is published on unlock, so a reader sampling
through [SoftwareTextureView] never observes a half-written frame.

Contexts can be told to fail their next creation, lock or unlock, which is how the error paths get
exercised without a GPU.
*/

use crate::context::{
    Capability, ContextId, ContextTexture, LockMode, RenderContext, TextureDescriptor,
};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use wasm_safe_mutex::Mutex;

/// Largest texture dimension a software context accepts.
pub const MAX_DIMENSION: u16 = 8192;

/// Byte pattern written into discarded mappings, so reads of stale memory are obvious.
const DISCARD_FILL: u8 = 0xCD;

#[derive(Debug, thiserror::Error)]
pub enum SoftwareError {
    #[error("texture of {width}x{height} exceeds the maximum dimension {max}")]
    TooLarge { width: u16, height: u16, max: u16 },
    #[error("texture has no mip level {level}")]
    NoSuchLevel { level: u32 },
    #[error("texture is already locked")]
    AlreadyLocked,
    #[error("texture is not locked")]
    NotLocked,
    #[error("context refused to create the texture")]
    CreateRejected,
    #[error("context refused to lock the texture")]
    LockRejected,
    #[error("context refused to unlock the texture")]
    UnlockRejected,
}

#[derive(Debug, Default)]
struct Faults {
    create: AtomicBool,
    lock: AtomicBool,
    unlock: AtomicBool,
}

impl Faults {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::Relaxed)
    }
}

/// A rendering context whose textures live in CPU memory.
pub struct SoftwareContext {
    id: ContextId,
    capability: Capability,
    row_alignment: usize,
    created: AtomicUsize,
    faults: Arc<Faults>,
}

impl Debug for SoftwareContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareContext")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("row_alignment", &self.row_alignment)
            .finish()
    }
}

impl SoftwareContext {
    /// A context with unpadded rows.
    pub fn new(capability: Capability) -> Self {
        Self::with_row_alignment(capability, 1)
    }

    /// A context whose textures pad each row to a multiple of `row_alignment` bytes.
    pub fn with_row_alignment(capability: Capability, row_alignment: usize) -> Self {
        assert!(row_alignment > 0, "row alignment must be nonzero");
        SoftwareContext {
            id: ContextId::next(),
            capability,
            row_alignment,
            created: AtomicUsize::new(0),
            faults: Arc::new(Faults::default()),
        }
    }

    /// How many textures this context has created.
    pub fn textures_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Makes the next [RenderContext::create_texture] fail.
    pub fn fail_next_create(&self) {
        self.faults.create.store(true, Ordering::Relaxed);
    }

    /// Makes the next lock of any texture of this context fail.
    pub fn fail_next_lock(&self) {
        self.faults.lock.store(true, Ordering::Relaxed);
    }

    /// Makes the next unlock of any texture of this context fail.  The mapping is still released.
    pub fn fail_next_unlock(&self) {
        self.faults.unlock.store(true, Ordering::Relaxed);
    }

    fn pitch_for(&self, tight_stride: usize) -> usize {
        tight_stride.div_ceil(self.row_alignment) * self.row_alignment
    }
}

impl RenderContext for SoftwareContext {
    type Texture = SoftwareTexture;
    type Error = SoftwareError;

    fn id(&self) -> ContextId {
        self.id
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<SoftwareTexture, SoftwareError> {
        if Faults::take(&self.faults.create) {
            return Err(SoftwareError::CreateRejected);
        }
        if descriptor.width > MAX_DIMENSION || descriptor.height > MAX_DIMENSION {
            return Err(SoftwareError::TooLarge {
                width: descriptor.width,
                height: descriptor.height,
                max: MAX_DIMENSION,
            });
        }
        let tight_stride = descriptor.tight_stride();
        let pitch = self.pitch_for(tight_stride);
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(SoftwareTexture {
            storage: Arc::new(Storage {
                pixels: Mutex::new(vec![0u8; pitch * descriptor.height as usize]),
                disposed: AtomicBool::new(false),
                uploads: AtomicU64::new(0),
            }),
            width: descriptor.width,
            height: descriptor.height,
            tight_stride,
            pitch,
            mip_levels: descriptor.mip_levels,
            mapping: None,
            faults: self.faults.clone(),
        })
    }
}

#[derive(Debug)]
struct Storage {
    pixels: Mutex<Vec<u8>>,
    disposed: AtomicBool,
    uploads: AtomicU64,
}

/// A texture in CPU memory.
#[derive(Debug)]
pub struct SoftwareTexture {
    storage: Arc<Storage>,
    width: u16,
    height: u16,
    tight_stride: usize,
    pitch: usize,
    mip_levels: u32,
    mapping: Option<Vec<u8>>,
    faults: Arc<Faults>,
}

impl ContextTexture for SoftwareTexture {
    type RenderSide = SoftwareTextureView;
    type Error = SoftwareError;

    fn lock_rect(&mut self, level: u32, mode: LockMode) -> Result<usize, SoftwareError> {
        if level >= self.mip_levels {
            return Err(SoftwareError::NoSuchLevel { level });
        }
        if self.mapping.is_some() {
            return Err(SoftwareError::AlreadyLocked);
        }
        if Faults::take(&self.faults.lock) {
            return Err(SoftwareError::LockRejected);
        }
        let mapping = match mode {
            LockMode::Discard => vec![DISCARD_FILL; self.pitch * self.height as usize],
            LockMode::NoOverwrite => self.storage.pixels.lock_sync().clone(),
        };
        self.mapping = Some(mapping);
        Ok(self.pitch)
    }

    fn mapped_bytes(&mut self) -> &mut [u8] {
        self.mapping.as_deref_mut().unwrap_or_default()
    }

    fn unlock_rect(&mut self, level: u32) -> Result<(), SoftwareError> {
        if level >= self.mip_levels {
            return Err(SoftwareError::NoSuchLevel { level });
        }
        let mapping = self.mapping.take().ok_or(SoftwareError::NotLocked)?;
        if Faults::take(&self.faults.unlock) {
            return Err(SoftwareError::UnlockRejected);
        }
        *self.storage.pixels.lock_sync() = mapping;
        self.storage.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn render_side(&self) -> SoftwareTextureView {
        SoftwareTextureView {
            storage: self.storage.clone(),
            width: self.width,
            height: self.height,
            tight_stride: self.tight_stride,
            pitch: self.pitch,
        }
    }

    fn dispose(self) {
        self.storage.disposed.store(true, Ordering::Relaxed);
    }
}

/// Read access to a [SoftwareTexture], as a renderer would sample it.
#[derive(Debug, Clone)]
pub struct SoftwareTextureView {
    storage: Arc<Storage>,
    width: u16,
    height: u16,
    tight_stride: usize,
    pitch: usize,
}

impl SoftwareTextureView {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Bytes between row starts, padding included.
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// The published bytes, padding included.
    pub fn pitched_bytes(&self) -> Vec<u8> {
        self.storage.pixels.lock_sync().clone()
    }

    /// The published pixels with row padding stripped.
    pub fn tight_bytes(&self) -> Vec<u8> {
        //zero-width textures have zero pitch and no bytes at all
        if self.pitch == 0 {
            return Vec::new();
        }
        let pixels = self.storage.pixels.lock_sync();
        let mut out = Vec::with_capacity(self.tight_stride * self.height as usize);
        for row in pixels.chunks_exact(self.pitch) {
            out.extend_from_slice(&row[..self.tight_stride]);
        }
        out
    }

    /// How many unlocks published content.
    pub fn upload_count(&self) -> u64 {
        self.storage.uploads.load(Ordering::Relaxed)
    }

    pub fn is_disposed(&self) -> bool {
        self.storage.disposed.load(Ordering::Relaxed)
    }

    /// Whether both views look at the same texture.
    pub fn same_texture(&self, other: &SoftwareTextureView) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }
}
