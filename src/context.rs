// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Rendering contexts and the textures they own.
//!
//! A rendering context is whatever a graphics API calls its device: the identity against which
//! textures are allocated.  Contexts are owned by the host, not by us.  We only hold onto them long
//! enough to create, map and dispose textures.
//!
//! This module provides the vocabulary backends speak:
//!
//! - [`Capability`] - Standard or extended device
//! - [`TextureUsage`], [`MemoryPool`], [`PixelFormatKind`] - How a texture is allocated
//! - [`LockMode`] - How a texture is mapped for CPU writes
//! - [`RenderContext`] and [`ContextTexture`] - The traits a backend implements
//!
//! # Examples
//!
//! ```
//! use frames_and_textures::context::{Capability, LockMode, MemoryPool, TextureUsage};
//!
//! // Extended devices get a dynamic texture in the default pool and lock without discarding.
//! assert_eq!(Capability::Extended.texture_usage(), TextureUsage::Dynamic);
//! assert_eq!(Capability::Extended.memory_pool(), MemoryPool::Default);
//! assert_eq!(Capability::Extended.lock_mode(), LockMode::NoOverwrite);
//! ```

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// The identity of a rendering context.
///
/// Two contexts are the same context exactly when their ids are equal.  Backends hand out a
/// fresh id per context with [ContextId::next].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Allocates an id that no other context in this process has.
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a context can do.  Selection of texture parameters and lock mode is a pure function of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A plain device.  Textures live in the managed pool and are locked with discard.
    Standard,
    /// An extended device (e.g. one that supports shared resources).  Textures are dynamic,
    /// live in the default pool, and are locked without discarding.
    Extended,
}

impl Capability {
    pub const fn texture_usage(self) -> TextureUsage {
        match self {
            Capability::Standard => TextureUsage::Static,
            Capability::Extended => TextureUsage::Dynamic,
        }
    }

    pub const fn memory_pool(self) -> MemoryPool {
        match self {
            Capability::Standard => MemoryPool::Managed,
            Capability::Extended => MemoryPool::Default,
        }
    }

    pub const fn lock_mode(self) -> LockMode {
        match self {
            Capability::Standard => LockMode::Discard,
            Capability::Extended => LockMode::NoOverwrite,
        }
    }
}

/// How a texture will be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Written rarely; the driver may keep a system-memory copy.
    Static,
    /// Written every frame.
    Dynamic,
}

/// Where a texture lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryPool {
    /// The driver keeps a backing copy and restores the texture after a device reset.
    Managed,
    /// Device memory only.  Lost with the device, so the host asks us to destroy these early.
    Default,
}

/// Runtime description of a [crate::pixel_formats::PixelFormat].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormatKind {
    BGRX8UNorm,
    BGRA8UNorm,
    RGBA8UNorm,
}

impl PixelFormatKind {
    pub const fn bytes_per_pixel(self) -> u8 {
        match self {
            PixelFormatKind::BGRX8UNorm
            | PixelFormatKind::BGRA8UNorm
            | PixelFormatKind::RGBA8UNorm => 4,
        }
    }
}

/// How to map a texture for CPU writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// The previous content may be thrown away; the driver can hand out fresh memory instead of
    /// stalling on a texture the GPU is still reading.
    Discard,
    /// Keep the previous content.  We promise not to touch anything the GPU is using.
    NoOverwrite,
}

/// Parameters for a texture allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor<'a> {
    pub label: &'a str,
    pub width: u16,
    pub height: u16,
    pub mip_levels: u32,
    pub usage: TextureUsage,
    pub format: PixelFormatKind,
    pub pool: MemoryPool,
}

impl TextureDescriptor<'_> {
    /// Bytes in one row with no padding.
    pub fn tight_stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel() as usize
    }
}

/**
A texture owned by one rendering context.

Mapping follows the classic lock/unlock protocol: [Self::lock_rect] maps a mip level and reports its
row pitch, [Self::mapped_bytes] exposes the mapping, [Self::unlock_rect] hands it back to the GPU.
Callers are expected to use [crate::upload::LockedRect] rather than calling these directly, since it
guarantees the unlock.
*/
pub trait ContextTexture: Send + 'static {
    /// Whatever a renderer needs to sample this texture.
    type RenderSide: Clone + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Maps `level` for CPU writes and returns its row pitch in bytes.
    fn lock_rect(&mut self, level: u32, mode: LockMode) -> Result<usize, Self::Error>;

    /// The currently mapped bytes, `pitch * height` long.  Empty when nothing is mapped.
    fn mapped_bytes(&mut self) -> &mut [u8];

    /// Unmaps `level`, publishing whatever was written.
    fn unlock_rect(&mut self, level: u32) -> Result<(), Self::Error>;

    fn render_side(&self) -> Self::RenderSide;

    /// Releases the GPU resource.
    fn dispose(self);
}

/// A rendering context.  Owned by the host; this crate only borrows it.
pub trait RenderContext {
    type Texture: ContextTexture;
    type Error: std::error::Error + Send + Sync + 'static;

    fn id(&self) -> ContextId;
    fn capability(&self) -> Capability;
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor<'_>,
    ) -> Result<Self::Texture, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn standard_contexts_use_managed_discard() {
        assert_eq!(Capability::Standard.texture_usage(), TextureUsage::Static);
        assert_eq!(Capability::Standard.memory_pool(), MemoryPool::Managed);
        assert_eq!(Capability::Standard.lock_mode(), LockMode::Discard);
    }

    #[test]
    fn tight_stride() {
        let descriptor = TextureDescriptor {
            label: "t",
            width: 640,
            height: 480,
            mip_levels: 1,
            usage: TextureUsage::Static,
            format: PixelFormatKind::BGRX8UNorm,
            pool: MemoryPool::Managed,
        };
        assert_eq!(descriptor.tight_stride(), 2560);
    }
}
