// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
wgpu backend.

wgpu has no user-visible texture mapping, so a locked rect is a CPU shadow of the texture, padded to
[wgpu::COPY_BYTES_PER_ROW_ALIGNMENT].  Unlocking submits the whole shadow through
[wgpu::Queue::write_texture].  Under [LockMode::NoOverwrite] the shadow keeps what the last unlock
submitted; under [LockMode::Discard] it starts zeroed.

wgpu has no memory pools either.  [crate::context::MemoryPool] is still recorded so that
device-reset teardown ([crate::cache::ResourceCache::destroy_unmanaged]) behaves the same on every
backend.
*/

use crate::context::{
    Capability, ContextId, ContextTexture, LockMode, PixelFormatKind, RenderContext,
    TextureDescriptor,
};
use std::fmt::Debug;
use wgpu::{Extent3d, TexelCopyBufferLayout, TexelCopyTextureInfo};

#[derive(Debug, thiserror::Error)]
pub enum WgpuError {
    #[error("no suitable adapter")]
    NoSuchAdapter,
    #[error("can't create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("texture of {width}x{height} is outside the device limit of {max}")]
    InvalidSize { width: u16, height: u16, max: u32 },
    #[error("texture has no mip level {level}")]
    NoSuchLevel { level: u32 },
    #[error("texture is already locked")]
    AlreadyLocked,
    #[error("texture is not locked")]
    NotLocked,
}

pub(crate) const fn wgpu_format(kind: PixelFormatKind) -> wgpu::TextureFormat {
    match kind {
        //the padding byte is ignored when sampling
        PixelFormatKind::BGRX8UNorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormatKind::BGRA8UNorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormatKind::RGBA8UNorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// Row pitch for a row of `tight_stride` bytes, as wgpu wants it for copies.
pub(crate) const fn aligned_pitch(tight_stride: usize) -> usize {
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    tight_stride.div_ceil(alignment) * alignment
}

/// A rendering context backed by a wgpu device.
pub struct WgpuContext {
    id: ContextId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capability: Capability,
}

impl WgpuContext {
    /// Wraps a device the host already owns.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, capability: Capability) -> Self {
        WgpuContext {
            id: ContextId::next(),
            device,
            queue,
            capability,
        }
    }

    /**
    Creates a context on a fresh device, with no surface.

    Useful for offscreen hosts.  Fails with [WgpuError::NoSuchAdapter] on machines without a usable
    adapter.
    */
    pub async fn headless(capability: Capability) -> Result<Self, WgpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = instance
            .request_adapter(&options)
            .await
            .map_err(|_| WgpuError::NoSuchAdapter)?;
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("frames_and_textures headless"),
            required_features: Default::default(),
            required_limits: adapter.limits(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        logwise::info_sync!(
            "headless context on {adapter}",
            adapter = logwise::privacy::LogIt(&adapter.get_info().name)
        );
        Ok(Self::new(device, queue, capability))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl Debug for WgpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuContext")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .finish()
    }
}

impl RenderContext for WgpuContext {
    type Texture = WgpuTexture;
    type Error = WgpuError;

    fn id(&self) -> ContextId {
        self.id
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn create_texture(&self, descriptor: &TextureDescriptor<'_>) -> Result<WgpuTexture, WgpuError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let (width, height) = (descriptor.width as u32, descriptor.height as u32);
        if width == 0 || height == 0 || width > max || height > max {
            return Err(WgpuError::InvalidSize {
                width: descriptor.width,
                height: descriptor.height,
                max,
            });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(descriptor.label),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: descriptor.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(descriptor.format),
            //uploads go through write_texture regardless of usage
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let pitch = aligned_pitch(descriptor.tight_stride());
        Ok(WgpuTexture {
            texture,
            queue: self.queue.clone(),
            width,
            height,
            pitch,
            mip_levels: descriptor.mip_levels,
            shadow: vec![0u8; pitch * height as usize].into_boxed_slice(),
            locked: false,
        })
    }
}

/// A texture on a wgpu device.
pub struct WgpuTexture {
    texture: wgpu::Texture,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    pitch: usize,
    mip_levels: u32,
    shadow: Box<[u8]>,
    locked: bool,
}

impl WgpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl Debug for WgpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pitch", &self.pitch)
            .field("locked", &self.locked)
            .finish()
    }
}

impl ContextTexture for WgpuTexture {
    type RenderSide = wgpu::Texture;
    type Error = WgpuError;

    fn lock_rect(&mut self, level: u32, mode: LockMode) -> Result<usize, WgpuError> {
        //the shadow only covers level 0
        if level >= self.mip_levels.min(1) {
            return Err(WgpuError::NoSuchLevel { level });
        }
        if self.locked {
            return Err(WgpuError::AlreadyLocked);
        }
        if mode == LockMode::Discard {
            self.shadow.fill(0);
        }
        self.locked = true;
        Ok(self.pitch)
    }

    fn mapped_bytes(&mut self) -> &mut [u8] {
        if self.locked { &mut self.shadow[..] } else { &mut [] }
    }

    fn unlock_rect(&mut self, level: u32) -> Result<(), WgpuError> {
        if level >= self.mip_levels.min(1) {
            return Err(WgpuError::NoSuchLevel { level });
        }
        if !self.locked {
            return Err(WgpuError::NotLocked);
        }
        self.locked = false;
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.shadow,
            TexelCopyBufferLayout {
                offset: 0,
                //pitch is bounded by a u16 width times 4 bytes, plus alignment
                bytes_per_row: Some(self.pitch as u32),
                rows_per_image: Some(self.height),
            },
            Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn render_side(&self) -> wgpu::Texture {
        self.texture.clone()
    }

    fn dispose(self) {
        self.texture.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_aligned_for_copies() {
        assert_eq!(aligned_pitch(256), 256);
        assert_eq!(aligned_pitch(4), 256);
        //640 pixels of 4 bytes
        assert_eq!(aligned_pitch(2560), 2560);
        assert_eq!(aligned_pitch(2564), 2816);
    }

    #[test]
    fn formats_map_to_four_byte_textures() {
        for kind in [
            PixelFormatKind::BGRX8UNorm,
            PixelFormatKind::BGRA8UNorm,
            PixelFormatKind::RGBA8UNorm,
        ] {
            assert_eq!(
                wgpu_format(kind).block_copy_size(None),
                Some(kind.bytes_per_pixel() as u32)
            );
        }
        assert_eq!(wgpu_format(PixelFormatKind::BGRX8UNorm), wgpu::TextureFormat::Bgra8Unorm);
    }

    #[test]
    fn textures_cross_threads() {
        fn assert_send<T: Send + 'static>() {}
        fn assert_shared<T: Clone + Send + Sync + 'static>() {}
        assert_send::<WgpuTexture>();
        assert_shared::<<WgpuTexture as ContextTexture>::RenderSide>();
    }
}
