// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Frame geometry.

Geometry is fixed for the lifetime of a node: the staging buffer is allocated once and every texture
is created at this size.  The pixel format is picked separately, as a type parameter.
*/

use crate::context::{Capability, TextureDescriptor};
use crate::pixel_formats::PixelFormat;

/// Size and naming of the frames a node handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig<'a> {
    pub width: u16,
    pub height: u16,
    /// Used as a label for textures and in logs.
    pub debug_name: &'a str,
}

impl FrameConfig<'static> {
    /// The color camera of a first-generation Kinect: 640x480.
    pub const KINECT_COLOR: FrameConfig<'static> = FrameConfig {
        width: 640,
        height: 480,
        debug_name: "kinect_color",
    };
}

impl Default for FrameConfig<'static> {
    fn default() -> Self {
        Self::KINECT_COLOR
    }
}

impl<'a> FrameConfig<'a> {
    /// Bytes in one row of `Format` with no padding.
    pub fn tight_stride<Format: PixelFormat>(&self) -> usize {
        self.width as usize * Format::BYTES_PER_PIXEL as usize
    }

    /// Bytes in one whole frame of `Format`.
    pub fn byte_len<Format: PixelFormat>(&self) -> usize {
        self.tight_stride::<Format>() * self.height as usize
    }

    /// The texture a context with `capability` should get for these frames.
    pub fn texture_descriptor<Format: PixelFormat>(
        &self,
        capability: Capability,
    ) -> TextureDescriptor<'a> {
        TextureDescriptor {
            label: self.debug_name,
            width: self.width,
            height: self.height,
            mip_levels: 1,
            usage: capability.texture_usage(),
            format: Format::KIND,
            pool: capability.memory_pool(),
        }
    }
}
