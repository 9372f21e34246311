// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Type-safe pixel format definitions for sensor frames.
//!
//! The staging buffer, the per-context textures and the producer all have to agree on one pixel layout.
//! That agreement is fixed at compile time by picking a format type:
//!
//! - [`BGRX8UNorm`] - 4-channel 8-bit, BGR order, padding byte ignored.  This is what color sensors
//!   typically emit (X8R8G8B8 in little-endian DirectX terms).
//! - [`BGRA8UNorm`] - 4-channel 8-bit, BGRA order.
//! - [`RGBA8UNorm`] - 4-channel 8-bit, RGBA order.
//!
//! # Examples
//!
//! ```
//! use frames_and_textures::pixel_formats::{BGRX8Pixel, PixelFormat, BGRX8UNorm};
//!
//! assert_eq!(BGRX8UNorm::BYTES_PER_PIXEL, 4);
//! let white = BGRX8Pixel::WHITE;
//! assert_eq!(white.b, 255);
//! ```

/*
Formats are zero-sized types rather than an enum so that a StagingBuffer<BGRX8UNorm> can't be
handed to an UploadEngine<RGBA8UNorm>.  Backends still need a runtime value to build descriptors,
which is what PixelFormatKind is for.
 */

use crate::context::PixelFormatKind;
use crate::pixel_formats::sealed::ReprC;
use std::fmt::Debug;

mod sealed {
    /// Marker trait indicating C-compatible memory layout.
    ///
    /// # Safety
    ///
    /// Implementors must have no padding and no uninitialized bytes, since we reinterpret
    /// slices of them as bytes.
    pub unsafe trait ReprC {}

    pub trait Sealed {}
}

/// A pixel format for frames and textures.
///
/// This trait is sealed; only the formats in this module implement it.
pub trait PixelFormat: sealed::Sealed + Debug + Send + Sync + 'static {
    /// Number of bytes per pixel.
    const BYTES_PER_PIXEL: u8;
    /// Runtime description handed to backends.
    const KIND: PixelFormatKind;
    /// The in-memory pixel type.
    type CPixel: Copy + Debug + Send + Sync + ReprC;
}

/// Convert a slice of C-compatible pixels to raw bytes.
pub fn pixel_as_bytes<T: ReprC>(t: &[T]) -> &[u8] {
    //safe because we know that T is repr(C)
    //(we offloaded the safety check to the ReprC trait)
    unsafe { std::slice::from_raw_parts(t.as_ptr() as *const u8, std::mem::size_of_val(t)) }
}

/// 8-bit normalized BGR with an ignored fourth byte.
#[derive(Debug, Clone, Copy)]
pub struct BGRX8UNorm;
impl sealed::Sealed for BGRX8UNorm {}
impl PixelFormat for BGRX8UNorm {
    const BYTES_PER_PIXEL: u8 = 4;
    const KIND: PixelFormatKind = PixelFormatKind::BGRX8UNorm;
    type CPixel = BGRX8Pixel;
}

/// Pixel type for [`BGRX8UNorm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BGRX8Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    /// Ignored by samplers.
    pub x: u8,
}
unsafe impl ReprC for BGRX8Pixel {}

impl BGRX8Pixel {
    pub const BLACK: BGRX8Pixel = BGRX8Pixel { b: 0, g: 0, r: 0, x: 0 };
    pub const WHITE: BGRX8Pixel = BGRX8Pixel { b: 255, g: 255, r: 255, x: 255 };
}

/// 8-bit normalized BGRA.
#[derive(Debug, Clone, Copy)]
pub struct BGRA8UNorm;
impl sealed::Sealed for BGRA8UNorm {}
impl PixelFormat for BGRA8UNorm {
    const BYTES_PER_PIXEL: u8 = 4;
    const KIND: PixelFormatKind = PixelFormatKind::BGRA8UNorm;
    type CPixel = BGRA8Pixel;
}

/// Pixel type for [`BGRA8UNorm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct BGRA8Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}
unsafe impl ReprC for BGRA8Pixel {}

/// 8-bit normalized RGBA.
#[derive(Debug, Clone, Copy)]
pub struct RGBA8UNorm;
impl sealed::Sealed for RGBA8UNorm {}
impl PixelFormat for RGBA8UNorm {
    const BYTES_PER_PIXEL: u8 = 4;
    const KIND: PixelFormatKind = PixelFormatKind::RGBA8UNorm;
    type CPixel = Unorm4;
}

/// Pixel type for [`RGBA8UNorm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Unorm4 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
unsafe impl ReprC for Unorm4 {}
