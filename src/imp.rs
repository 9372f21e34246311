// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Rendering backends.
//!
//! The software backend is always available.  wgpu is behind `backend_wgpu`, and on wasm32 also
//! behind `wgpu_webgl`: only there are wgpu handles `Send`.

pub(crate) mod software;

#[cfg(all(
    feature = "backend_wgpu",
    any(not(target_arch = "wasm32"), feature = "wgpu_webgl")
))]
pub(crate) mod wgpu;
