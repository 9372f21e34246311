/*! frames_and_textures keeps GPU textures synchronized with frames coming from an
asynchronous sensor.

A depth/color sensor delivers frames on its own thread, whenever it likes.  A renderer
wants a texture it can sample, once per rendering context, every frame.  This crate sits in
between:

```text
 producer thread ──► FrameIngestor ──► StagingBuffer ◄── UploadEngine ◄── update call (per context)
                                                              │
                                                              ▼
                                                        ResourceCache ──► texture (per context)
```

| Piece                                         | Role                                                        |
|-----------------------------------------------|-------------------------------------------------------------|
| [staging::StagingBuffer]                      | The latest frame, behind one mutex, plus the dirty flag     |
| [ingest::FrameIngestor]                       | Copies frames from the producer into the staging buffer     |
| [cache::ResourceCache]                        | One texture per rendering context, created lazily           |
| [upload::UploadEngine]                        | Copies staging rows into a mapped texture honoring pitch    |
| [connection::ConnectionStateMachine]          | Which producer we listen to, resolved on the next tick      |
| [node::ColorTextureNode]                      | What a host plugin framework actually talks to              |

# Backends

Rendering contexts are abstracted by [context::RenderContext].  Two backends ship in this crate:

* a software backend ([SoftwareContext]) that keeps textures in CPU memory, with configurable row
  alignment.  Useful for headless hosts and for testing pitch handling.
* a [wgpu](https://wgpu.rs) backend (`backend_wgpu`, on by default) that uploads through
  `Queue::write_texture`.

Textures are handed between threads, so every backend's texture must be `Send`.  On wasm32, wgpu
handles are only `Send` with its `fragile-send-sync-non-atomic-wasm` feature, which this crate turns
on through `wgpu_webgl`.  Without `wgpu_webgl`, wasm32 builds leave the wgpu backend out and ship only
the software backend.

# A word on the dirty flag

There is exactly one dirty flag, shared by every context.  Whichever context refreshes first after a
frame lands clears it, and other contexts refreshed afterwards keep showing the previous frame until the
next delivery.  Hosts that render one context per tick never notice.  Hosts with several contexts will.
*/

pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
mod error;
pub mod ingest;
mod imp;
pub mod node;
pub mod pixel_formats;
pub mod producer;
pub mod staging;
pub mod upload;

pub use error::{BoxedError, Error};
pub use imp::software::{SoftwareContext, SoftwareError, SoftwareTexture, SoftwareTextureView};
#[cfg(all(
    feature = "backend_wgpu",
    any(not(target_arch = "wasm32"), feature = "wgpu_webgl")
))]
pub use imp::wgpu::{WgpuContext, WgpuError, WgpuTexture};
