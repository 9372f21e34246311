// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The surface a host plugin framework talks to.

A host drives a node with two kinds of calls:

* an evaluation tick, [ColorTextureNode::evaluate], plus pin connect/disconnect notifications;
* per rendering context, every frame: [ColorTextureNode::get_texture] to sample,
  [ColorTextureNode::update_resource] before the next sample, and
  [ColorTextureNode::destroy_resource] only when the context goes away.

Every method takes `&self`, so a node can be shared between the host's evaluation thread and its
rendering threads.  The host must not call `update_resource` twice concurrently for the same context;
calls for different contexts may overlap freely.
*/

use crate::cache::ResourceCache;
use crate::config::FrameConfig;
use crate::connection::{ConnectionState, ConnectionStateMachine};
use crate::context::{ContextTexture, RenderContext};
use crate::error::Error;
use crate::ingest::{FrameIngestor, IngestStats};
use crate::pixel_formats::PixelFormat;
use crate::producer::FrameProducer;
use crate::staging::StagingBuffer;
use crate::upload::{RefreshOutcome, UploadEngine};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use wasm_safe_mutex::Mutex;

/// The node's pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// The sensor runtime.
    ProducerInput,
    /// The index of the last frame received.
    FrameIndexOutput,
    /// The per-context texture.
    TextureOutput,
}

/// How much to tear down in [ColorTextureNode::destroy_resource].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyScope {
    /// The context is going away.
    All,
    /// The device is being reset.  Managed textures survive a reset; only default-pool ones go.
    UnmanagedOnly,
}

/// Publishes a sensor's color frames as one texture per rendering context.
pub struct ColorTextureNode<C: RenderContext, Format> {
    ingestor: FrameIngestor<Format>,
    engine: UploadEngine<Format>,
    cache: ResourceCache<C, Format>,
    connection: Mutex<ConnectionStateMachine>,
    frame_index_out: AtomicI64,
}

impl<C: RenderContext, Format: PixelFormat> ColorTextureNode<C, Format> {
    pub fn new(config: &FrameConfig<'_>) -> Self {
        let staging = Arc::new(StagingBuffer::new(config));
        ColorTextureNode {
            ingestor: FrameIngestor::new(staging.clone()),
            engine: UploadEngine::new(staging.clone()),
            cache: ResourceCache::new(config),
            connection: Mutex::new(ConnectionStateMachine::new()),
            frame_index_out: AtomicI64::new(staging.frame_index()),
        }
    }

    /// Records a connection on `pin`.  Only [Pin::ProducerInput] matters; it takes effect on the next tick.
    pub fn connect_pin(&self, pin: Pin) {
        if pin == Pin::ProducerInput {
            self.connection.lock_sync().pin_changed();
        }
    }

    /// Records a disconnection on `pin`.  Only [Pin::ProducerInput] matters; it takes effect on the next tick.
    pub fn disconnect_pin(&self, pin: Pin) {
        if pin == Pin::ProducerInput {
            self.connection.lock_sync().pin_changed();
        }
    }

    /**
    The evaluation tick.

    `input` is whatever the producer pin carries right now.  Pending pin changes are resolved against it,
    then the current frame index is published and returned.
    */
    pub fn evaluate(&self, input: Option<Arc<dyn FrameProducer>>) -> i64 {
        self.connection.lock_sync().resolve(input, &self.ingestor);
        let frame_index = self.ingestor.staging().frame_index();
        self.frame_index_out.store(frame_index, Ordering::Relaxed);
        frame_index
    }

    /// The value of [Pin::FrameIndexOutput] as of the last tick.
    pub fn frame_index(&self) -> i64 {
        self.frame_index_out.load(Ordering::Relaxed)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.lock_sync().state()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.ingestor.stats()
    }

    /// The texture to sample for `context`, if it has one yet.
    pub fn get_texture(&self, context: &C) -> Option<<C::Texture as ContextTexture>::RenderSide> {
        self.cache.lookup(context)
    }

    /// Brings `context`'s texture up to date.
    pub fn update_resource(&self, context: &C) -> Result<RefreshOutcome, Error> {
        let bound = self.connection.lock_sync().has_producer();
        self.engine.refresh(bound, &self.cache, context)
    }

    /// Releases `context`'s texture.  Returns whether anything was released.
    pub fn destroy_resource(&self, context: &C, scope: DestroyScope) -> bool {
        match scope {
            DestroyScope::All => self.cache.destroy(context),
            DestroyScope::UnmanagedOnly => self.cache.destroy_unmanaged(context),
        }
    }

    pub fn cache(&self) -> &ResourceCache<C, Format> {
        &self.cache
    }

    pub fn staging(&self) -> &Arc<StagingBuffer<Format>> {
        self.ingestor.staging()
    }
}

impl<C: RenderContext, Format> Debug for ColorTextureNode<C, Format> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorTextureNode")
            .field("cache", &self.cache)
            .field("frame_index", &self.frame_index_out.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Capability;
    use crate::imp::software::SoftwareContext;
    use crate::pixel_formats::BGRX8UNorm;
    use crate::producer::LoopbackProducer;
    use crate::staging::NO_FRAME;

    const TINY: FrameConfig<'static> = FrameConfig {
        width: 2,
        height: 2,
        debug_name: "tiny",
    };

    type Node = ColorTextureNode<SoftwareContext, BGRX8UNorm>;

    #[test]
    fn other_pins_are_ignored() {
        let node = Node::new(&TINY);
        node.connect_pin(Pin::TextureOutput);
        node.disconnect_pin(Pin::FrameIndexOutput);
        assert_eq!(node.connection_state(), ConnectionState::Unbound);
        node.connect_pin(Pin::ProducerInput);
        assert_eq!(node.connection_state(), ConnectionState::PendingRebind);
    }

    #[test]
    fn evaluate_publishes_frame_index() {
        let node = Node::new(&TINY);
        let producer = Arc::new(LoopbackProducer::new());
        assert_eq!(node.evaluate(None), NO_FRAME);

        node.connect_pin(Pin::ProducerInput);
        node.evaluate(Some(producer.clone()));
        producer.deliver(12, &[9u8; 16]);
        //not published until the tick
        assert_eq!(node.frame_index(), NO_FRAME);
        assert_eq!(node.evaluate(Some(producer.clone())), 12);
        assert_eq!(node.frame_index(), 12);
        assert_eq!(node.ingest_stats().frames_received, 1);
    }

    #[test]
    fn per_context_lifecycle() {
        let node = Node::new(&TINY);
        let producer = Arc::new(LoopbackProducer::new());
        let context = SoftwareContext::new(Capability::Extended);

        assert_eq!(node.update_resource(&context).unwrap(), RefreshOutcome::Unbound);
        assert!(node.get_texture(&context).is_none());

        node.connect_pin(Pin::ProducerInput);
        node.evaluate(Some(producer.clone()));
        producer.deliver(1, &[3u8; 16]);
        assert_eq!(
            node.update_resource(&context).unwrap(),
            RefreshOutcome::Uploaded { frame_index: 1 }
        );
        assert_eq!(node.get_texture(&context).unwrap().tight_bytes(), vec![3u8; 16]);

        assert!(node.destroy_resource(&context, DestroyScope::UnmanagedOnly));
        assert!(node.get_texture(&context).is_none());
        assert!(!node.destroy_resource(&context, DestroyScope::All));
    }
}
