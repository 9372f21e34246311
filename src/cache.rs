// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-context texture cache.

Every rendering context gets its own texture, created the first time the context asks for one and
destroyed only when the context says it is going away.  Contexts are owned by the host, so there is no
garbage collection here: a context that never reports teardown keeps its texture until the cache is
dropped.

Locking is two-level.  The map lock is only held to probe, insert or remove; each entry has its own lock
that serializes refresh and destroy for that one context.  Two contexts never wait on each other's entry.
*/

use crate::config::FrameConfig;
use crate::context::{ContextId, ContextTexture, MemoryPool, RenderContext};
use crate::error::Error;
use crate::pixel_formats::PixelFormat;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use wasm_safe_mutex::Mutex;

/// One context's texture.
///
/// The texture slot empties when the entry is destroyed; anyone still holding the entry then sees `None`.
pub struct CacheEntry<T> {
    context: ContextId,
    pool: MemoryPool,
    texture: Mutex<Option<T>>,
}

impl<T: ContextTexture> CacheEntry<T> {
    fn new(context: ContextId, pool: MemoryPool, texture: T) -> Self {
        CacheEntry {
            context,
            pool,
            texture: Mutex::new(Some(texture)),
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn pool(&self) -> MemoryPool {
        self.pool
    }

    /// A handle for sampling, or `None` once destroyed.
    pub fn render_side(&self) -> Option<T::RenderSide> {
        let texture = self.texture.lock_sync();
        Option::as_ref(&*texture).map(|t| t.render_side())
    }

    /// Runs `f` with exclusive access to the texture, or returns `None` once destroyed.
    pub fn with_texture<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        let mut texture = self.texture.lock_sync();
        Option::as_mut(&mut *texture).map(f)
    }

    fn dispose(&self) -> bool {
        //waits for an in-flight refresh of this context
        let texture = self.texture.lock_sync().take();
        match texture {
            Some(texture) => {
                texture.dispose();
                true
            }
            None => false,
        }
    }
}

impl<T> Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("context", &self.context)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Maps rendering contexts to their textures.
pub struct ResourceCache<C: RenderContext, Format> {
    entries: Mutex<HashMap<ContextId, Arc<CacheEntry<C::Texture>>>>,
    width: u16,
    height: u16,
    label: String,
    format: PhantomData<Format>,
}

impl<C: RenderContext, Format: PixelFormat> ResourceCache<C, Format> {
    /// A cache whose textures match frames of `config`'s size.
    pub fn new(config: &FrameConfig<'_>) -> Self {
        ResourceCache {
            entries: Mutex::new(HashMap::new()),
            width: config.width,
            height: config.height,
            label: config.debug_name.to_string(),
            format: PhantomData,
        }
    }

    fn config(&self) -> FrameConfig<'_> {
        FrameConfig {
            width: self.width,
            height: self.height,
            debug_name: &self.label,
        }
    }

    /**
    Returns the entry for `context`, creating its texture on first use.

    Creation runs without the map lock held.  If two threads race to create the same context's texture,
    one wins and the loser's texture is disposed immediately, so a context never ends up with two.
    */
    pub fn get_or_create(&self, context: &C) -> Result<Arc<CacheEntry<C::Texture>>, Error> {
        let id = context.id();
        let existing = self.entries.lock_sync().get(&id).cloned();
        if let Some(entry) = existing {
            return Ok(entry);
        }

        let capability = context.capability();
        let config = self.config();
        let descriptor = config.texture_descriptor::<Format>(capability);
        let texture = context.create_texture(&descriptor).map_err(|e| {
            logwise::error_sync!(
                "context {context} rejected texture {descriptor}: {err}",
                context = logwise::privacy::LogIt(&id),
                descriptor = logwise::privacy::LogIt(&descriptor),
                err = logwise::privacy::LogIt(&e)
            );
            Error::resource_creation(id, e)
        })?;

        let mut entries = self.entries.lock_sync();
        match entries.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get().clone();
                drop(entries);
                texture.dispose();
                Ok(entry)
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(CacheEntry::new(id, descriptor.pool, texture));
                vacant.insert(entry.clone());
                drop(entries);
                logwise::info_sync!(
                    "created {w}x{h} texture for context {context} ({capability})",
                    w = self.width,
                    h = self.height,
                    context = logwise::privacy::LogIt(&id),
                    capability = logwise::privacy::LogIt(&capability)
                );
                Ok(entry)
            }
        }
    }

    /// The entry for `context`, if one exists.  Never creates.
    pub fn entry(&self, context: &C) -> Option<Arc<CacheEntry<C::Texture>>> {
        self.entries.lock_sync().get(&context.id()).cloned()
    }

    /// A sampling handle for `context`'s texture, if one exists.  Never creates.
    pub fn lookup(&self, context: &C) -> Option<<C::Texture as ContextTexture>::RenderSide> {
        self.entry(context).and_then(|entry| entry.render_side())
    }

    /// Disposes `context`'s texture.  Returns whether there was one; calling again is a no-op.
    pub fn destroy(&self, context: &C) -> bool {
        self.destroy_matching(context, |_| true)
    }

    /// Disposes `context`'s texture only if it lives in the default pool, i.e. would not survive a
    /// device reset.  Managed textures are kept.
    pub fn destroy_unmanaged(&self, context: &C) -> bool {
        self.destroy_matching(context, |pool| pool == MemoryPool::Default)
    }

    fn destroy_matching<P: Fn(MemoryPool) -> bool>(&self, context: &C, predicate: P) -> bool {
        let id = context.id();
        let removed = {
            let mut entries = self.entries.lock_sync();
            match entries.get(&id) {
                Some(entry) if predicate(entry.pool()) => entries.remove(&id),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                let disposed = entry.dispose();
                logwise::info_sync!(
                    "destroyed texture for context {context}",
                    context = logwise::privacy::LogIt(&id)
                );
                disposed
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock_sync().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: RenderContext, Format> Debug for ResourceCache<C, Format> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("entries", &self.entries.lock_sync().len())
            .finish()
    }
}

impl<C: RenderContext, Format> Drop for ResourceCache<C, Format> {
    fn drop(&mut self) {
        let leaked = self.entries.lock_sync().len();
        if leaked > 0 {
            logwise::warn_sync!(
                "dropping texture cache with {leaked} textures whose contexts never reported teardown",
                leaked = leaked
            );
        }
    }
}
