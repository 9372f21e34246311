// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::context::ContextId;

/// A backend error, type-erased so that [Error] does not need to be generic over the backend.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/**
Errors surfaced by this crate.

None of these are fatal.  Each one is local to a single frame delivery or a single context's refresh,
and the next natural tick or delivery retries.
*/
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The producer handed us no frame, or a frame whose payload does not fit the staging buffer.
    ///
    /// The frame is dropped and no state is mutated.
    #[error("invalid frame: payload is {actual} bytes, staging buffer holds {expected}")]
    InvalidFrame { expected: usize, actual: usize },
    /// The context rejected the texture allocation.
    #[error("context {context} could not create a texture")]
    ResourceCreation {
        context: ContextId,
        #[source]
        source: BoxedError,
    },
    /// Locking, copying into, or unlocking the texture failed.  The texture keeps its previous content.
    #[error("context {context} could not map its texture")]
    Mapping {
        context: ContextId,
        #[source]
        source: BoxedError,
    },
}

impl Error {
    pub(crate) fn resource_creation<E>(context: ContextId, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ResourceCreation {
            context,
            source: Box::new(source),
        }
    }

    pub(crate) fn mapping<E>(context: ContextId, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Mapping {
            context,
            source: Box::new(source),
        }
    }
}
