// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Which producer we are listening to.

Pin notifications arrive from the host at awkward moments, possibly while a frame callback is in flight
on the producer thread.  Rather than touching subscriptions from inside the notification, we only record
that something changed.  The next evaluation tick looks at what the input pin actually carries and
resolves the change in one go.  A connect immediately followed by a disconnect costs nothing.

```text
             pin changed               pin changed
 Unbound ───────────────► PendingRebind ◄─────────────── Bound
    ▲                        │     │                       ▲
    │  tick, no producer     │     │  tick, producer       │
    └────────────────────────┘     └───────────────────────┘
```
*/

use crate::ingest::{FrameIngestor, Subscription};
use crate::pixel_formats::PixelFormat;
use crate::producer::FrameProducer;
use std::sync::Arc;

/// The observable state of a [ConnectionStateMachine].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    PendingRebind,
    Bound,
}

#[derive(Debug)]
enum State {
    Unbound,
    /// The previous subscription stays live until the tick resolves the change.
    PendingRebind { previous: Option<Subscription> },
    Bound(Subscription),
}

#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: State,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        ConnectionStateMachine {
            state: State::Unbound,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            State::Unbound => ConnectionState::Unbound,
            State::PendingRebind { .. } => ConnectionState::PendingRebind,
            State::Bound(_) => ConnectionState::Bound,
        }
    }

    /// The producer currently subscribed to, if any.
    pub fn producer(&self) -> Option<&Arc<dyn FrameProducer>> {
        match &self.state {
            State::Unbound | State::PendingRebind { previous: None } => None,
            State::PendingRebind {
                previous: Some(subscription),
            }
            | State::Bound(subscription) => Some(subscription.producer()),
        }
    }

    /// Whether frames can currently arrive.
    pub fn has_producer(&self) -> bool {
        self.producer().is_some()
    }

    /// Records a connect or disconnect on the producer pin.
    pub fn pin_changed(&mut self) {
        self.state = match std::mem::replace(&mut self.state, State::Unbound) {
            State::Unbound => State::PendingRebind { previous: None },
            State::Bound(subscription) => State::PendingRebind {
                previous: Some(subscription),
            },
            pending @ State::PendingRebind { .. } => pending,
        };
    }

    /**
    Resolves a pending change against what the input pin carries now.

    The old subscription is cancelled before the new one is made, so there is never more than one.
    Returns whether anything was resolved.
    */
    pub fn resolve<Format: PixelFormat>(
        &mut self,
        input: Option<Arc<dyn FrameProducer>>,
        ingestor: &FrameIngestor<Format>,
    ) -> bool {
        let previous = match std::mem::replace(&mut self.state, State::Unbound) {
            State::PendingRebind { previous } => previous,
            settled => {
                self.state = settled;
                return false;
            }
        };
        drop(previous);
        self.state = match input {
            Some(producer) => State::Bound(ingestor.subscribe(producer)),
            None => State::Unbound,
        };
        logwise::info_sync!(
            "producer binding resolved to {state}",
            state = logwise::privacy::LogIt(&self.state())
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::pixel_formats::BGRX8UNorm;
    use crate::producer::LoopbackProducer;
    use crate::staging::StagingBuffer;

    fn ingestor() -> FrameIngestor<BGRX8UNorm> {
        FrameIngestor::new(Arc::new(StagingBuffer::new(&FrameConfig {
            width: 1,
            height: 1,
            debug_name: "one",
        })))
    }

    #[test]
    fn starts_unbound() {
        let machine = ConnectionStateMachine::new();
        assert_eq!(machine.state(), ConnectionState::Unbound);
        assert!(!machine.has_producer());
    }

    #[test]
    fn resolution_waits_for_tick() {
        let ingestor = ingestor();
        let producer = Arc::new(LoopbackProducer::new());
        let mut machine = ConnectionStateMachine::new();

        machine.pin_changed();
        assert_eq!(machine.state(), ConnectionState::PendingRebind);
        assert_eq!(producer.observer_count(), 0);

        assert!(machine.resolve(Some(producer.clone()), &ingestor));
        assert_eq!(machine.state(), ConnectionState::Bound);
        assert_eq!(producer.observer_count(), 1);

        //nothing pending, nothing to do
        assert!(!machine.resolve(None, &ingestor));
        assert_eq!(machine.state(), ConnectionState::Bound);
    }

    #[test]
    fn bursts_coalesce() {
        let ingestor = ingestor();
        let producer = Arc::new(LoopbackProducer::new());
        let mut machine = ConnectionStateMachine::new();
        machine.pin_changed();
        machine.pin_changed();
        machine.pin_changed();
        machine.resolve(Some(producer.clone()), &ingestor);
        assert_eq!(producer.observer_count(), 1);
    }

    #[test]
    fn rebinding_moves_the_single_subscription() {
        let ingestor = ingestor();
        let a = Arc::new(LoopbackProducer::new());
        let b = Arc::new(LoopbackProducer::new());
        let mut machine = ConnectionStateMachine::new();
        machine.pin_changed();
        machine.resolve(Some(a.clone()), &ingestor);

        machine.pin_changed();
        //still listening to a until the tick
        assert!(machine.has_producer());
        assert_eq!(a.observer_count(), 1);

        machine.resolve(Some(b.clone()), &ingestor);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);
    }

    #[test]
    fn disconnect_unsubscribes() {
        let ingestor = ingestor();
        let producer = Arc::new(LoopbackProducer::new());
        let mut machine = ConnectionStateMachine::new();
        machine.pin_changed();
        machine.resolve(Some(producer.clone()), &ingestor);
        machine.pin_changed();
        machine.resolve(None, &ingestor);
        assert_eq!(machine.state(), ConnectionState::Unbound);
        assert!(!machine.has_producer());
        assert_eq!(producer.observer_count(), 0);
    }
}
