//! Event broadcasting to callbacks and channel subscribers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::microscope::GroundTruth;
use crate::photophysics::StateTransition;

/// Events emitted after each frame
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    /// A frame finished and was handed to the caller
    FrameCompleted {
        frame: u64,
        ground_truth: GroundTruth,
    },
    /// An emitter changed state during the frame
    StateTransition {
        frame: u64,
        transition: StateTransition,
    },
    /// An emitter reached its terminal state during the frame
    Bleached { frame: u64, fluorophore_id: u64 },
}

/// Callback ID for registration/deregistration
pub type CallbackId = u64;

/// Callback function type
pub type EventCallback = Arc<dyn Fn(&SimulationEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of event subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    callbacks: Arc<Mutex<BTreeMap<CallbackId, EventCallback>>>,
    channels: Arc<Mutex<Vec<Sender<SimulationEvent>>>>,
    next_callback_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("callbacks", &self.callback_count())
            .field("channels", &lock(&self.channels).len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for simulation events
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&SimulationEvent) + Send + Sync + 'static,
    {
        let callback_id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.callbacks).insert(callback_id, Arc::new(callback));
        callback_id
    }

    /// Deregister a callback
    pub fn deregister_callback(&self, callback_id: CallbackId) -> bool {
        lock(&self.callbacks).remove(&callback_id).is_some()
    }

    /// Get the number of registered callbacks
    pub fn callback_count(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Receive every subsequent event on a channel. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_channel(&self) -> Receiver<SimulationEvent> {
        let (tx, rx) = unbounded();
        lock(&self.channels).push(tx);
        rx
    }

    /// Whether anybody is listening
    pub fn has_subscribers(&self) -> bool {
        self.callback_count() > 0 || !lock(&self.channels).is_empty()
    }

    /// Emit an event to all registered callbacks and channels
    pub fn emit(&self, event: &SimulationEvent) {
        // Callbacks run without the registry lock so they may (de)register
        let callbacks: Vec<EventCallback> = lock(&self.callbacks).values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }

        let mut channels = lock(&self.channels);
        let before = channels.len();
        channels.retain(|tx| tx.send(event.clone()).is_ok());
        if channels.len() < before {
            debug!("Dropped {} closed event channel(s)", before - channels.len());
        }
    }
}
