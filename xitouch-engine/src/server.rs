//! Thread-safe front end.
//!
//! Producers push events into a bounded queue through [`EventSender`]; the
//! input thread drains it under the server lock. Requests from client
//! handlers take the same lock, so the engine only ever sees one operation
//! at a time.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use xitouch_core::{QueueConfig, TouchConfig};

use crate::device::DeviceDescriptor;
use crate::dispatch::InputCore;
use crate::env::InputEnvironment;
use crate::error::EngineError;
use crate::event::EventRecord;
use crate::resolver::TouchVerdict;
use crate::types::{ClientId, DeviceId, ResourceId, TouchId, WindowId};

/// Producer handle for the event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<EventRecord>,
}

impl EventSender {
    /// Queues `event`, blocking while the queue is full.
    pub fn send(&self, event: EventRecord) -> Result<(), EngineError> {
        self.tx.send(event).map_err(|_| EngineError::QueueClosed)
    }
}

pub struct InputServer<E: InputEnvironment> {
    core: Mutex<InputCore<E>>,
    rx: Receiver<EventRecord>,
    tx: Sender<EventRecord>,
}

impl<E: InputEnvironment> InputServer<E> {
    pub fn new(env: E, touch: &TouchConfig, queue: &QueueConfig) -> Self {
        let (tx, rx) = bounded(queue.capacity);
        Self {
            core: Mutex::new(InputCore::new(env, touch)),
            rx,
            tx,
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender { tx: self.tx.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, InputCore<E>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatches everything queued so far. Returns the number of events
    /// processed; events for unknown devices are logged and skipped.
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let event = match self.rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            let mut core = self.lock();
            if let Err(err) = core.dispatch(event) {
                tracing::debug!("Dropping queued event: {}", err);
            }
            processed += 1;
        }
        processed
    }

    /// Runs `f` with the engine locked.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut InputCore<E>) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn register_device(&self, descriptor: DeviceDescriptor) -> Result<(), EngineError> {
        self.lock().register_device(descriptor)
    }

    pub fn accept_or_reject_touch(
        &self,
        device: DeviceId,
        touch_id: TouchId,
        resource: ResourceId,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        self.lock().accept_or_reject_touch(device, touch_id, resource, verdict)
    }

    pub fn window_destroyed(&self, window: WindowId) {
        self.lock().window_destroyed(window);
    }

    pub fn device_removed(&self, device: DeviceId) -> Result<(), EngineError> {
        self.lock().device_removed(device)
    }

    pub fn client_gone(&self, client: ClientId) {
        self.lock().client_gone(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TouchPhase;
    use crate::sim::{Rect, SimEnvironment};
    use crate::types::Point;

    fn server(capacity: usize) -> InputServer<SimEnvironment> {
        let env = SimEnvironment::new(WindowId(1), ClientId(0), Rect::new(0.0, 0.0, 100.0, 100.0));
        InputServer::new(env, &TouchConfig::default(), &QueueConfig { capacity })
    }

    #[test]
    fn test_drain_processes_in_order_and_skips_unknown_devices() {
        let server = server(8);
        server
            .register_device(DeviceDescriptor::touchscreen(DeviceId(2), "ts"))
            .unwrap();
        let sender = server.sender();
        sender
            .send(EventRecord::touch(DeviceId(9), TouchPhase::Begin, TouchId(1), Point::default()))
            .unwrap();
        sender
            .send(EventRecord::touch(DeviceId(2), TouchPhase::Begin, TouchId(1), Point::new(5.0, 5.0)))
            .unwrap();
        assert_eq!(server.drain(), 2);
        assert_eq!(server.drain(), 0);
        let physical = server.with_core(|core| core.device(DeviceId(2)).unwrap().physically_active_touches().len());
        assert_eq!(physical, 1);
    }

    #[test]
    fn test_bounded_queue_fills_and_drains() {
        let server = server(1);
        let sender = server.sender();
        sender.send(EventRecord::motion(DeviceId(2), Point::default())).unwrap();
        assert!(sender.tx.is_full());
        server.drain();
        assert!(sender.tx.is_empty());
    }
}
