//! Host wake-up signal and the dedicated host thread.
//!
//! An embedding application that owns its own event loop implements
//! [`HostSignal`] to schedule a drain on that loop. The standalone binary uses
//! [`HostThread`], which owns the host state on a named OS thread and drains the
//! bridge whenever a [`ChannelSignal`] fires.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::bridge::ExecutionBridge;
use crate::error::BridgeError;
use crate::registry::OperationRegistry;

/// Schedules `drain_and_execute` on the host thread. Must not block.
pub trait HostSignal: Send + Sync {
    fn raise(&self);
}

/// Signal that does nothing; the host drains on its own schedule.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignal;

impl HostSignal for NoopSignal {
    fn raise(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostEvent {
    Wake,
    Shutdown,
}

/// Wakes a [`HostThread`] through an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    sender: Sender<HostEvent>,
}

impl HostSignal for ChannelSignal {
    fn raise(&self) {
        if self.sender.send(HostEvent::Wake).is_err() {
            debug!("host thread is gone; wake-up dropped");
        }
    }
}

/// Channel connecting signals to a not-yet-started host thread.
#[derive(Debug)]
pub struct HostChannel {
    sender: Sender<HostEvent>,
    receiver: Receiver<HostEvent>,
}

impl Default for HostChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl HostChannel {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self { sender, receiver }
    }

    /// A signal to hand to [`ExecutionBridge::new`].
    pub fn signal(&self) -> ChannelSignal {
        ChannelSignal {
            sender: self.sender.clone(),
        }
    }
}

/// Owns the host state on a dedicated thread and executes bridge requests there.
#[derive(Debug)]
pub struct HostThread {
    sender: Sender<HostEvent>,
    join_handle: Option<JoinHandle<()>>,
}

impl HostThread {
    /// Start the host thread. `host_factory` runs on the new thread so `H` need not be `Send`.
    pub fn spawn<H, F>(bridge: Arc<ExecutionBridge>, channel: HostChannel, registry: OperationRegistry<H>, host_factory: F) -> Result<Self, BridgeError>
    where
        H: 'static,
        F: FnOnce() -> H + Send + 'static,
    {
        let HostChannel { sender, receiver } = channel;
        let join_handle = std::thread::Builder::new()
            .name("hostlink-host".to_string())
            .spawn(move || {
                let mut host = host_factory();
                run_host_loop(&bridge, &registry, &mut host, &receiver);
            })?;

        info!("host thread started");
        Ok(Self {
            sender,
            join_handle: Some(join_handle),
        })
    }

    /// Stop the loop after the current drain and wait for the thread to exit.
    ///
    /// Requests still queued stay `processing`.
    pub fn shutdown(mut self) -> Result<(), BridgeError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), BridgeError> {
        let _ = self.sender.send(HostEvent::Shutdown);
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|_| BridgeError::HostThreadPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for HostThread {
    fn drop(&mut self) {
        if self.stop_and_join().is_err() {
            warn!("host thread panicked before shutdown");
        }
    }
}

fn run_host_loop<H>(bridge: &ExecutionBridge, registry: &OperationRegistry<H>, host: &mut H, receiver: &Receiver<HostEvent>) {
    // Anything submitted before the thread came up.
    bridge.drain_and_execute(registry, host);
    while let Ok(event) = receiver.recv() {
        match event {
            HostEvent::Wake => {
                let executed = bridge.drain_and_execute(registry, host);
                debug!(executed, "host drain complete");
            }
            HostEvent::Shutdown => break,
        }
    }
    info!("host thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use hostlink_types::EventResult;
    use serde_json::{Map, Value, json};

    fn wait_for_terminal(bridge: &ExecutionBridge, event_id: &str) -> EventResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let result = bridge.status(event_id);
            if result.is_terminal() || Instant::now() > deadline {
                return result;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn host_thread_executes_signaled_requests() {
        let channel = HostChannel::new();
        let bridge = Arc::new(ExecutionBridge::new(Arc::new(channel.signal())));
        let mut registry = OperationRegistry::<Vec<String>>::new();
        registry.register_fn("push", |names: &mut Vec<String>, params| {
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            names.push(name);
            Ok(json!(names.len()))
        });
        let host = HostThread::spawn(Arc::clone(&bridge), channel, registry, Vec::new).unwrap();

        let mut params = Map::new();
        params.insert("name".into(), json!("alpha"));
        let first = bridge.submit("push", params.clone()).unwrap();
        let second = bridge.submit("push", params).unwrap();

        assert_eq!(wait_for_terminal(&bridge, &first), EventResult::Completed { result: json!(1) });
        assert_eq!(wait_for_terminal(&bridge, &second), EventResult::Completed { result: json!(2) });
        host.shutdown().unwrap();
    }

    #[test]
    fn requests_submitted_before_spawn_are_drained() {
        let channel = HostChannel::new();
        let bridge = Arc::new(ExecutionBridge::new(Arc::new(NoopSignal)));
        let event_id = bridge.submit("ping", Map::new()).unwrap();

        let mut registry = OperationRegistry::<()>::new();
        registry.register_fn("ping", |_: &mut (), _| Ok(json!("pong")));
        let host = HostThread::spawn(Arc::clone(&bridge), channel, registry, || ()).unwrap();

        assert_eq!(wait_for_terminal(&bridge, &event_id), EventResult::Completed { result: json!("pong") });
        host.shutdown().unwrap();
    }

    #[test]
    fn signal_after_shutdown_is_harmless() {
        let channel = HostChannel::new();
        let signal = channel.signal();
        let host = HostThread::spawn(Arc::new(ExecutionBridge::new(Arc::new(NoopSignal))), channel, OperationRegistry::<()>::new(), || ()).unwrap();
        host.shutdown().unwrap();
        signal.raise();
    }
}
