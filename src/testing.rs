//! Shared test doubles: scripted session transports and an instrumented
//! connector. Only compiled for tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::{Connect, SessionTransport, SshConfig};

/// One scripted transport event.
pub enum Event {
    /// Deliver these bytes.
    Chunk(Vec<u8>),
    /// Close the stream.
    Eof,
}

/// Scripted transport: each event is delivered after its delay, measured in
/// time spent inside `read_chunk`. Silence past the script's end is endless.
pub struct ScriptTransport {
    events: VecDeque<(Duration, Event)>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptTransport {
    pub fn new(events: Vec<(u64, Event)>) -> Self {
        Self {
            events: events
                .into_iter()
                .map(|(ms, ev)| (Duration::from_millis(ms), ev))
                .collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to the lines the code under test sent.
    pub fn sent(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }

    /// Handle to the closed flag.
    pub fn closed(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl SessionTransport for ScriptTransport {
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(line.to_string());
        Ok(())
    }

    async fn read_chunk(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match self.events.front_mut() {
            None => {
                tokio::time::sleep(max_wait).await;
                Ok(None)
            }
            Some((delay, _)) if *delay > max_wait => {
                *delay -= max_wait;
                tokio::time::sleep(max_wait).await;
                Ok(None)
            }
            Some((delay, _)) => {
                let delay = *delay;
                tokio::time::sleep(delay).await;
                let (_, event) = self.events.pop_front().unwrap();
                match event {
                    Event::Chunk(bytes) => Ok(Some(bytes)),
                    Event::Eof => Err(TransportError::Disconnected),
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector serving pre-scripted transports by host, counting every
/// connection attempt.
#[derive(Default)]
pub struct ScriptConnector {
    scripts: Mutex<HashMap<String, Vec<(u64, Event)>>>,
    refuse: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl ScriptConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the transport handed out for `host`.
    pub fn script(&self, host: &str, events: Vec<(u64, Event)>) {
        self.scripts.lock().unwrap().insert(host.to_string(), events);
    }

    /// Refuse connections to `host`.
    pub fn refuse(&self, host: &str) {
        self.refuse.lock().unwrap().push(host.to_string());
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connect for ScriptConnector {
    type Transport = ScriptTransport;

    async fn connect(&self, config: SshConfig) -> Result<ScriptTransport, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.refuse.lock().unwrap().contains(&config.host) {
            return Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }

        let events = self
            .scripts
            .lock()
            .unwrap()
            .remove(&config.host)
            .unwrap_or_default();
        Ok(ScriptTransport::new(events))
    }
}
