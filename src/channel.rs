use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::language::Language;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    RunCode { code: String, language: Language },
    SendInput { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    TermOutput {
        data: String,
    },
    TermStop {
        data: String,
        #[serde(default)]
        success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected(String),
    Message(InboundMessage),
}

/// Duplex link to the execution backend. Inbound events are queued by the
/// transport and drained by the UI loop in arrival order.
pub trait ExecutionChannel {
    fn emit(&mut self, message: OutboundMessage) -> io::Result<()>;
    fn drain_events_limited(&mut self, max_events: usize) -> Vec<ChannelEvent>;
}

pub fn encode_message(message: &OutboundMessage) -> io::Result<String> {
    let mut line = serde_json::to_string(message).map_err(io::Error::other)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line(line: &str) -> io::Result<InboundMessage> {
    serde_json::from_str::<InboundMessage>(line.trim())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

pub(crate) fn drain_limited<T>(rx: &Receiver<T>, max_events: usize) -> Vec<T> {
    let mut events = Vec::new();
    if max_events == 0 {
        return events;
    }
    while events.len() < max_events {
        let Ok(event) = rx.try_recv() else {
            break;
        };
        events.push(event);
    }
    events
}

/// JSON-lines client for a remote sandbox. A background thread keeps the
/// connection alive and forwards inbound lines.
pub struct RemoteChannel {
    writer: Arc<Mutex<Option<TcpStream>>>,
    event_rx: Receiver<ChannelEvent>,
}

impl RemoteChannel {
    pub fn connect(address: impl Into<String>) -> Self {
        let address = address.into();
        let (event_tx, event_rx) = mpsc::channel();
        let writer = Arc::new(Mutex::new(None));
        spawn_connection_loop(address, writer.clone(), event_tx);
        Self { writer, event_rx }
    }
}

impl ExecutionChannel for RemoteChannel {
    fn emit(&mut self, message: OutboundMessage) -> io::Result<()> {
        let line = encode_message(&message)?;
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| io::Error::other("execution channel writer lock poisoned"))?;
        let Some(stream) = guard.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "execution server is not connected",
            ));
        };
        stream.write_all(line.as_bytes())?;
        stream.flush()
    }

    fn drain_events_limited(&mut self, max_events: usize) -> Vec<ChannelEvent> {
        drain_limited(&self.event_rx, max_events)
    }
}

fn spawn_connection_loop(
    address: String,
    writer: Arc<Mutex<Option<TcpStream>>>,
    tx: Sender<ChannelEvent>,
) {
    thread::spawn(move || {
        let mut announced_down = false;
        loop {
            match TcpStream::connect(&address) {
                Ok(stream) => {
                    announced_down = false;
                    let reader_stream = match stream.try_clone() {
                        Ok(clone) => clone,
                        Err(err) => {
                            tracing::warn!(%address, "failed to clone sandbox stream: {err}");
                            thread::sleep(RECONNECT_DELAY);
                            continue;
                        }
                    };
                    if let Ok(mut guard) = writer.lock() {
                        *guard = Some(stream);
                    }
                    tracing::info!(%address, "connected to execution server");
                    if tx.send(ChannelEvent::Connected).is_err() {
                        return;
                    }
                    let reason = forward_lines(reader_stream, &tx);
                    if let Ok(mut guard) = writer.lock() {
                        *guard = None;
                    }
                    tracing::warn!(%address, "execution server connection closed: {reason}");
                    if tx.send(ChannelEvent::Disconnected(reason)).is_err() {
                        return;
                    }
                    announced_down = true;
                }
                Err(err) => {
                    tracing::debug!(%address, "connect failed: {err}");
                    if !announced_down {
                        announced_down = true;
                        if tx.send(ChannelEvent::Disconnected(err.to_string())).is_err() {
                            return;
                        }
                    }
                }
            }
            thread::sleep(RECONNECT_DELAY);
        }
    });
}

fn forward_lines(stream: TcpStream, tx: &Sender<ChannelEvent>) -> String {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => return err.to_string(),
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(&line) {
            Ok(message) => {
                if tx.send(ChannelEvent::Message(message)).is_err() {
                    return "client shut down".to_string();
                }
            }
            Err(err) => tracing::warn!("skipping malformed sandbox message: {err}"),
        }
    }
    "connection closed by server".to_string()
}

#[cfg(test)]
#[path = "../tests/unit/channel_tests.rs"]
mod tests;
