//! midir-backed hardware provider.
//!
//! Uses a dedicated I/O thread for platform thread-safety: midir
//! connections are created, used, and dropped on that thread only, with
//! commands arriving over a channel. Endpoint ids are `hw:<port name>`;
//! the port name is the only key that is stable across enumerations on
//! every backend midir supports.

use crate::error::ProviderError;
use crate::provider::{InboundSink, PortHandle, PortProvider};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use dashmap::DashMap;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use ostinato_catalog::{HardwareEnumerator, HardwarePort, PortDirection};
use ostinato_core::fold_key;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

pub const HARDWARE_PREFIX: &str = "hw:";

const CLIENT_NAME: &str = "ostinato";

enum IoCommand {
    OpenInput {
        token: u64,
        endpoint_id: String,
        port_name: String,
        sink: InboundSink,
        reply: Sender<Result<(), ProviderError>>,
    },
    OpenOutput {
        token: u64,
        port_name: String,
        reply: Sender<Result<(), ProviderError>>,
    },
    Send {
        token: u64,
        bytes: Vec<u8>,
    },
    Close {
        token: u64,
    },
    Shutdown,
}

/// Hardware provider for the `hw:` namespace.
pub struct MidirProvider {
    commands: Sender<IoCommand>,
    /// Tokens with a live connection, shared with the I/O thread so
    /// `send` can reject stale handles without a round trip.
    live: Arc<DashMap<u64, ()>>,
    next_token: AtomicU64,
}

impl Default for MidirProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MidirProvider {
    pub fn new() -> Self {
        let (commands, command_rx) = unbounded();
        let live: Arc<DashMap<u64, ()>> = Arc::new(DashMap::new());
        let live_clone = Arc::clone(&live);
        thread::spawn(move || Self::io_thread(command_rx, live_clone));
        Self {
            commands,
            live,
            next_token: AtomicU64::new(0),
        }
    }

    fn io_thread(commands: Receiver<IoCommand>, live: Arc<DashMap<u64, ()>>) {
        let mut inputs: HashMap<u64, MidiInputConnection<()>> = HashMap::new();
        let mut outputs: HashMap<u64, MidiOutputConnection> = HashMap::new();

        while let Ok(command) = commands.recv() {
            match command {
                IoCommand::OpenInput {
                    token,
                    endpoint_id,
                    port_name,
                    sink,
                    reply,
                } => {
                    let outcome = match Self::connect_input(&endpoint_id, &port_name, sink) {
                        Ok(connection) => {
                            inputs.insert(token, connection);
                            live.insert(token, ());
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(outcome);
                }
                IoCommand::OpenOutput {
                    token,
                    port_name,
                    reply,
                } => {
                    let outcome = match Self::connect_output(&port_name) {
                        Ok(connection) => {
                            outputs.insert(token, connection);
                            live.insert(token, ());
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(outcome);
                }
                IoCommand::Send { token, bytes } => {
                    if let Some(connection) = outputs.get_mut(&token) {
                        if let Err(e) = connection.send(&bytes) {
                            debug!(token, error = %e, "midir send failed");
                        }
                    }
                }
                IoCommand::Close { token } => {
                    live.remove(&token);
                    inputs.remove(&token);
                    outputs.remove(&token);
                }
                IoCommand::Shutdown => break,
            }
        }
        debug!("midir I/O thread stopped");
    }

    fn connect_input(
        endpoint_id: &str,
        port_name: &str,
        sink: InboundSink,
    ) -> Result<MidiInputConnection<()>, ProviderError> {
        let midi_input = MidiInput::new(CLIENT_NAME)
            .map_err(|e| ProviderError::BackendFault(e.to_string()))?;
        let wanted = fold_key(port_name);
        let port = midi_input
            .ports()
            .into_iter()
            .find(|p| {
                midi_input
                    .port_name(p)
                    .map(|n| fold_key(&n) == wanted)
                    .unwrap_or(false)
            })
            .ok_or_else(|| ProviderError::PortUnavailable(port_name.to_string()))?;

        let endpoint_id = endpoint_id.to_string();
        midi_input
            .connect(
                &port,
                "ostinato-input",
                move |_timestamp, message, _| {
                    sink(&endpoint_id, message, Utc::now());
                },
                (),
            )
            .map_err(|e| ProviderError::PortUnavailable(e.to_string()))
    }

    fn connect_output(port_name: &str) -> Result<MidiOutputConnection, ProviderError> {
        let midi_output = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| ProviderError::BackendFault(e.to_string()))?;
        let wanted = fold_key(port_name);
        let port = midi_output
            .ports()
            .into_iter()
            .find(|p| {
                midi_output
                    .port_name(p)
                    .map(|n| fold_key(&n) == wanted)
                    .unwrap_or(false)
            })
            .ok_or_else(|| ProviderError::PortUnavailable(port_name.to_string()))?;

        midi_output
            .connect(&port, "ostinato-output")
            .map_err(|e| ProviderError::PortUnavailable(e.to_string()))
    }

    fn port_name_of(endpoint_id: &str) -> &str {
        endpoint_id
            .get(HARDWARE_PREFIX.len()..)
            .unwrap_or(endpoint_id)
    }

    fn open(
        &self,
        endpoint_id: &str,
        build: impl FnOnce(u64, Sender<Result<(), ProviderError>>) -> IoCommand,
    ) -> Result<PortHandle, ProviderError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (reply, reply_rx) = bounded(1);
        self.commands
            .send(build(token, reply))
            .map_err(|_| ProviderError::BackendFault("midir I/O thread not running".into()))?;
        reply_rx
            .recv()
            .map_err(|_| ProviderError::BackendFault("midir I/O thread not running".into()))??;
        Ok(PortHandle {
            endpoint_id: endpoint_id.to_string(),
            token,
        })
    }
}

impl PortProvider for MidirProvider {
    fn name(&self) -> &str {
        "midir"
    }

    fn owns(&self, endpoint_id: &str) -> bool {
        fold_key(endpoint_id).starts_with(HARDWARE_PREFIX)
    }

    fn open_input(
        &self,
        endpoint_id: &str,
        sink: InboundSink,
    ) -> Result<PortHandle, ProviderError> {
        let endpoint = endpoint_id.to_string();
        let port_name = Self::port_name_of(endpoint_id).to_string();
        self.open(endpoint_id, move |token, reply| IoCommand::OpenInput {
            token,
            endpoint_id: endpoint,
            port_name,
            sink,
            reply,
        })
    }

    fn open_output(&self, endpoint_id: &str) -> Result<PortHandle, ProviderError> {
        let port_name = Self::port_name_of(endpoint_id).to_string();
        self.open(endpoint_id, move |token, reply| IoCommand::OpenOutput {
            token,
            port_name,
            reply,
        })
    }

    fn send(&self, handle: &PortHandle, bytes: &[u8]) -> Result<(), ProviderError> {
        if !self.live.contains_key(&handle.token) {
            return Err(ProviderError::PortClosed);
        }
        self.commands
            .send(IoCommand::Send {
                token: handle.token,
                bytes: bytes.to_vec(),
            })
            .map_err(|_| ProviderError::BackendFault("midir I/O thread not running".into()))
    }

    fn close(&self, handle: &PortHandle) {
        self.live.remove(&handle.token);
        let _ = self.commands.send(IoCommand::Close {
            token: handle.token,
        });
    }
}

impl HardwareEnumerator for MidirProvider {
    /// List current hardware ports in both directions. Enumeration runs
    /// on the calling thread; midir allows that even while connections
    /// live on the I/O thread.
    fn enumerate(&self) -> Vec<HardwarePort> {
        let mut ports = Vec::new();

        match MidiInput::new(CLIENT_NAME) {
            Ok(midi_input) => {
                for port in midi_input.ports() {
                    if let Ok(name) = midi_input.port_name(&port) {
                        ports.push(HardwarePort {
                            id: format!("{HARDWARE_PREFIX}{name}"),
                            name,
                            direction: PortDirection::Input,
                        });
                    }
                }
            }
            Err(e) => warn!(error = %e, "midir input enumeration failed"),
        }

        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_output) => {
                for port in midi_output.ports() {
                    if let Ok(name) = midi_output.port_name(&port) {
                        ports.push(HardwarePort {
                            id: format!("{HARDWARE_PREFIX}{name}"),
                            name,
                            direction: PortDirection::Output,
                        });
                    }
                }
            }
            Err(e) => warn!(error = %e, "midir output enumeration failed"),
        }

        ports
    }
}

impl Drop for MidirProvider {
    fn drop(&mut self) {
        let _ = self.commands.send(IoCommand::Shutdown);
    }
}
