// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control role command handling.
//!
//! The same `{type, data}` protocol is spoken on two transports: the control
//! port's WebSocket (only while this instance owns the port) and the process's
//! stdin/stdout, which is the primary interface and keeps working when the
//! port was deferred to another instance.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::domain::atom::Atom;
use crate::domain::atom_sink::AtomSink;
use crate::domain::events::{envelope_types, Envelope};
use crate::infrastructure::observer_registry::{ObserverHandle, ObserverId, ObserverRegistry};

pub struct ControlService {
    sink: Arc<dyn AtomSink>,
    observers: Mutex<ObserverRegistry<Envelope>>,
}

impl ControlService {
    pub fn new(sink: Arc<dyn AtomSink>) -> Self {
        Self {
            sink,
            observers: Mutex::new(ObserverRegistry::new()),
        }
    }

    pub fn register(&self, handle: ObserverHandle<Envelope>) -> ObserverId {
        self.observers.lock().register(handle)
    }

    pub fn deregister(&self, id: ObserverId) -> bool {
        self.observers.lock().deregister(id)
    }

    pub fn broadcast(&self, envelope: &Envelope) -> usize {
        self.observers.lock().broadcast(envelope)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn close_observers(&self) -> usize {
        self.observers.lock().close_all()
    }

    /// Handle one raw frame. Frames that are not envelopes are ignored.
    pub async fn handle_text(&self, text: &str) -> Option<Envelope> {
        match Envelope::parse(text) {
            Some(envelope) => Some(self.handle(envelope).await),
            None => {
                debug!("Ignoring frame that is not a {{type, data}} envelope");
                None
            }
        }
    }

    /// Handle one envelope and produce the reply for its sender
    pub async fn handle(&self, envelope: Envelope) -> Envelope {
        match envelope.kind.as_str() {
            envelope_types::ATOM => self.handle_atom(envelope.data).await,
            envelope_types::SNAPSHOT => match self.sink.snapshot().await {
                Ok(snapshot) => match serde_json::to_value(&snapshot) {
                    Ok(data) => Envelope::new(envelope_types::ATOMS_UPDATE, data),
                    Err(e) => Envelope::error(format!("failed to encode snapshot: {}", e)),
                },
                Err(e) => {
                    warn!(role = "control", error = %e, "Snapshot unavailable, graph role degraded");
                    Envelope::error(e.to_string())
                }
            },
            envelope_types::PING => Envelope::new(envelope_types::PONG, envelope.data),
            other => Envelope::error(format!("unknown message type '{}'", other)),
        }
    }

    async fn handle_atom(&self, data: serde_json::Value) -> Envelope {
        let atom = match serde_json::from_value::<Atom>(data) {
            Ok(atom) => atom,
            Err(e) => return Envelope::error(format!("invalid atom: {}", e)),
        };

        let atom = match atom.validate() {
            Ok(atom) => atom,
            Err(e) => return Envelope::error(e.to_string()),
        };

        let id = atom.id.clone();
        let kind = atom.kind;
        match self.sink.publish_atom(atom).await {
            Ok(()) => {
                self.broadcast(&Envelope::new(
                    envelope_types::ATOM_PUBLISHED,
                    json!({ "id": id, "kind": kind }),
                ));
                Envelope::new(envelope_types::ATOM_ACCEPTED, json!({ "id": id }))
            }
            Err(e) => {
                warn!(role = "control", atom = %id, error = %e, "Atom not delivered to graph role");
                Envelope::error(e.to_string())
            }
        }
    }
}

/// Serve the envelope protocol as newline-delimited JSON until `reader` hits
/// EOF. Returns the number of envelopes handled.
pub async fn run_stdio_loop<R, W>(
    service: &ControlService,
    reader: R,
    mut writer: W,
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reply) = service.handle_text(&line).await {
            handled += 1;
            let mut out = serde_json::to_string(&reply).map_err(std::io::Error::other)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
    }

    info!(handled, "Control input closed");
    Ok(handled)
}
