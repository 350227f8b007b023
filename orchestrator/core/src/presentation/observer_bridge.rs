// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Observer Bridge - pumps one WebSocket connection.
//!
//! Outbound: drains the observer queue filled by the registry, one JSON text
//! frame per message. When the queue ends (registry closed, role stopping) a
//! close frame is sent.
//!
//! Inbound: text frames go to `on_text`; a returned reply is sent to this
//! connection only. Everything else from the peer is ignored except close.
//! While a handler is pending the queue keeps draining, and the queue ending
//! abandons the handler.
//!
//! Any transport error ends the pump for this connection only. The caller
//! deregisters the observer afterwards.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::future::Future;
use tracing::debug;

use crate::infrastructure::observer_registry::ObserverReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The server closed the observer queue
    ClosedByServer,
    /// The peer sent a close frame or went away
    ClosedByPeer,
    /// Reading or writing the socket failed
    TransportError,
}

pub async fn pump<M, F, Fut>(
    socket: WebSocket,
    mut outbound: ObserverReceiver<M>,
    mut on_text: F,
) -> BridgeExit
where
    M: Serialize,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Option<M>>,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                if let Some(exit) = forward(&mut sink, queued).await {
                    return exit;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    // The queue ending abandons a pending handler.
                    let handler = on_text(text.as_str().to_owned());
                    tokio::pin!(handler);
                    let reply = loop {
                        tokio::select! {
                            reply = &mut handler => break reply,
                            queued = outbound.recv() => {
                                if let Some(exit) = forward(&mut sink, queued).await {
                                    return exit;
                                }
                            },
                        }
                    };
                    if let Some(reply) = reply {
                        if !send_json(&mut sink, &reply).await {
                            return BridgeExit::TransportError;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return BridgeExit::ClosedByPeer,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Observer socket read failed");
                    return BridgeExit::TransportError;
                }
            },
        }
    }
}

/// Send one queued message, or the close frame once the queue has ended.
async fn forward<S, M>(sink: &mut S, queued: Option<M>) -> Option<BridgeExit>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
    M: Serialize,
{
    match queued {
        Some(message) => (!send_json(sink, &message).await).then_some(BridgeExit::TransportError),
        None => {
            let _ = sink.send(Message::Close(None)).await;
            Some(BridgeExit::ClosedByServer)
        }
    }
}

async fn send_json<S, M>(sink: &mut S, message: &M) -> bool
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
    M: Serialize,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Skipping message that failed to encode");
            return true;
        }
    };

    match sink.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Observer socket write failed");
            false
        }
    }
}
