//! Ledger event stream.
//!
//! This module contains:
//! - `LedgerEvent` / `Frame`: decoded events and raw transport frames
//! - `EventHandler` trait: reacts to dispatched events
//! - `EventListener`: consumes a frame stream and dispatches with a concurrency cap
//! - `websocket`: the ledger's websocket subscription

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

pub mod listener;
pub mod websocket;

pub use listener::{EventListener, ListenerError, ListenerStats};

/// Discriminator of the ledger event announcing a new interchange message.
pub const IM_CREATED_EVENT: &str = "org.sysu.wf.IMCreatedEvent";

/// Raw frame received from the ledger transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Connection-level failure of the event stream. Ends the listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A single frame could not be decoded. The frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame is not a ledger event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{class} event has no string id")]
    MissingId { class: String },
}

/// Decoded ledger event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A counterparty created an interchange message.
    ImCreated { im_id: String },
    /// Any other event class; not acted upon.
    Other { class: String },
}

impl LedgerEvent {
    pub fn class(&self) -> &str {
        match self {
            LedgerEvent::ImCreated { .. } => IM_CREATED_EVENT,
            LedgerEvent::Other { class } => class,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "$class")]
    class: String,
    #[serde(default)]
    id: Option<Value>,
}

/// Decode one transport frame into a ledger event.
pub fn decode_frame(frame: &Frame) -> Result<LedgerEvent, DecodeError> {
    let text = match frame {
        Frame::Text(text) => text.as_str(),
        Frame::Binary(bytes) => std::str::from_utf8(bytes)?,
    };
    let raw: RawEvent = serde_json::from_str(text)?;

    if raw.class != IM_CREATED_EVENT {
        return Ok(LedgerEvent::Other { class: raw.class });
    }
    match raw.id {
        Some(Value::String(im_id)) if !im_id.is_empty() => Ok(LedgerEvent::ImCreated { im_id }),
        _ => Err(DecodeError::MissingId { class: raw.class }),
    }
}

/// Errors reported by event handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Stops the listener and, with it, the process.
    #[error("Fatal handler error: {0}")]
    Fatal(String),
}

/// Handler for events dispatched by the listener.
///
/// Each call runs on its own task; handlers share no state through the
/// listener.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: LedgerEvent) -> BoxFuture<'static, Result<(), HandlerError>>;
}
