//! Websocket subscription to the ledger's event feed.
//!
//! The ledger pushes one JSON object per text frame. Control frames are
//! handled by tungstenite; a close frame ends the stream and a read error
//! surfaces once as `StreamError::Transport`.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use futures::{future, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{Frame, StreamError};
use crate::config::LedgerConfig;

/// Open the event subscription at `url` (e.g. `ws://127.0.0.1:3000`).
///
/// The TCP connect and the upgrade handshake together must finish within
/// `connect_timeout`; otherwise the dial fails with `StreamError::Connect`.
pub async fn connect(
    url: &str,
    connect_timeout: Duration,
) -> Result<impl Stream<Item = Result<Frame, StreamError>> + Send + 'static, StreamError> {
    let connect_error = |message: String| StreamError::Connect {
        url: url.to_string(),
        message,
    };

    let (socket, _response) = tokio::time::timeout(connect_timeout, connect_async(url))
        .await
        .map_err(|_| connect_error(format!("no handshake within {:?}", connect_timeout)))?
        .map_err(|e| connect_error(e.to_string()))?;

    info!(url = %url, "Subscribed to ledger event stream");

    Ok(socket.filter_map(|message| future::ready(to_frame(message))))
}

/// Dial the ledger's event feed, retrying failed or stalled dials with `backoff`.
pub async fn connect_with_retry(
    ledger: &LedgerConfig,
    backoff: ExponentialBuilder,
) -> Result<impl Stream<Item = Result<Frame, StreamError>> + Send + 'static, StreamError> {
    let url = ledger.events_url.as_str();
    let connect_timeout = ledger.connect_timeout();

    (|| async move { connect(url, connect_timeout).await })
        .retry(backoff)
        .notify(|e, delay| {
            warn!(url = %url, error = %e, ?delay, "Ledger event stream unavailable, retrying");
        })
        .await
}

fn to_frame(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Frame, StreamError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
        Ok(Message::Close(close)) => {
            info!(reason = ?close, "Ledger closed the event stream");
            None
        }
        Ok(other) => {
            debug!(kind = ?other, "Skipping control frame");
            None
        }
        Err(e) => Some(Err(StreamError::Transport(e.to_string()))),
    }
}
