//! `newHeads` subscription over a node websocket.

use crate::blockchain::provider::{HeadStream, ProviderError};
use crate::models::NewHead;
use futures::{stream, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Connects to `url`, sends `eth_subscribe(["newHeads"])` and returns the
/// stream of announced heads. The stream yields one `Err` and then ends when
/// the socket closes or fails.
pub async fn subscribe_new_heads(url: &str) -> Result<HeadStream, ProviderError> {
    let (ws_stream, _response) = connect_async(url).await?;
    let (mut write, read) = ws_stream.split();

    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_subscribe",
        "params": ["newHeads"],
    });
    write.send(Message::Text(request.to_string().into())).await?;
    info!("Subscribed to newHeads");

    // The write half travels with the stream so the socket stays open.
    let heads = stream::unfold(Some((read, write)), |state| async move {
        let (mut read, write) = state?;
        loop {
            let failure = match read.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(message) => {
                        if let Some(head) = NewHead::from_message(&message) {
                            return Some((Ok(head), Some((read, write))));
                        }
                        if let Some(error) = message.get("error") {
                            ProviderError::Malformed(format!("subscription rejected: {}", error))
                        } else {
                            debug!("Ignoring websocket message: {}", message);
                            continue;
                        }
                    }
                    Err(e) => {
                        warn!("Undecodable websocket message: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    ProviderError::Transient(format!("websocket closed: {:?}", frame))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => e.into(),
                None => ProviderError::Transient("websocket stream ended".to_string()),
            };
            return Some((Err(failure), None));
        }
    });

    Ok(heads.boxed())
}
