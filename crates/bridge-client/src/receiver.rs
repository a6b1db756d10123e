//! Event receiver with polling.

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::types::*;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Back-off applied after a failed poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Event receiver that polls a bridge session for new events.
pub struct EventReceiver {
    client: BridgeClient,
    session_id: String,
    poll_interval: Duration,
}

impl EventReceiver {
    /// Create a new event receiver.
    pub fn new(client: BridgeClient, session_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            poll_interval,
        }
    }

    /// Start receiving events as an async stream.
    ///
    /// The stream ends after a `close` event or once the bridge no longer
    /// knows the session.
    pub fn stream(self) -> impl Stream<Item = BridgeEvent> {
        async_stream::stream! {
            loop {
                match self.client.events(&self.session_id).await {
                    Ok(events) => {
                        for event in events {
                            let closed = event.is_close();
                            debug!(session_id = %self.session_id, ?event, "Bridge event");
                            yield event;
                            if closed {
                                return;
                            }
                        }
                    }
                    Err(BridgeError::SessionNotFound(_)) => {
                        debug!(session_id = %self.session_id, "Bridge session gone, ending stream");
                        return;
                    }
                    Err(e) => {
                        error!("Event poll error: {}", e);
                        sleep(ERROR_BACKOFF).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
