use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    /// The "type" discriminant of the JSON payload (notify, system_notice, ...)
    pub kind: String,
    pub data: Value,
    pub timestamp: Instant,
}

pub struct Connection {
    pub label: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
    handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(
        base_url: &str,
        recipient_id: &str,
        topics: Option<&str>,
        label: String,
    ) -> Result<Self> {
        let mut url = format!(
            "{}/notifications/stream?recipient_id={}",
            base_url, recipient_id
        );
        if let Some(topics) = topics {
            url.push_str(&format!("&topics={}", topics));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?.build();

        let reader_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        // The payload is a tagged JSON object; the SSE event
                        // name itself is always the default "message".
                        if let Ok(payload) = serde_json::from_str::<Value>(&event.data) {
                            let kind = payload["type"].as_str().unwrap_or("unknown").to_string();
                            let received = Event {
                                kind,
                                data: payload["data"].clone(),
                                timestamp: Instant::now(),
                            };

                            if tx.send(received).is_err() {
                                debug!("Event receiver dropped for {}", reader_label);
                                break;
                            }
                        }
                    }
                    Some(Ok(es::SSE::Comment(_))) => {
                        // Ignore comments (keep-alive)
                    }
                    Some(Err(e)) => {
                        warn!("Stream error for {}: {}", reader_label, e);
                    }
                    None => {
                        debug!("Stream ended for {}", reader_label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            event_rx: rx,
            handle,
        })
    }

    /// Tear down the stream. Aborting the reader task drops the underlying
    /// HTTP connection, which is what lets the server observe the disconnect.
    pub fn close(self) {
        self.handle.abort();
    }

    pub async fn wait_for_event(&mut self, kind: &str, timeout: Duration) -> Result<Event> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for event: {}", kind);
            }

            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) if event.kind == kind => {
                    return Ok(event);
                }
                Ok(Some(_)) => {
                    // Wrong event kind, keep waiting
                    continue;
                }
                Ok(None) => {
                    anyhow::bail!("Stream connection closed");
                }
                Err(_) => {
                    anyhow::bail!("Timeout waiting for event: {}", kind);
                }
            }
        }
    }

    /// Asserts that no event at all arrives within the window. Used to verify
    /// that notifications for other recipients stay isolated.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.event_rx.recv()).await {
            Ok(Some(event)) => {
                anyhow::bail!(
                    "{} unexpectedly received a {} event: {}",
                    self.label,
                    event.kind,
                    event.data
                )
            }
            Ok(None) => anyhow::bail!("Stream connection closed"),
            Err(_) => Ok(()),
        }
    }
}
