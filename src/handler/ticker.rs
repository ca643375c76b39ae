//! Ticker feed: one numbered event per interval.
//!
//! Useful for demos and liveness checks. Clients that reconnect with a
//! `Last-Event-ID` header resume counting after the id they last saw.

use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::MissedTickBehavior;

use super::{EventHandler, StreamContext};
use crate::config::TickerConfig;
use crate::error::StreamError;
use crate::streaming::{Event, EventWriter};

/// Emits `{"seq":n,"unix_ms":t}` under event name `tick` on a fixed interval.
pub struct TickerHandler {
    interval: Duration,
    event_name: String,
    max_events: Option<u64>,
}

impl TickerHandler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            event_name: "tick".to_string(),
            max_events: None,
        }
    }

    pub fn from_config(config: &TickerConfig) -> Self {
        Self {
            interval: config.interval(),
            event_name: config.event_name.clone(),
            max_events: config.max_events,
        }
    }

    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = name.into();
        self
    }

    /// Stop after `n` events.
    pub fn with_max_events(mut self, n: u64) -> Self {
        self.max_events = Some(n);
        self
    }

    fn first_seq(ctx: &StreamContext) -> u64 {
        ctx.request()
            .last_event_id()
            .and_then(|id| id.parse::<u64>().ok())
            .map_or(1, |last| last.saturating_add(1))
    }
}

#[async_trait]
impl EventHandler for TickerHandler {
    fn name(&self) -> &'static str {
        "ticker"
    }

    async fn serve(
        &self,
        events: &mut EventWriter,
        ctx: &mut StreamContext,
    ) -> Result<(), StreamError> {
        let conn_id = ctx.conn_id();
        let mut seq = Self::first_seq(ctx);
        let mut sent: u64 = 0;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(conn_id, first_seq = seq, "Ticker started");

        loop {
            if self.max_events.is_some_and(|max| sent >= max) {
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = ctx.shutdown_signaled() => {
                    tracing::debug!(conn_id, sent, "Ticker stopping for shutdown");
                    return Ok(());
                }

                _ = ticker.tick() => {}
            }

            let event = Event::new()
                .with_id(seq.to_string())
                .with_name(self.event_name.as_str());
            let payload = json!({ "seq": seq, "unix_ms": unix_millis() }).to_string();

            events.send(&event, payload.as_bytes()).await?;

            seq += 1;
            sent += 1;
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
