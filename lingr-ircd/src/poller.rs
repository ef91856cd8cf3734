//! Long-poll loop for one subscription generation.
//!
//! A [`Poller`] is started after every successful subscribe and stopped
//! (signalled, then awaited) before the next one, so at most one poll
//! loop per session is ever touching the shared counter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use lingr_sdk::LingrClient;
use lingr_sdk::types::{Event, Observation};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::bridge::{BridgeState, SharedBridge};
use crate::error::GatewayError;
use crate::transcript::{TranscriptEntry, TranscriptSink};
use crate::translate::{EventHandler, Translator, segments};

/// Everything a poll loop needs besides its generation number.
#[derive(Clone)]
pub struct PollContext {
    pub client: Arc<LingrClient>,
    pub bridge: SharedBridge,
    pub translator: Arc<Translator>,
    pub out: mpsc::Sender<String>,
    pub transcript: Option<TranscriptSink>,
    pub retry: Duration,
    pub session_id: String,
}

/// Handle to a running poll loop.
pub struct Poller {
    generation: u64,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(ctx: PollContext, generation: u64) -> Self {
        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run(ctx, generation, cancelled));
        Self {
            generation,
            cancel,
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Signal the loop and wait for it to exit. An in-flight observe is
    /// abandoned, not awaited.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            tracing::error!(generation = self.generation, "Poller panicked: {e}");
        }
    }
}

async fn run(ctx: PollContext, generation: u64, mut cancelled: watch::Receiver<bool>) {
    tracing::debug!(session_id = %ctx.session_id, generation, "Poller started");
    loop {
        let counter = ctx.bridge.lock().counter;
        let result = tokio::select! {
            _ = cancelled.changed() => break,
            r = ctx.client.observe(counter) => r,
        };

        match result {
            Ok(observation) => {
                let applied = apply(
                    &mut ctx.bridge.lock(),
                    generation,
                    observation,
                    ctx.translator.as_ref(),
                    ctx.translator.host(),
                );
                let Some((lines, entries)) = applied else {
                    break;
                };
                if let Some(ref sink) = ctx.transcript {
                    for entry in entries {
                        sink.record(entry);
                    }
                }
                for line in lines {
                    if ctx.out.send(line).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let transient = e.is_transient();
                let e = GatewayError::TransientPoll(e);
                if transient {
                    tracing::debug!(session_id = %ctx.session_id, generation, "{e}");
                } else {
                    tracing::warn!(session_id = %ctx.session_id, generation, "{e}");
                }
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = tokio::time::sleep(ctx.retry) => {}
                }
            }
        }
    }
    tracing::debug!(session_id = %ctx.session_id, generation, "Poller stopped");
}

/// Fold one observe reply into the shared state.
///
/// Returns the lines to deliver and the transcript entries to record, or
/// `None` if `generation` has been superseded.
pub fn apply<H: EventHandler + ?Sized>(
    state: &mut BridgeState,
    generation: u64,
    observation: Observation,
    handler: &H,
    host: &str,
) -> Option<(Vec<String>, Vec<TranscriptEntry>)> {
    if state.generation != generation {
        return None;
    }
    let mut lines = Vec::new();
    let mut entries = Vec::new();
    if !state.advance(observation.counter) {
        return Some((lines, entries));
    }

    for event in observation.events {
        let room_id = event.room_id().to_string();
        if state.room_mut(&room_id).is_none() {
            continue;
        }
        match event {
            Event::Message(message) => {
                if !state.seen.insert(&message.id) {
                    continue;
                }
                let Some(room) = state.room_mut(&room_id) else {
                    continue;
                };
                let out = handler.on_message(room, &message);
                if !out.is_empty() {
                    let now = Local::now();
                    entries.extend(segments(&message.text).map(|text| TranscriptEntry {
                        time: now,
                        speaker: message.speaker_id.clone(),
                        room: room_id.clone(),
                        network: host.to_string(),
                        text: text.to_string(),
                    }));
                }
                lines.extend(out);
            }
            Event::Presence(presence) => {
                if let Some(room) = state.room_mut(&room_id) {
                    lines.extend(handler.on_presence(room, &presence));
                }
            }
            Event::Membership(membership) => {
                if let Some(room) = state.room_mut(&room_id) {
                    lines.extend(handler.on_membership(room, &membership));
                }
            }
        }
    }
    Some((lines, entries))
}
