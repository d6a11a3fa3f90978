//! Trigger dispatch from the extension to firmware trigger slots.
//!
//! A trigger only reaches the firmware when the host currently routes the addressed
//! output's trigger source to the extension. Otherwise the request is accepted and
//! has no effect: routing is owned by the host, not by this layer.

use crate::data::{PushOutcome, TriggerQueue, TriggerRequest};
use crate::error::{AppResult, ChanTrigError};
use crate::host::{Advisory, HostChannel, OutputRouting, TriggerSource};
use crate::registry::{OutputTarget, TRIGGER_SLOTS};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Successful result of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Queued for the firmware.
    Queued,
    /// The output is not routed to the extension; nothing happened.
    NotRouted,
    /// The trigger queue was full; the request was dropped.
    Dropped,
}

/// Validates and queues trigger requests.
pub struct TriggerDispatcher {
    queue: TriggerQueue,
    routing: Arc<dyn OutputRouting>,
    host: Arc<dyn HostChannel>,
    dropped: AtomicU64,
}

impl TriggerDispatcher {
    /// Dispatcher over a queue of `capacity` requests.
    pub fn new(
        capacity: usize,
        routing: Arc<dyn OutputRouting>,
        host: Arc<dyn HostChannel>,
    ) -> Self {
        Self {
            queue: TriggerQueue::new(capacity),
            routing,
            host,
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue shared with the firmware.
    pub fn queue(&self) -> &TriggerQueue {
        &self.queue
    }

    /// Requests dropped on a full queue so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Fire trigger `trigger_index` of `target`.
    ///
    /// Out-of-range channels or trigger indices fail with `InvalidArgument` and
    /// leave the queue untouched.
    pub fn dispatch(&self, target: OutputTarget, trigger_index: u8) -> AppResult<TriggerOutcome> {
        if !target.is_valid() {
            return Err(ChanTrigError::InvalidArgument(format!(
                "{target} does not exist"
            )));
        }
        if trigger_index >= TRIGGER_SLOTS {
            return Err(ChanTrigError::InvalidArgument(format!(
                "trigger index {trigger_index} out of range (max {})",
                TRIGGER_SLOTS - 1
            )));
        }

        if self.routing.trigger_source(target) != TriggerSource::Extension {
            debug!(%target, trigger_index, "Trigger ignored, output not routed to extension");
            return Ok(TriggerOutcome::NotRouted);
        }

        let request = TriggerRequest {
            target,
            trigger_index,
        };
        match self.queue.push(request) {
            PushOutcome::Rejected => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.host.comment(&Advisory::TriggerDropped {
                    target,
                    trigger_index,
                });
                Ok(TriggerOutcome::Dropped)
            }
            PushOutcome::Stored | PushOutcome::Evicted => Ok(TriggerOutcome::Queued),
        }
    }
}
