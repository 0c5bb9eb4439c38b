// ABOUTME: Test doubles for parcel-delivery: a scripted delivery client and a recording status notifier.
// ABOUTME: Used by engine and binary tests to simulate outages without touching the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{DeliveryClient, DeliveryError, Payload};
use crate::status::{StatusEvent, StatusNotifier};

/// Canned outcome for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Deliver,
    Transport(String),
    MissingCredentials,
    Rejected(u16),
}

impl Scripted {
    fn into_result(self) -> Result<(), DeliveryError> {
        match self {
            Scripted::Deliver => Ok(()),
            Scripted::Transport(msg) => Err(DeliveryError::Transport(msg)),
            Scripted::MissingCredentials => Err(DeliveryError::MissingCredentials),
            Scripted::Rejected(status) => Err(DeliveryError::Rejected {
                status,
                body: "scripted rejection".to_string(),
            }),
        }
    }
}

/// A send the client saw, recorded whether or not it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub destination: String,
    pub payload: Payload,
}

impl SentMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::File { .. } => None,
        }
    }
}

struct ScriptState {
    sent: Vec<SentMessage>,
    next: VecDeque<Scripted>,
    uploads: Scripted,
    texts: Scripted,
}

/// A delivery client whose answers are set up front.
///
/// One-shot outcomes queued with [`respond_next`](Self::respond_next) are used
/// first, in call order. After that, file uploads and text messages fall
/// back to their standing outcomes, which default to success.
pub struct ScriptedDeliveryClient {
    state: Mutex<ScriptState>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedDeliveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDeliveryClient {
    /// A client that delivers everything.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                sent: Vec::new(),
                next: VecDeque::new(),
                uploads: Scripted::Deliver,
                texts: Scripted::Deliver,
            }),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// A client that answers every call with `outcome`.
    pub fn failing(outcome: Scripted) -> Self {
        let client = Self::new();
        client.set_uploads(outcome.clone());
        client.set_texts(outcome);
        client
    }

    /// Delay every send, to make overlapping drains observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_uploads(&self, outcome: Scripted) {
        self.lock().uploads = outcome;
    }

    pub fn set_texts(&self, outcome: Scripted) {
        self.lock().texts = outcome;
    }

    /// Queue a one-shot outcome for the next unscripted call.
    pub fn respond_next(&self, outcome: Scripted) {
        self.lock().next.push_back(outcome);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn uploads(&self) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.payload.is_file()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    /// Number of sends currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of sends observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryClient for ScriptedDeliveryClient {
    async fn send(&self, destination: &str, payload: &Payload) -> Result<(), DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = {
            let mut state = self.lock();
            state.sent.push(SentMessage {
                destination: destination.to_string(),
                payload: payload.clone(),
            });
            match state.next.pop_front() {
                Some(outcome) => outcome,
                None if payload.is_file() => state.uploads.clone(),
                None => state.texts.clone(),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.into_result()
    }
}

/// Notifier that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(StatusEvent::kind).collect()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn notify(&self, event: &StatusEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
