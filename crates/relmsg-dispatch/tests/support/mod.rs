//! Shared in-memory test doubles for the dispatcher-loop scenario tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use relmsg_dispatch::{HandlerFailure, MessageHandler, Transport};

/// A handler whose outcomes are scripted call-by-call: the Nth call to
/// `handle` returns `script[N]`, repeating the last entry once exhausted.
pub struct ScriptedHandler {
    script: Vec<Result<Value, HandlerFailure>>,
    calls: Mutex<usize>,
}

impl ScriptedHandler {
    pub fn new(script: Vec<Result<Value, HandlerFailure>>) -> Self {
        Self {
            script,
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&self, _message_type: &str, _payload: &Value, _cancel: &CancellationToken) -> Result<Value, HandlerFailure> {
        let mut calls = self.calls.lock().unwrap();
        let index = (*calls).min(self.script.len() - 1);
        *calls += 1;
        self.script[index].clone()
    }
}

/// A transport that records every send and can be told to fail.
pub struct RecordingTransport {
    fail_with: Option<HandlerFailure>,
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    pub fn succeeding() -> Self {
        Self {
            fail_with: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: HandlerFailure) -> Self {
        Self {
            fail_with: Some(failure),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, destination: &str, payload: &Value) -> Result<(), HandlerFailure> {
        self.sent.lock().unwrap().push((destination.to_string(), payload.clone()));
        match &self.fail_with {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
