//! Shared stubs for the ingest integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use pokesync_core::{BusError, Document, PipelineResult, ValidationError};
use pokesync_ingest::{BusMessage, Consumer, ConsumerFactory, DocumentHandler, HandleSummary};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handler that rejects every document.
pub struct AlwaysFailHandler;

#[async_trait]
impl DocumentHandler for AlwaysFailHandler {
    async fn handle(&self, _document: &Document) -> PipelineResult<HandleSummary> {
        Err(ValidationError::InvalidValue {
            field: "document".to_string(),
            reason: "rejected by test handler".to_string(),
        }
        .into())
    }
}

pub fn message(offset: i64, payload: Vec<u8>) -> BusMessage {
    BusMessage {
        topic: "events".to_string(),
        partition: 0,
        offset,
        key: None,
        payload,
    }
}

pub type Script = VecDeque<Result<BusMessage, BusError>>;

/// What every consumer made by a [`ScriptedFactory`] did.
#[derive(Default)]
pub struct ConsumerLog {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub commits: Mutex<Vec<i64>>,
}

impl ConsumerLog {
    pub fn commits(&self) -> Vec<i64> {
        self.commits.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Hands out one script per connection. Once a script is exhausted,
/// `fetch` blocks until the loop is cancelled.
pub struct ScriptedFactory {
    scripts: Mutex<VecDeque<Script>>,
    pub log: Arc<ConsumerLog>,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<Vec<Result<BusMessage, BusError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(VecDeque::from).collect()),
            log: Arc::new(ConsumerLog::default()),
        }
    }
}

#[async_trait]
impl ConsumerFactory for ScriptedFactory {
    type Consumer = ScriptedConsumer;

    async fn connect(&self) -> Result<ScriptedConsumer, BusError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .map_err(|_| BusError::Connect {
                reason: "script lock poisoned".to_string(),
            })?
            .pop_front()
            .unwrap_or_default();
        Ok(ScriptedConsumer {
            script,
            log: Arc::clone(&self.log),
        })
    }
}

pub struct ScriptedConsumer {
    script: Script,
    log: Arc<ConsumerLog>,
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    async fn fetch(&mut self) -> Result<BusMessage, BusError> {
        match self.script.pop_front() {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError> {
        if let Ok(mut commits) = self.log.commits.lock() {
            commits.push(message.offset);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
