#![allow(dead_code)]

use async_trait::async_trait;
use ingest::fields::INVOICE_NO;
use ingest::{EncodedDocument, ExtractionError, FieldValue, Fields, InvoiceExtractor, Upload};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

/// Scripted answer for one document body.
#[derive(Debug, Clone)]
pub enum Reply {
    Records(Vec<Fields>),
    Fail(String),
    /// Fail the first call, then fall back to the unscripted answer.
    FailOnce(String),
    Panic,
}

/// Test double keyed by document body.
///
/// Unscripted documents get one record whose invoice number is the body.
/// A gated extractor blocks each call until [`release`](Self::release)
/// hands out a permit.
#[derive(Default)]
pub struct ScriptedExtractor {
    replies: Mutex<HashMap<Vec<u8>, Reply>>,
    seen: Mutex<Vec<Vec<u8>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: Option<Semaphore>,
    started: Notify,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn reply(self, body: &[u8], reply: Reply) -> Self {
        self.replies.lock().insert(body.to_vec(), reply);
        self
    }

    /// Answer `body` with `count` records numbered `<body>-1`, `<body>-2`, ...
    pub fn records(self, body: &[u8], count: usize) -> Self {
        let name = String::from_utf8_lossy(body).to_string();
        let records = (1..=count)
            .map(|i| invoice(&format!("{}-{}", name, i)))
            .collect();
        self.reply(body, Reply::Records(records))
    }

    pub fn fail(self, body: &[u8], message: &str) -> Self {
        self.reply(body, Reply::Fail(message.to_string()))
    }

    pub fn fail_once(self, body: &[u8], message: &str) -> Self {
        self.reply(body, Reply::FailOnce(message.to_string()))
    }

    pub fn panics(self, body: &[u8]) -> Self {
        self.reply(body, Reply::Panic)
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Wait until an extraction call has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Bodies passed to the extractor, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .map(|b| String::from_utf8_lossy(b).to_string())
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        document: &EncodedDocument,
        columns: &[String],
    ) -> Result<Vec<Fields>, ExtractionError> {
        assert_eq!(columns.len(), 12, "file name is not sent for extraction");

        let (bytes, _) = document
            .decode()
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
        self.seen.lock().push(bytes.clone());

        let reply = self.replies.lock().get(&bytes).cloned();
        match reply {
            Some(Reply::FailOnce(_)) => {
                self.replies.lock().remove(&bytes);
            }
            Some(Reply::Panic) => panic!("extractor blew up"),
            _ => {}
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.notify_one();

        match &self.gate {
            Some(gate) => gate.acquire().await.expect("gate closed").forget(),
            None => tokio::task::yield_now().await,
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Records(records)) => Ok(records),
            Some(Reply::Fail(message)) | Some(Reply::FailOnce(message)) => {
                Err(ExtractionError::Request(message))
            }
            Some(Reply::Panic) | None => Ok(vec![invoice(&String::from_utf8_lossy(&bytes))]),
        }
    }
}

/// A record with just an invoice number.
pub fn invoice(number: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert(INVOICE_NO.to_string(), FieldValue::text(number));
    fields
}

pub fn pdf(name: &str, body: &str) -> Upload {
    Upload::new(name, "application/pdf", body.as_bytes().to_vec())
}

pub fn docx(name: &str, body: &str) -> Upload {
    Upload::new(
        name,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        body.as_bytes().to_vec(),
    )
}
