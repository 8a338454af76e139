//! In-memory span recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use themis_core::trace::{TraceGeneration, TraceSink, TraceSpan};
use uuid::Uuid;

/// What kind of work a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Span,
    Generation,
}

/// One captured span or generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: RecordKind,
    pub name: String,
    /// Model name, for generations
    pub model: Option<String>,
    pub input: Value,
    pub output: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Shared store behind all handles produced by one sink.
#[derive(Default)]
struct Store {
    records: Vec<SpanRecord>,
}

impl Store {
    fn open(&mut self, record: SpanRecord) -> String {
        let id = record.id.clone();
        self.records.push(record);
        id
    }

    fn close(&mut self, id: &str, output: Option<Value>) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            if output.is_some() {
                record.output = output;
            }
            record.ended_at = Some(Utc::now());
        }
    }

    fn set_output(&mut self, id: &str, output: Value) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.output = Some(output);
        }
    }
}

/// A `TraceSink` that keeps every record in memory.
#[derive(Clone)]
pub struct RecordingSink {
    store: Arc<Mutex<Store>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
        }
    }

    /// Snapshot of everything recorded so far, in open order.
    pub fn records(&self) -> Vec<SpanRecord> {
        match self.store.lock() {
            Ok(store) => store.records.clone(),
            Err(poisoned) => poisoned.into_inner().records.clone(),
        }
    }

    /// Records with the given name, in open order.
    pub fn records_named(&self, name: &str) -> Vec<SpanRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .collect()
    }

    fn open(
        &self,
        parent_id: Option<String>,
        kind: RecordKind,
        name: &str,
        model: Option<String>,
        input: Value,
    ) -> String {
        let record = SpanRecord {
            id: Uuid::new_v4().to_string(),
            parent_id,
            kind,
            name: name.to_string(),
            model,
            input,
            output: None,
            started_at: Utc::now(),
            ended_at: None,
        };
        match self.store.lock() {
            Ok(mut store) => store.open(record),
            Err(poisoned) => poisoned.into_inner().open(record),
        }
    }

    fn with_store(&self, f: impl FnOnce(&mut Store)) {
        match self.store.lock() {
            Ok(mut store) => f(&mut store),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for RecordingSink {
    fn start_span(&self, name: &str, input: Value) -> Arc<dyn TraceSpan> {
        let id = self.open(None, RecordKind::Span, name, None, input);
        Arc::new(RecordedSpan {
            sink: self.clone(),
            id,
        })
    }
}

struct RecordedSpan {
    sink: RecordingSink,
    id: String,
}

impl TraceSpan for RecordedSpan {
    fn start_span(&self, name: &str, input: Value) -> Arc<dyn TraceSpan> {
        let id = self
            .sink
            .open(Some(self.id.clone()), RecordKind::Span, name, None, input);
        Arc::new(RecordedSpan {
            sink: self.sink.clone(),
            id,
        })
    }

    fn start_generation(
        &self,
        name: &str,
        model: &str,
        input: Value,
    ) -> Arc<dyn TraceGeneration> {
        let id = self.sink.open(
            Some(self.id.clone()),
            RecordKind::Generation,
            name,
            Some(model.to_string()),
            input,
        );
        Arc::new(RecordedGeneration {
            sink: self.sink.clone(),
            id,
        })
    }

    fn update(&self, output: Value) {
        let id = self.id.clone();
        self.sink.with_store(|store| store.set_output(&id, output));
    }

    fn end(&self) {
        let id = self.id.clone();
        self.sink.with_store(|store| store.close(&id, None));
    }
}

struct RecordedGeneration {
    sink: RecordingSink,
    id: String,
}

impl TraceGeneration for RecordedGeneration {
    fn end(&self, output: Value) {
        let id = self.id.clone();
        self.sink
            .with_store(|store| store.close(&id, Some(output)));
    }
}
