//! Audit sinks for membership events
//!
//! The protocol reports who joined, who is suspected and who was removed from
//! each node's point of view. Sinks are fire-and-forget: nothing they do can
//! influence the protocol.
use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::node::NodeId;

/// A membership change observed by one node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "subject", rename_all = "snake_case")]
pub enum AuditEvent {
    NodeAdd(NodeId),
    NodeRemove(NodeId),
    NodeSuspect(NodeId),
    Note(String),
}

/// Receiver of membership events
pub trait AuditSink: Send + Sync {
    fn on_node_add(&self, observer: NodeId, subject: NodeId);
    fn on_node_remove(&self, observer: NodeId, subject: NodeId);
    fn on_node_suspect(&self, observer: NodeId, subject: NodeId);
    fn on_note(&self, observer: NodeId, text: &str);

    fn record(&self, observer: NodeId, event: &AuditEvent) {
        match event {
            AuditEvent::NodeAdd(subject) => self.on_node_add(observer, *subject),
            AuditEvent::NodeRemove(subject) => self.on_node_remove(observer, *subject),
            AuditEvent::NodeSuspect(subject) => self.on_node_suspect(observer, *subject),
            AuditEvent::Note(text) => self.on_note(observer, text),
        }
    }
}

/// Emits each event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditSink for TracingAuditLog {
    fn on_node_add(&self, observer: NodeId, subject: NodeId) {
        info!(%observer, %subject, "[{}] Node {} joined", observer, subject);
    }

    fn on_node_remove(&self, observer: NodeId, subject: NodeId) {
        info!(%observer, %subject, "[{}] Node {} removed", observer, subject);
    }

    fn on_node_suspect(&self, observer: NodeId, subject: NodeId) {
        info!(%observer, %subject, "[{}] Node {} suspected", observer, subject);
    }

    fn on_note(&self, observer: NodeId, text: &str) {
        info!(%observer, "[{}] {}", observer, text);
    }
}

#[derive(Debug, Serialize)]
struct AuditLine<'a> {
    at: DateTime<Utc>,
    observer: NodeId,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Writes one JSON object per event to any writer
pub struct JsonLinesAuditLog<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAuditLog<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_event(&self, observer: NodeId, event: &AuditEvent) {
        let line = AuditLine {
            at: Utc::now(),
            observer,
            event,
        };
        let result = serde_json::to_vec(&line).map_err(std::io::Error::from).and_then(|bytes| {
            let mut writer = self
                .writer
                .lock()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            writer.write_all(&bytes)?;
            writer.write_all(b"\n")?;
            writer.flush()
        });
        if let Err(e) = result {
            warn!("[{}] Failed to write audit record: {}", observer, e);
        }
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditLog<W> {
    fn on_node_add(&self, observer: NodeId, subject: NodeId) {
        self.write_event(observer, &AuditEvent::NodeAdd(subject));
    }

    fn on_node_remove(&self, observer: NodeId, subject: NodeId) {
        self.write_event(observer, &AuditEvent::NodeRemove(subject));
    }

    fn on_node_suspect(&self, observer: NodeId, subject: NodeId) {
        self.write_event(observer, &AuditEvent::NodeSuspect(subject));
    }

    fn on_note(&self, observer: NodeId, text: &str) {
        self.write_event(observer, &AuditEvent::Note(text.to_string()));
    }

    fn record(&self, observer: NodeId, event: &AuditEvent) {
        self.write_event(observer, event);
    }
}

/// Keeps every event in arrival order
#[derive(Debug, Default)]
pub struct RecordingAuditLog {
    records: Mutex<Vec<(NodeId, AuditEvent)>>,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(NodeId, AuditEvent)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Subjects `observer` reported with events matching `filter`
    pub fn subjects_seen_by(
        &self,
        observer: NodeId,
        filter: impl Fn(&AuditEvent) -> Option<NodeId>,
    ) -> Vec<NodeId> {
        self.records()
            .iter()
            .filter(|(who, _)| *who == observer)
            .filter_map(|(_, event)| filter(event))
            .collect()
    }

    fn push(&self, observer: NodeId, event: AuditEvent) {
        if let Ok(mut records) = self.records.lock() {
            records.push((observer, event));
        }
    }
}

impl AuditSink for RecordingAuditLog {
    fn on_node_add(&self, observer: NodeId, subject: NodeId) {
        self.push(observer, AuditEvent::NodeAdd(subject));
    }

    fn on_node_remove(&self, observer: NodeId, subject: NodeId) {
        self.push(observer, AuditEvent::NodeRemove(subject));
    }

    fn on_node_suspect(&self, observer: NodeId, subject: NodeId) {
        self.push(observer, AuditEvent::NodeSuspect(subject));
    }

    fn on_note(&self, observer: NodeId, text: &str) {
        self.push(observer, AuditEvent::Note(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> NodeId {
        NodeId::new([1, 0, 0, 0], 0)
    }

    fn subject() -> NodeId {
        NodeId::new([2, 0, 0, 0], 0)
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingAuditLog::new();
        sink.record(observer(), &AuditEvent::NodeAdd(subject()));
        sink.record(observer(), &AuditEvent::NodeSuspect(subject()));
        sink.record(observer(), &AuditEvent::NodeRemove(subject()));

        assert_eq!(
            sink.records(),
            vec![
                (observer(), AuditEvent::NodeAdd(subject())),
                (observer(), AuditEvent::NodeSuspect(subject())),
                (observer(), AuditEvent::NodeRemove(subject())),
            ]
        );
        let removed = sink.subjects_seen_by(observer(), |e| match e {
            AuditEvent::NodeRemove(id) => Some(*id),
            _ => None,
        });
        assert_eq!(removed, vec![subject()]);
    }

    #[test]
    fn test_json_lines_sink_writes_one_object_per_event() {
        let sink = JsonLinesAuditLog::new(Vec::new());
        sink.on_node_add(observer(), subject());
        sink.on_note(observer(), "joined");

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "node_add");
        assert_eq!(lines[0]["subject"]["port"], 0);
        assert_eq!(lines[1]["event"], "note");
        assert_eq!(lines[1]["subject"], "joined");
        assert!(lines[0]["at"].is_string());
    }
}
