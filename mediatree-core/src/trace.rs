//! Structural dump side channel.
//!
//! The walker reports every node it visits, and handlers report decoded
//! scalar fields, to a [`TraceSink`]. The sink is write-only: nothing it does
//! can change what the parser produces.

use serde::Serialize;

use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TraceValue {
    Uint(u64),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<u8> for TraceValue {
    fn from(v: u8) -> Self {
        TraceValue::Uint(v as u64)
    }
}

impl From<u16> for TraceValue {
    fn from(v: u16) -> Self {
        TraceValue::Uint(v as u64)
    }
}

impl From<u32> for TraceValue {
    fn from(v: u32) -> Self {
        TraceValue::Uint(v as u64)
    }
}

impl From<u64> for TraceValue {
    fn from(v: u64) -> Self {
        TraceValue::Uint(v)
    }
}

impl From<i64> for TraceValue {
    fn from(v: i64) -> Self {
        TraceValue::Int(v)
    }
}

impl From<f64> for TraceValue {
    fn from(v: f64) -> Self {
        TraceValue::Float(v)
    }
}

impl From<&str> for TraceValue {
    fn from(v: &str) -> Self {
        TraceValue::Text(v.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(v: String) -> Self {
        TraceValue::Text(v)
    }
}

pub trait TraceSink {
    /// A node header was read; `known` is false for nodes routed to the
    /// unknown-node handler.
    fn node(&mut self, node: &Node, name: &str, known: bool);

    /// A decoded field of the most recent node.
    fn field(&mut self, name: &'static str, value: TraceValue);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn node(&mut self, _node: &Node, _name: &str, _known: bool) {}

    fn field(&mut self, _name: &'static str, _value: TraceValue) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub depth: usize,
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub known: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<(&'static str, TraceValue)>,
}

/// Collects the traversal in order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StructureDump {
    pub entries: Vec<TraceEntry>,
}

impl StructureDump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> impl Iterator<Item = &TraceEntry> {
        let name = name.to_string();
        self.entries.iter().filter(move |e| e.name == name)
    }

    /// Indented text rendering, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&"  ".repeat(e.depth.saturating_sub(1)));
            out.push_str(&format!("{} @{} +{}", e.name, e.offset, e.size));
            if !e.known {
                out.push_str(" (skipped)");
            }
            for (k, v) in &e.fields {
                match v {
                    TraceValue::Uint(x) => out.push_str(&format!(" {}={}", k, x)),
                    TraceValue::Int(x) => out.push_str(&format!(" {}={}", k, x)),
                    TraceValue::Float(x) => out.push_str(&format!(" {}={}", k, x)),
                    TraceValue::Text(x) => out.push_str(&format!(" {}={:?}", k, x)),
                }
            }
            out.push('\n');
        }
        out
    }
}

impl TraceSink for StructureDump {
    fn node(&mut self, node: &Node, name: &str, known: bool) {
        self.entries.push(TraceEntry {
            depth: node.depth,
            name: name.to_string(),
            offset: node.offset_start,
            size: node.size(),
            known,
            fields: Vec::new(),
        });
    }

    fn field(&mut self, name: &'static str, value: TraceValue) {
        if let Some(last) = self.entries.last_mut() {
            last.fields.push((name, value));
        }
    }
}
