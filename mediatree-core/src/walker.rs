//! Generic tree walker and per-format dispatch tables.
//!
//! Each container format provides a header codec and a static table mapping
//! node discriminants to handler functions. The walker reads one header per
//! iteration, dispatches it, and lets the resync guard put the cursor back on
//! the node boundary before the next iteration:
//!
//! ```text
//! ENTER(parent) -> [READ_HEADER -> DISPATCH -> RESYNC]* -> EXIT
//! ```

use std::collections::HashMap;

use crate::bitstream::BitCursor;
use crate::config::ParseOptions;
use crate::error::Result;
use crate::jumpy::jumpy;
use crate::node::{Node, NodeId};
use crate::params::ParameterSetDecoder;
use crate::trace::{TraceSink, TraceValue};

/// Node handler. The node is mutable so a handler can shorten an
/// unknown-size node once its real end is known.
pub type Handler<S> = fn(&mut S, &mut Walk<'_>, &mut Node) -> Result<()>;

/// Decodes one node header at the cursor position.
pub trait HeaderCodec {
    /// Smallest possible header; a scope with fewer bytes left is exhausted.
    const MIN_HEADER_SIZE: u64;

    fn read_header(cursor: &mut BitCursor, parent: &Node) -> Result<Node>;
}

/// A container format's parse state plus its static dispatch table.
pub trait Format: Sized + 'static {
    type Header: HeaderCodec;

    fn dispatch_table() -> &'static DispatchTable<Self>;

    /// Whether `child`, read inside an unknown-size `parent`, actually
    /// starts the parent's next sibling.
    fn closes_unknown_scope(_parent: &Node, _child: &Node) -> bool {
        false
    }
}

struct Entry<S> {
    name: &'static str,
    handler: Handler<S>,
}

pub struct DispatchTable<S> {
    entries: HashMap<NodeId, Entry<S>>,
    unknown: Handler<S>,
}

impl<S> DispatchTable<S> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            unknown: skip_unknown::<S>,
        }
    }

    pub fn on(mut self, id: NodeId, name: &'static str, handler: Handler<S>) -> Self {
        self.entries.insert(id, Entry { name, handler });
        self
    }

    /// Register a node that is only named, so the dump shows it as known
    /// while its payload is skipped.
    pub fn skip(self, id: NodeId, name: &'static str) -> Self {
        self.on(id, name, skip_unknown::<S>)
    }

    pub fn name(&self, id: &NodeId) -> Option<&'static str> {
        self.entries.get(id).map(|e| e.name)
    }

    pub fn handler(&self, id: &NodeId) -> Option<Handler<S>> {
        self.entries.get(id).map(|e| e.handler)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S> Default for DispatchTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// The "unknown node" handler: bounds are already traced, payload is left to
/// the resync guard.
pub fn skip_unknown<S>(_state: &mut S, _walk: &mut Walk<'_>, _node: &mut Node) -> Result<()> {
    Ok(())
}

/// Traversal context shared by every handler of one parse.
pub struct Walk<'a> {
    pub cursor: BitCursor,
    pub options: &'a ParseOptions,
    sink: &'a mut dyn TraceSink,
    decoder: Option<&'a dyn ParameterSetDecoder>,
    running: bool,
}

impl<'a> Walk<'a> {
    pub fn new(
        cursor: BitCursor,
        options: &'a ParseOptions,
        sink: &'a mut dyn TraceSink,
        decoder: Option<&'a dyn ParameterSetDecoder>,
    ) -> Self {
        Self {
            cursor,
            options,
            sink,
            decoder,
            running: true,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.cursor.total_size()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// End the whole walk after the current handler returns.
    pub fn stop(&mut self) {
        if self.running {
            tracing::debug!(offset = self.cursor.absolute_byte_offset(), "walk stopped early");
        }
        self.running = false;
    }

    /// Clear the stop flag when [`ParseOptions::stop_when_indexed`] allows it.
    pub fn stop_if_indexed(&mut self) {
        if self.options.stop_when_indexed {
            self.stop();
        }
    }

    pub fn decoder(&self) -> Option<&'a dyn ParameterSetDecoder> {
        self.decoder
    }

    pub fn trace_node(&mut self, node: &Node, name: &str, known: bool) {
        self.sink.node(node, name, known);
    }

    pub fn field(&mut self, name: &'static str, value: impl Into<TraceValue>) {
        self.sink.field(name, value.into());
    }

    /// Payload bytes of `node`, clamped to the file.
    pub fn payload(&self, node: &Node) -> bytes::Bytes {
        let start = node.payload_offset().min(self.file_size());
        let end = node.offset_end.min(self.file_size());
        self.cursor
            .slice(start, end.saturating_sub(start))
            .unwrap_or_default()
    }

    /// Bytes left in `node` from the cursor position.
    pub fn remaining_in(&self, node: &Node) -> u64 {
        node.offset_end
            .min(self.file_size())
            .saturating_sub(self.cursor.absolute_byte_offset())
    }
}

/// Walk the top level of the file.
pub fn walk_root<F: Format>(state: &mut F, walk: &mut Walk<'_>) -> Result<Node> {
    let mut root = Node::root(walk.file_size());
    walk.cursor.goto_byte_offset(0)?;
    walk_children(state, walk, &mut root)?;
    Ok(root)
}

/// One scope of the state machine: every child of `parent`, in order.
pub fn walk_children<F: Format>(state: &mut F, walk: &mut Walk<'_>, parent: &mut Node) -> Result<()> {
    let min = F::Header::MIN_HEADER_SIZE;

    while walk.running {
        let bound = parent.offset_end.min(walk.file_size());
        let pos = walk.cursor.absolute_byte_offset();
        if pos + min > bound {
            break;
        }

        let mut node = match F::Header::read_header(&mut walk.cursor, parent) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!(
                    offset = pos,
                    parent = %parent.id,
                    error = %e,
                    "unreadable node header, leaving scope"
                );
                break;
            }
        };
        node.depth = parent.depth + 1;

        if parent.unknown_size && F::closes_unknown_scope(parent, &node) {
            parent.offset_end = node.offset_start;
            walk.cursor.goto_byte_offset(node.offset_start)?;
            break;
        }

        dispatch(state, walk, parent, &mut node)?;
    }

    Ok(())
}

/// Run the handler registered for `node`, then resync to its end.
pub fn dispatch<F: Format>(state: &mut F, walk: &mut Walk<'_>, parent: &Node, node: &mut Node) -> Result<()> {
    let table = F::dispatch_table();
    let name = table
        .name(&node.id)
        .map(str::to_string)
        .unwrap_or_else(|| node.id.to_string());
    let handler = if node.depth > walk.options.max_depth {
        tracing::debug!(node = %name, depth = node.depth, "nesting too deep, skipping");
        None
    } else {
        table.handler(&node.id)
    };

    walk.trace_node(node, &name, handler.is_some());
    tracing::trace!(
        node = %name,
        offset = node.offset_start,
        size = node.size(),
        depth = node.depth,
        "node"
    );

    let handler = handler.unwrap_or(table.unknown);
    if let Err(e) = handler(state, walk, node) {
        if !e.is_recoverable() {
            return Err(e);
        }
        tracing::warn!(
            node = %name,
            offset = node.offset_start,
            end = node.offset_end,
            error = %e,
            "node handler failed, resyncing"
        );
    }

    if let Err(e) = jumpy(&mut walk.cursor, parent, node) {
        tracing::warn!(node = %name, error = %e, "resync failed");
        walk.cursor.seek_to_end();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DemuxError;
    use crate::node::FourCc;
    use crate::trace::StructureDump;
    use once_cell::sync::Lazy;

    /// Toy format: 4-byte big-endian size (header included) + 4-byte tag.
    struct Toy {
        seen: Vec<String>,
    }

    struct ToyHeader;

    impl HeaderCodec for ToyHeader {
        const MIN_HEADER_SIZE: u64 = 8;

        fn read_header(cursor: &mut BitCursor, _parent: &Node) -> Result<Node> {
            let start = cursor.absolute_byte_offset();
            let size = cursor.read_u32()? as u64;
            let tag = FourCc(cursor.read_array::<4>()?);
            Ok(Node::new(NodeId::FourCc(tag), start, 8, start + size))
        }
    }

    fn group(s: &mut Toy, w: &mut Walk<'_>, n: &mut Node) -> Result<()> {
        s.seen.push("grup".into());
        walk_children(s, w, n)
    }

    fn greedy(s: &mut Toy, w: &mut Walk<'_>, _n: &mut Node) -> Result<()> {
        s.seen.push("gred".into());
        // Reads far past its own end.
        w.cursor.skip_bytes(20)?;
        Ok(())
    }

    fn broken(s: &mut Toy, _w: &mut Walk<'_>, n: &mut Node) -> Result<()> {
        s.seen.push("brkn".into());
        Err(DemuxError::malformed("brkn", format!("bad payload at {}", n.offset_start)))
    }

    fn halt(s: &mut Toy, w: &mut Walk<'_>, _n: &mut Node) -> Result<()> {
        s.seen.push("halt".into());
        w.stop();
        Ok(())
    }

    static TABLE: Lazy<DispatchTable<Toy>> = Lazy::new(|| {
        DispatchTable::new()
            .on(NodeId::FourCc(FourCc::new(b"grup")), "group", group)
            .on(NodeId::FourCc(FourCc::new(b"gred")), "greedy", greedy)
            .on(NodeId::FourCc(FourCc::new(b"brkn")), "broken", broken)
            .on(NodeId::FourCc(FourCc::new(b"halt")), "halt", halt)
    });

    impl Format for Toy {
        type Header = ToyHeader;

        fn dispatch_table() -> &'static DispatchTable<Self> {
            &TABLE
        }
    }

    fn node(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut v = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        v.extend_from_slice(tag);
        v.extend_from_slice(payload);
        v
    }

    fn run(data: Vec<u8>) -> (Toy, StructureDump) {
        let options = ParseOptions::default();
        let mut dump = StructureDump::new();
        let mut toy = Toy { seen: Vec::new() };
        {
            let mut walk = Walk::new(BitCursor::new(data), &options, &mut dump, None);
            walk_root(&mut toy, &mut walk).unwrap();
        }
        (toy, dump)
    }

    #[test]
    fn overreading_handler_does_not_lose_siblings() {
        let mut data = node(b"gred", &[0; 4]);
        data.extend(node(b"brkn", &[]));
        data.extend(node(b"gred", &[]));
        let (toy, _) = run(data);
        assert_eq!(toy.seen, vec!["gred", "brkn", "gred"]);
    }

    #[test]
    fn nested_scope_and_unknown_nodes_are_traced() {
        let inner = [node(b"zzzz", &[1, 2, 3]), node(b"gred", &[])].concat();
        let data = [node(b"grup", &inner), node(b"free", &[0; 8])].concat();
        let (toy, dump) = run(data);
        assert_eq!(toy.seen, vec!["grup", "gred"]);

        let names: Vec<_> = dump.entries.iter().map(|e| (e.name.as_str(), e.depth, e.known)).collect();
        assert_eq!(
            names,
            vec![("group", 1, true), ("zzzz", 2, false), ("greedy", 2, true), ("free", 1, false)]
        );
    }

    #[test]
    fn stop_flag_ends_every_scope() {
        let inner = [node(b"halt", &[]), node(b"gred", &[])].concat();
        let data = [node(b"grup", &inner), node(b"gred", &[])].concat();
        let (toy, _) = run(data);
        assert_eq!(toy.seen, vec!["grup", "halt"]);
    }

    #[test]
    fn child_larger_than_parent_is_clamped() {
        // The inner node claims 1000 bytes; the sibling after the group survives.
        let mut inner = 1000u32.to_be_bytes().to_vec();
        inner.extend_from_slice(b"zzzz");
        let data = [node(b"grup", &inner), node(b"gred", &[])].concat();
        let (toy, _) = run(data);
        assert_eq!(toy.seen, vec!["grup", "gred"]);
    }
}
