//! Resync guard ("jumpy").
//!
//! Runs after every node handler and puts the cursor on the node's declared
//! end, whatever the handler consumed. The declared end is clamped to the
//! parent (when the parent's own end lies inside the file) and to the file.

use crate::bitstream::BitCursor;
use crate::error::CursorError;
use crate::node::Node;

pub fn jumpy(cursor: &mut BitCursor, parent: &Node, node: &Node) -> Result<(), CursorError> {
    cursor.force_byte_alignment();

    let pos = cursor.absolute_byte_offset();
    if pos == node.offset_end {
        return Ok(());
    }

    let file_size = cursor.total_size();
    let mut target = node.offset_end;
    if parent.offset_end <= file_size {
        // A corrupt child must not escape its parent.
        target = target.min(parent.offset_end);
    } else {
        target = target.min(file_size);
    }

    if target >= file_size {
        cursor.seek_to_end();
        return Ok(());
    }

    if target > pos {
        cursor.skip_bytes(target - pos)
    } else {
        cursor.rewind_bytes(pos - target)
    }
}
