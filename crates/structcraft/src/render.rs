//! Text renderings of nodes: one-line summaries, backtraces, hexdumps.

use std::fmt;

use crate::{
    errors::Result,
    node::{Content, LoadState, NodeId, NodeRef},
    tree::Tree,
    types::Type,
};

/// Bytes shown by a block summary before eliding the rest.
const PREVIEW: usize = 16;

fn preview(data: &[u8]) -> String {
    let shown = &data[..data.len().min(PREVIEW)];
    let mut out = format!("\"{}\"", shown.escape_ascii());
    if data.len() > PREVIEW {
        out.push_str("...");
    }
    out
}

impl NodeRef<'_> {
    fn details(&self) -> String {
        let node = self.node();
        match (&node.ty, &node.content) {
            (_, Content::Empty) => "???".to_string(),
            (Type::Int(int), Content::Bytes(_)) => {
                let value = if int.is_signed() {
                    self.int().map(|v| v.to_string())
                } else {
                    self.uint().map(|v| v.to_string())
                };
                match (self.uint(), value) {
                    (Ok(raw), Ok(value)) => format!("{:#x} ({})", raw, value),
                    _ => "?".to_string(),
                }
            }
            (Type::Pointer { .. }, Content::Pointer { target, .. }) => {
                let raw = self.uint().map_or_else(|_| "?".to_string(), |v| format!("{:#x}", v));
                match target.and_then(|id| self.tree().get(id).ok()) {
                    Some(target) => format!("{} -> [{:#x}]", raw, target.offset()),
                    None => raw,
                }
            }
            (_, Content::Bytes(data)) => preview(data),
            (_, Content::Pointer { raw, .. }) => preview(raw),
            (_, Content::Bits(bits)) => bits.summary(),
            (Type::Struct { .. }, Content::Children(ids)) => format!("{{{} fields}}", ids.len()),
            (_, Content::Children(ids)) => format!("[{} elements]", ids.len()),
            (_, Content::Union { views, .. }) => format!("<{} views>", views.len()),
        }
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x}] {} {} {}",
            self.offset(),
            self.ty().label(),
            self.name(),
            self.details()
        )?;
        match self.state() {
            LoadState::Partial { shortfall } => write!(f, " (short by {})", shortfall),
            LoadState::Truncated { shortfall } => write!(f, " (truncated, {} missing)", shortfall),
            _ => Ok(()),
        }
    }
}

impl Tree {
    /// Summaries of every node from the root down to `id`.
    pub fn backtrace(&self, id: NodeId) -> Result<Vec<String>> {
        let node = self.get(id)?;
        let mut lines: Vec<String> = node.ancestors().map(|n| n.to_string()).collect();
        lines.reverse();
        lines.push(node.to_string());
        Ok(lines)
    }

    /// Hexdump of a node's serialized bytes, addressed from its offset.
    pub fn hexdump(&self, id: NodeId) -> Result<String> {
        let data = self.serialize(id)?;
        Ok(hexdump(&data, self.get(id)?.offset()))
    }

    /// Indented summary of a node and everything below it.
    pub fn dump(&self, id: NodeId) -> Result<String> {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out)?;
        Ok(out)
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) -> Result<()> {
        let node = self.get(id)?;
        out.push_str(&format!("{:indent$}{}\n", "", node, indent = depth * 2));

        let nested: Vec<NodeId> = match &node.node().content {
            Content::Children(ids) => ids.clone(),
            Content::Union { root, views } => std::iter::once(*root).chain(views.iter().copied()).collect(),
            Content::Pointer {
                target: Some(target),
                ..
            } => vec![*target],
            _ => Vec::new(),
        };
        for child in nested {
            self.dump_into(child, depth + 1, out)?;
        }
        Ok(())
    }
}

/// Classic 16-bytes-per-line hexdump with an ASCII column.
pub fn hexdump(data: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            base.wrapping_add(row as u64 * 16),
            hex.join(" "),
            ascii
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dynamic::{self, Builder},
        field::Field,
        order::ByteOrder,
        source::BytesSource,
    };

    const BE: Builder = Builder::new(ByteOrder::BigEndian);

    #[test]
    fn test_summary_lines() {
        let ty = dynamic::structure(
            "header",
            [Field::new("magic", 4usize), Field::new("count", BE.uint16())],
        );
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, BytesSource::new(b"MZ\x90\x00\x00\x2a".to_vec()).shared());
        assert_eq!(tree.get(id).unwrap().to_string(), "[0x0] header header ???");

        tree.load(id).unwrap();
        let node = tree.get(id).unwrap();
        assert_eq!(node.to_string(), "[0x0] header header {2 fields}");
        assert_eq!(
            node.field("magic").unwrap().to_string(),
            "[0x0] block(4) magic \"MZ\\x90\\x00\""
        );
        assert_eq!(
            node.field("count").unwrap().to_string(),
            "[0x4] uint16_be count 0x2a (42)"
        );
    }

    #[test]
    fn test_truncated_summary() {
        let mut tree = Tree::new();
        let id = tree.instantiate(BE.uint32(), BytesSource::new(b"\x01".to_vec()).shared());
        assert!(tree.load(id).is_err());
        assert!(tree.get(id).unwrap().to_string().ends_with("(truncated, 3 missing)"));
    }

    #[test]
    fn test_backtrace_and_dump() {
        let inner = dynamic::structure("inner", [Field::new("x", BE.uint8())]);
        let ty = dynamic::structure("outer", [Field::new("body", inner)]);
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, BytesSource::new(b"\x07".to_vec()).shared());
        tree.load(id).unwrap();

        let x = tree.at(id, 0, true).unwrap();
        let lines = tree.backtrace(x).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("x 0x7 (7)"));

        let dump = tree.dump(id).unwrap();
        assert_eq!(dump.lines().count(), 3);
        assert!(dump.lines().nth(2).unwrap().starts_with("    [0x0] uint8_be x"));
    }

    #[test]
    fn test_hexdump() {
        let dump = hexdump(b"ABCDEFGHIJKLMNOP\x00\x01", 0x100);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000100  41 42 43"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        assert!(lines[1].starts_with("00000110  00 01"));
        assert!(lines[1].ends_with("|..|"));
    }

    #[test]
    fn test_hexdump_at_end_of_address_space() {
        let dump = hexdump(&[0xaa; 17], u64::MAX - 15);
        assert!(dump.ends_with('\n'));
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("fffffffffffffff0  aa"));
        assert!(lines[1].starts_with("00000000  aa"));
    }
}
