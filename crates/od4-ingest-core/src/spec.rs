//! Message specification (ODVD) table.
//!
//! Only message headers are read:
//!
//! ```text
//! message opendlv.logic.perception.ObjectFrameStart [id = 1128] {
//!   uint32 objectFrameId [id = 1];
//! }
//! ```
//!
//! Field lines are skipped; the payload layout is the codec's business.

use std::collections::BTreeMap;

use crate::IngestError;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    pub id: i32,
    /// Dotted name as written in the specification.
    pub name: String,
}

impl MessageDefinition {
    /// Key used for the payload member in decoded JSON, e.g.
    /// `opendlv_logic_perception_ObjectFrameStart`.
    pub fn json_name(&self) -> String {
        self.name.replace('.', "_")
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageSpecification {
    by_id: BTreeMap<i32, MessageDefinition>,
}

impl MessageSpecification {
    pub fn parse(text: &str) -> Result<Self, IngestError> {
        let mut by_id = BTreeMap::new();
        let mut in_block_comment = false;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = strip_comments(raw, &mut in_block_comment);
            let line = line.trim();
            let Some(rest) = line.strip_prefix("message ") else {
                continue;
            };

            let name = rest
                .split(|c: char| c.is_whitespace() || c == '[')
                .next()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| spec_error(line_no, "message without a name"))?;
            let id = parse_id(rest).ok_or_else(|| spec_error(line_no, "message without [id = N]"))?;

            let def = MessageDefinition { id, name: name.to_string() };
            if let Some(prev) = by_id.insert(id, def) {
                return Err(spec_error(
                    line_no,
                    &format!("id {} already used by {}", id, prev.name),
                ));
            }
        }

        Ok(Self { by_id })
    }

    pub fn get(&self, id: i32) -> Option<&MessageDefinition> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn spec_error(line: usize, reason: &str) -> IngestError {
    IngestError::Specification { line, reason: reason.to_string() }
}

fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        if *in_block {
            match rest.find("*/") {
                Some(end) => {
                    *in_block = false;
                    rest = &rest[end + 2..];
                }
                None => return out,
            }
        }
        let block = rest.find("/*");
        let inline = rest.find("//");
        match (block, inline) {
            (Some(b), Some(i)) if i < b => {
                out.push_str(&rest[..i]);
                return out;
            }
            (Some(b), _) => {
                out.push_str(&rest[..b]);
                *in_block = true;
                rest = &rest[b + 2..];
            }
            (None, Some(i)) => {
                out.push_str(&rest[..i]);
                return out;
            }
            (None, None) => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn parse_id(header: &str) -> Option<i32> {
    let open = header.find('[')?;
    let close = open + header[open..].find(']')?;
    header[open + 1..close].split(',').find_map(|attr| {
        let (key, value) = attr.split_once('=')?;
        if key.trim() == "id" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
