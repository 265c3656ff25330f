//! Classification of inbound units of work.

use std::fmt;

/// What an inbound operation intends to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Pure read.
    Read,
    /// State-changing operation.
    Write,
    /// Long-lived subscription with no natural end.
    Stream,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Read => "query",
            OperationKind::Write => "mutation",
            OperationKind::Stream => "subscription",
        }
    }

    /// Classify a GraphQL document by its first executable operation.
    ///
    /// Fragment definitions are skipped; a bare selection set (`{ ... }`) is
    /// the query shorthand. Returns `None` when no operation is found.
    pub fn from_document(document: &str) -> Option<Self> {
        let bytes = document.as_bytes();
        let mut depth = 0usize;
        let mut in_fragment = false;
        let mut i = 0;

        while i < bytes.len() {
            let byte = bytes[i];
            match byte {
                b'#' => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    continue;
                }
                b'"' => {
                    i = skip_string(bytes, i);
                    continue;
                }
                b'{' => {
                    if depth == 0 && !in_fragment {
                        return Some(OperationKind::Read);
                    }
                    depth += 1;
                }
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        in_fragment = false;
                    }
                }
                b if depth == 0 && is_name_start(b) => {
                    let start = i;
                    while i < bytes.len() && is_name_continue(bytes[i]) {
                        i += 1;
                    }
                    match &document[start..i] {
                        "query" => return Some(OperationKind::Read),
                        "mutation" => return Some(OperationKind::Write),
                        "subscription" => return Some(OperationKind::Stream),
                        "fragment" => in_fragment = true,
                        _ => {}
                    }
                    continue;
                }
                _ => {}
            }
            i += 1;
        }

        None
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_name_start(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphabetic()
}

fn is_name_continue(byte: u8) -> bool {
    byte == b'_' || byte.is_ascii_alphanumeric()
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    if bytes[start..].starts_with(b"\"\"\"") {
        let mut i = start + 3;
        while i < bytes.len() {
            if bytes[i..].starts_with(b"\"\"\"") {
                return i + 3;
            }
            i += 1;
        }
        return bytes.len();
    }

    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Kind of state change applied by the write handle. Every kind bumps the
/// tenant epoch once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    Create,
    Update,
    UpdateOne,
    Delete,
    DeleteOne,
}

impl MutationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::UpdateOne => "update_one",
            MutationOp::Delete => "delete",
            MutationOp::DeleteOne => "delete_one",
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
