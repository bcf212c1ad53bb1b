// src/protocol.rs

//! Coordinator/worker message schema and its JSON-lines codec.
//!
//! Every message is one JSON object on one line. Commands carry a `cmd` tag,
//! events an `evt` tag:
//!
//! ```text
//! -> {"cmd":"start","data":["/src/a.less","/src/b.less"]}
//! -> {"cmd":"build","file":"/src/b.less","dest":"/out/b.css"}
//! <- {"evt":"ready","id":1}
//! <- {"evt":"drain","id":1,"file":"/src/b.less"}
//! <- {"evt":"error","id":1,"detail":"..."}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ClusterError, Result};
use crate::types::WorkerId;

/// Coordinator → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum WorkerCommand {
    /// Read these files into the worker's cache, then report `ready`.
    Start { data: Vec<PathBuf> },
    /// Compile `file` and write the result to `dest`, then report `drain`.
    Build { file: PathBuf, dest: PathBuf },
}

/// Worker → coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "evt", rename_all = "lowercase")]
pub enum WorkerEvent {
    Ready {
        id: WorkerId,
    },
    Drain {
        id: WorkerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<PathBuf>,
    },
    Error {
        id: WorkerId,
        detail: String,
    },
}

impl WorkerEvent {
    pub fn id(&self) -> WorkerId {
        match self {
            WorkerEvent::Ready { id } | WorkerEvent::Drain { id, .. } | WorkerEvent::Error { id, .. } => {
                *id
            }
        }
    }
}

/// Serialize a message as a single line (without the trailing newline).
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_command(line: &str) -> Result<WorkerCommand> {
    serde_json::from_str(line.trim())
        .map_err(|e| ClusterError::ProtocolError(format!("bad command {line:?}: {e}")))
}

pub fn decode_event(line: &str) -> Result<WorkerEvent> {
    serde_json::from_str(line.trim())
        .map_err(|e| ClusterError::ProtocolError(format!("bad event {line:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_wire_shape() {
        let line = encode(&WorkerCommand::Build {
            file: "/src/one.less".into(),
            dest: "/out/one.css".into(),
        })
        .unwrap();
        assert_eq!(line, r#"{"cmd":"build","file":"/src/one.less","dest":"/out/one.css"}"#);
    }

    #[test]
    fn drain_without_file_decodes() {
        let evt = decode_event(r#"{"evt":"drain","id":3}"#).unwrap();
        assert_eq!(evt, WorkerEvent::Drain { id: WorkerId(3), file: None });
    }

    #[test]
    fn message_without_tag_is_a_protocol_error() {
        assert!(matches!(
            decode_event(r#"{"foo":"foo"}"#),
            Err(ClusterError::ProtocolError(_))
        ));
        assert!(matches!(
            decode_command(r#"{"cmd":"missing"}"#),
            Err(ClusterError::ProtocolError(_))
        ));
    }
}
