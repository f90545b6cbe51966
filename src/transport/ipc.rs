//! Line-delimited JSON framing for the control socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommandError;

#[derive(Serialize)]
struct Request<'a> {
    command: &'a [Value],
    request_id: u64,
}

/// One request as a newline-terminated line.
pub(super) fn encode(command: &[Value], request_id: u64) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&Request {
        command,
        request_id,
    })?;
    line.push(b'\n');
    Ok(line)
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    event: Option<String>,
    request_id: Option<u64>,
    error: Option<String>,
    id: Option<u64>,
    name: Option<String>,
    #[serde(default)]
    data: Value,
    reason: Option<String>,
    file_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Message {
    Reply {
        request_id: u64,
        result: Result<(), CommandError>,
    },
    Property {
        id: u64,
        name: String,
        data: Value,
    },
    Event {
        name: String,
        reason: Option<String>,
        file_error: Option<String>,
    },
}

/// Decode one line. `Ok(None)` is a well-formed message we have no use for.
pub(super) fn decode(line: &str) -> serde_json::Result<Option<Message>> {
    let raw: RawMessage = serde_json::from_str(line)?;

    Ok(match raw.event {
        Some(event) if event == "property-change" => Some(Message::Property {
            id: raw.id.unwrap_or(0),
            name: raw.name.unwrap_or_default(),
            data: raw.data,
        }),
        Some(name) => Some(Message::Event {
            name,
            reason: raw.reason,
            file_error: raw.file_error,
        }),
        None => match (raw.request_id, raw.error) {
            (Some(request_id), Some(error)) => Some(Message::Reply {
                request_id,
                result: if error == "success" {
                    Ok(())
                } else {
                    Err(CommandError::Rejected(error))
                },
            }),
            _ => None,
        },
    })
}
