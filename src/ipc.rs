//! Unix-domain-socket frontend: deserializes newline-delimited JSON
//! requests into [`CoreHandle`] calls and serializes the result back out.
//!
//! One connection may be used for many requests; each line is handled
//! independently and concurrently, since every `CoreHandle` call is cheap
//! to clone and its `Waiter` can be awaited from any task.

use std::path::Path;

use rrf_channel::{Code, CodeFlags, CodeParameter, CodeResult};
use rrf_core::CoreHandle;
use rrf_protocol::CodeChannel;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

fn channel_from_name(name: &str) -> Option<CodeChannel> {
    Some(match name {
        "http" => CodeChannel::Http,
        "telnet" => CodeChannel::Telnet,
        "file" => CodeChannel::File,
        "usb" => CodeChannel::Usb,
        "aux" => CodeChannel::Aux,
        "daemon" => CodeChannel::Daemon,
        "trigger" => CodeChannel::Trigger,
        "queue" => CodeChannel::Queue,
        "lcd" => CodeChannel::Lcd,
        "sbc" => CodeChannel::Sbc,
        "autopause" => CodeChannel::AutoPause,
        _ => return None,
    })
}

#[derive(Debug, serde::Deserialize)]
struct WireCodeParameter {
    letter: char,
    value: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum IpcRequest {
    Code {
        channel: String,
        letter: char,
        major_number: i32,
        minor_number: Option<u8>,
        #[serde(default)]
        parameters: Vec<WireCodeParameter>,
        file_position: Option<u64>,
        #[serde(default)]
        is_expression: bool,
    },
    Flush {
        channel: String,
        #[serde(default)]
        sync_file_streams: bool,
    },
    LockObjectModel {
        channel: String,
    },
    UnlockObjectModel {
        channel: String,
    },
    GetObjectModel {
        #[allow(dead_code)]
        key: String,
        #[allow(dead_code)]
        flags: Option<String>,
    },
    /// Plugin / session / package management: the boundary is part of the
    /// IPC surface, but handling it is out of scope for this core.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "result")]
enum IpcResponse {
    #[serde(rename = "reply")]
    Reply { content: String, flags: u16 },
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "aborted")]
    Aborted,
    #[serde(rename = "flushed")]
    Flushed { synced: bool },
    #[serde(rename = "locked")]
    Locked,
    #[serde(rename = "unlocked")]
    Unlocked,
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<CodeResult> for IpcResponse {
    fn from(result: CodeResult) -> Self {
        match result {
            CodeResult::Reply { content, flags } => IpcResponse::Reply { content, flags },
            CodeResult::Cancelled => IpcResponse::Cancelled,
            CodeResult::Aborted => IpcResponse::Aborted,
        }
    }
}

/// Accept connections on `socket_path` until the listener is dropped,
/// spawning one task per connection.
pub async fn serve(socket_path: &Path, handle: CoreHandle) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    log::info!("rrfd: listening on {}", socket_path.display());

    loop {
        let (stream, _addr) = listener.accept().await?;
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, handle).await {
                log::warn!("rrfd: ipc connection ended: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, handle: CoreHandle) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<IpcRequest>(&line) {
            Ok(request) => dispatch(request, &handle).await,
            Err(e) => IpcResponse::Error { message: format!("invalid request: {e}") },
        };
        let mut encoded = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!("{{\"result\":\"error\",\"message\":\"failed to encode response: {e}\"}}")
        });
        encoded.push('\n');
        write_half.write_all(encoded.as_bytes()).await?;
    }
    Ok(())
}

async fn dispatch(request: IpcRequest, handle: &CoreHandle) -> IpcResponse {
    match request {
        IpcRequest::Code {
            channel,
            letter,
            major_number,
            minor_number,
            parameters,
            file_position,
            is_expression,
        } => {
            let Some(channel) = channel_from_name(&channel) else {
                return IpcResponse::Error { message: format!("unknown channel: {channel}") };
            };
            let mut flags = CodeFlags::empty();
            if is_expression {
                flags |= CodeFlags::HAS_EXPRESSION;
            }
            let code = Code {
                letter,
                major_number,
                minor_number,
                parameters: parameters
                    .into_iter()
                    .map(|p| CodeParameter { letter: p.letter, value: p.value })
                    .collect(),
                channel,
                file_position,
                flags,
            };
            match handle.push_code(channel, code).wait().await {
                Some(result) => result.into(),
                None => IpcResponse::Error { message: "channel shut down before replying".into() },
            }
        }
        IpcRequest::Flush { channel, sync_file_streams } => {
            let Some(channel) = channel_from_name(&channel) else {
                return IpcResponse::Error { message: format!("unknown channel: {channel}") };
            };
            match handle.flush(channel, sync_file_streams).wait().await {
                Some(synced) => IpcResponse::Flushed { synced },
                None => IpcResponse::Error { message: "channel shut down before flushing".into() },
            }
        }
        IpcRequest::LockObjectModel { channel } => {
            let Some(channel) = channel_from_name(&channel) else {
                return IpcResponse::Error { message: format!("unknown channel: {channel}") };
            };
            match handle.lock_movement(channel).wait().await {
                Some(()) => IpcResponse::Locked,
                None => IpcResponse::Error { message: "channel shut down before locking".into() },
            }
        }
        IpcRequest::UnlockObjectModel { channel } => {
            let Some(channel) = channel_from_name(&channel) else {
                return IpcResponse::Error { message: format!("unknown channel: {channel}") };
            };
            match handle.unlock_movement(channel).wait().await {
                Some(()) => IpcResponse::Unlocked,
                None => IpcResponse::Error { message: "channel shut down before unlocking".into() },
            }
        }
        IpcRequest::GetObjectModel { .. } | IpcRequest::Unsupported => {
            IpcResponse::Error { message: "not implemented".into() }
        }
    }
}
