use anyhow::{Context, Result};
use skybridge_proto::Message;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

/// Framed request/reply channel. `more = true` marks a frame that is followed
/// by further parts of the same message.
pub trait Transport {
    fn recv(&mut self) -> Result<Vec<u8>>;
    fn send(&mut self, frame: &[u8], more: bool) -> Result<()>;
}

pub fn send_message(transport: &mut dyn Transport, msg: &Message, more: bool) -> Result<()> {
    let frame = msg.to_frame().with_context(|| format!("encode {} frame", msg.topic()))?;
    transport.send(&frame, more)
}

/// Sends `msgs` as one multi-part message; only the last frame is final.
pub fn send_multipart(transport: &mut dyn Transport, msgs: &[Message]) -> Result<()> {
    let last = msgs.len().saturating_sub(1);
    for (i, msg) in msgs.iter().enumerate() {
        send_message(transport, msg, i < last)?;
    }
    Ok(())
}

pub fn send_text(transport: &mut dyn Transport, text: &str) -> Result<()> {
    transport.send(text.as_bytes(), false)?;
    info!("REPLY: {}", text);
    Ok(())
}

/// ZeroMQ REP socket bound at a local endpoint.
pub struct ZmqTransport {
    _ctx: zmq::Context,
    socket: zmq::Socket,
}

impl ZmqTransport {
    pub fn bind(endpoint: &str) -> Result<Self> {
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if let Some(dir) = Path::new(path).parent() {
                std::fs::create_dir_all(dir).with_context(|| format!("create ipc dir {}", dir.display()))?;
            }
        }
        let ctx = zmq::Context::new();
        let socket = ctx.socket(zmq::REP).context("create REP socket")?;
        socket.bind(endpoint).with_context(|| format!("bind {}", endpoint))?;
        info!("transport: bound {}", endpoint);
        Ok(Self { _ctx: ctx, socket })
    }
}

impl Transport for ZmqTransport {
    fn recv(&mut self) -> Result<Vec<u8>> {
        let mut parts = self.socket.recv_multipart(0).context("zmq recv")?;
        if parts.len() > 1 {
            debug!("transport: ignoring {} trailing request parts", parts.len() - 1);
        }
        parts.truncate(1);
        Ok(parts.pop().unwrap_or_default())
    }

    fn send(&mut self, frame: &[u8], more: bool) -> Result<()> {
        let flags = if more { zmq::SNDMORE } else { 0 };
        self.socket.send(frame, flags).context("zmq send")
    }
}

/// In-memory transport: queued requests in, recorded frames out.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub inbound: VecDeque<Vec<u8>>,
    pub sent: Vec<(Vec<u8>, bool)>,
}

impl MemoryTransport {
    pub fn with_requests(requests: &[&str]) -> Self {
        Self { inbound: requests.iter().map(|r| r.as_bytes().to_vec()).collect(), sent: Vec::new() }
    }

    /// Removes and returns the frames of the oldest complete reply.
    pub fn take_reply(&mut self) -> Option<Vec<Vec<u8>>> {
        let end = self.sent.iter().position(|(_, more)| !more)?;
        Some(self.sent.drain(..=end).map(|(f, _)| f).collect())
    }
}

impl Transport for MemoryTransport {
    fn recv(&mut self) -> Result<Vec<u8>> {
        self.inbound.pop_front().context("no more requests")
    }

    fn send(&mut self, frame: &[u8], more: bool) -> Result<()> {
        self.sent.push((frame.to_vec(), more));
        Ok(())
    }
}
