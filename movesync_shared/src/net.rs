//! Relay wire protocol.
//!
//! Goals:
//! - One reliable stream per peer to the relay, carrying length-prefixed JSON frames.
//! - Messages are internally tagged by `type` so pose updates can be routed
//!   separately from any other relay traffic.
//! - Keep serialization explicit and versionable.

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::math::Vec3;
use crate::pose::{Pose, RoomCoord, TargetInfo};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are treated as a broken stream.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Relay-assigned peer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// View rotation as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Pose update, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub id: PeerId,
    pub position: Vec3,
    pub rotation: Rotation,
    #[serde(default)]
    pub targets_info: Vec<TargetInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomCoord>,
}

impl PlayerUpdate {
    pub fn from_pose(id: PeerId, pose: &Pose) -> Self {
        Self {
            id,
            position: pose.position,
            rotation: Rotation {
                yaw: pose.yaw,
                pitch: pose.pitch,
            },
            targets_info: Vec::new(),
            room: None,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation.yaw, self.rotation.pitch)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.yaw.is_finite() && self.rotation.pitch.is_finite()
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMsg {
    // ─── Connection handshake ───
    Hello { protocol: u32 },
    /// Relay assigns the peer its identity.
    Welcome { id: PeerId },

    // ─── Gameplay ───
    PlayerUpdate(PlayerUpdate),

    /// Any other relay traffic; not routed by this core.
    #[serde(other)]
    Unknown,
}

/// Encodes one message as a length-prefixed frame.
pub fn encode_frame(msg: &RelayMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    if payload.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds limit", payload.len());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Writes one frame.
pub async fn write_frame<W>(writer: &mut W, msg: &RelayMsg) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await.context("tcp write")?;
    Ok(())
}

/// Reads the raw payload of one frame.
///
/// Returns `Ok(None)` on a clean end of stream. Decoding is left to the
/// caller so a malformed payload does not tear down the connection.
pub async fn read_frame<R>(reader: &mut R) -> anyhow::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame of {len} bytes exceeds limit");
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Some(payload))
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &RelayMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    /// Receives and decodes the next message; end of stream is an error here.
    pub async fn recv(&mut self) -> anyhow::Result<RelayMsg> {
        let payload = read_frame(&mut self.stream)
            .await?
            .context("connection closed")?;
        decode_from_bytes(&payload)
    }

    /// Splits into independently owned read/write halves.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// TCP listener for the relay.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<RelayMsg> {
    serde_json::from_slice(b).context("deserialize")
}
