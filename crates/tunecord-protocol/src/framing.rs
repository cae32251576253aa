//! Opcode + length-prefixed JSON framing.
//!
//! ```text
//! +---------------+---------------+------------------+
//! | opcode (LE)   | length (LE)   |  JSON payload    |
//! +---------------+---------------+------------------+
//! ```
//!
//! `length` is the exact byte length of the payload. A zero length means
//! the frame has no payload.

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Client hello carrying version and client id.
    Handshake,
    /// Command or dispatch envelope.
    Frame,
    /// Heartbeat and its acknowledgment.
    Heartbeat,
    /// Peer-initiated close, always terminal.
    Close,
    /// Anything else; kept so unknown frames can be logged and skipped.
    Other(i32),
}

impl Opcode {
    /// Returns the wire value.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Handshake => 0,
            Self::Frame => 1,
            Self::Heartbeat => 3,
            Self::Close => 5,
            Self::Other(value) => value,
        }
    }
}

impl From<i32> for Opcode {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Handshake,
            1 => Self::Frame,
            3 => Self::Heartbeat,
            5 => Self::Close,
            other => Self::Other(other),
        }
    }
}

/// A single decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame from raw payload bytes.
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Creates a frame by serializing `payload` to JSON.
    pub fn from_json<T: Serialize>(opcode: Opcode, payload: &T) -> ProtocolResult<Self> {
        let payload = serde_json::to_vec(payload)?;
        check_size(payload.len())?;
        Ok(Self { opcode, payload })
    }

    /// Parses the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        if self.payload.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Serializes header and payload into one buffer.
    pub fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        check_size(self.payload.len())?;

        let mut buffer = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buffer.extend_from_slice(&self.opcode.as_i32().to_le_bytes());
        buffer.extend_from_slice(&(self.payload.len() as i32).to_le_bytes());
        buffer.extend_from_slice(&self.payload);
        Ok(buffer)
    }
}

fn check_size(size: usize) -> ProtocolResult<()> {
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Encodes `payload` as a complete frame ready for transmission.
///
/// # Example
///
/// ```rust
/// use tunecord_protocol::{encode, Opcode};
///
/// let bytes = encode(Opcode::Heartbeat, &serde_json::json!({})).unwrap();
/// assert_eq!(bytes, [3, 0, 0, 0, 2, 0, 0, 0, b'{', b'}']);
/// ```
pub fn encode<T: Serialize>(opcode: Opcode, payload: &T) -> ProtocolResult<Vec<u8>> {
    Frame::from_json(opcode, payload)?.to_bytes()
}

/// Decodes the 8-byte header at the start of `bytes`.
///
/// Returns the opcode and the payload length.
pub fn decode_header(bytes: &[u8]) -> ProtocolResult<(Opcode, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::ShortHeader {
            received: bytes.len(),
        });
    }

    let opcode = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let length = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

    if length < 0 {
        return Err(ProtocolError::InvalidLength { length });
    }
    let length = length as usize;
    check_size(length)?;

    Ok((Opcode::from(opcode), length))
}

/// Decodes one complete frame from the start of `bytes`.
pub fn decode_frame(bytes: &[u8]) -> ProtocolResult<Frame> {
    let (opcode, length) = decode_header(bytes)?;

    if bytes.len() < HEADER_LEN + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: HEADER_LEN + length,
            received: bytes.len(),
        });
    }

    Ok(Frame::new(
        opcode,
        bytes[HEADER_LEN..HEADER_LEN + length].to_vec(),
    ))
}

/// Reads frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a single frame.
    ///
    /// Returns `Ok(None)` if the stream ends before a header is read.
    /// A stream that ends inside a payload yields an `UnexpectedEof` IO
    /// error.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut header = [0u8; HEADER_LEN];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (opcode, length) = decode_header(&header)?;

        let mut payload = vec![0u8; length];
        if length > 0 {
            self.reader.read_exact(&mut payload).await?;
        }

        Ok(Some(Frame::new(opcode, payload)))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes and flushes a single frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        let bytes = frame.to_bytes()?;
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Serializes `payload` and writes it as one frame.
    pub async fn write_json<T: Serialize>(
        &mut self,
        opcode: Opcode,
        payload: &T,
    ) -> ProtocolResult<()> {
        let frame = Frame::from_json(opcode, payload)?;
        self.write_frame(&frame).await
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
