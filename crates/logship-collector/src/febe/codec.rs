//! Framed message codec for the log-delivery stream protocol.
//!
//! Each wire frame is `{type: 1 byte, length: 4 bytes big-endian including
//! the length field itself, payload: length - 4 bytes}`. Strings inside
//! payloads are NUL-terminated; fixed-width integers are big-endian.

use std::io;

use bytes::{Buf, Bytes};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Absolute ceiling on the length field the codec will honor. Anything
/// larger is a protocol violation regardless of message type.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream between frames.
    #[error("peer closed the stream")]
    Eof,
    #[error("I/O failure reading frame: {0}")]
    Io(#[source] io::Error),
    /// The length field claims fewer bytes than the field itself occupies.
    #[error("frame length {0} is shorter than its own length field")]
    BadLength(u32),
    /// The frame is larger than the caller is willing to read. The payload
    /// is left unread on the stream.
    #[error("frame {tag:?} of {size} bytes exceeds the {limit}-byte limit")]
    Oversized { tag: char, size: u32, limit: u32 },
    #[error("string field is missing its NUL terminator")]
    UnterminatedString,
    #[error("string field is not valid UTF-8")]
    BadEncoding,
    #[error("field runs past the end of the payload")]
    Truncated,
}

/// One decoded frame: a tag byte and its payload.
#[derive(Debug, Clone)]
pub struct Message {
    tag: u8,
    payload: Bytes,
}

impl Message {
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Message {
        Message {
            tag,
            payload: payload.into(),
        }
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The value of the wire length field: payload plus the field itself.
    pub fn size(&self) -> u32 {
        self.payload.len() as u32 + 4
    }

    /// Cheap handle on the payload, usable as a cursor.
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    /// Read the next frame, refusing (without draining the payload) any
    /// frame whose length field exceeds `limit`.
    pub async fn read_from<R>(reader: &mut R, limit: u32) -> Result<Message, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Eof),
            Err(e) => return Err(FrameError::Io(e)),
        }

        let len = reader.read_u32().await.map_err(FrameError::Io)?;
        if len < 4 {
            return Err(FrameError::BadLength(len));
        }
        if len > limit.min(MAX_FRAME_SIZE) {
            return Err(FrameError::Oversized {
                tag: tag[0] as char,
                size: len,
                limit: limit.min(MAX_FRAME_SIZE),
            });
        }

        let mut payload = vec![0u8; (len - 4) as usize];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(FrameError::Io)?;

        Ok(Message {
            tag: tag[0],
            payload: payload.into(),
        })
    }

    /// Write this frame in wire form.
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_u8(self.tag).await?;
        writer.write_u32(self.size()).await?;
        writer.write_all(&self.payload).await?;
        Ok(())
    }
}

/// Read a NUL-terminated string off the front of `buf`, consuming the
/// terminator.
pub fn read_cstring(buf: &mut Bytes) -> Result<String, FrameError> {
    let nul = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or(FrameError::UnterminatedString)?;

    let raw = buf.split_to(nul);
    buf.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::BadEncoding)
}

/// Append `s` and a NUL terminator to `buf`.
pub fn write_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

pub fn read_i32(buf: &mut Bytes) -> Result<i32, FrameError> {
    if buf.remaining() < 4 {
        return Err(FrameError::Truncated);
    }
    Ok(buf.get_i32())
}

pub fn read_i64(buf: &mut Bytes) -> Result<i64, FrameError> {
    if buf.remaining() < 8 {
        return Err(FrameError::Truncated);
    }
    Ok(buf.get_i64())
}

pub fn read_u64(buf: &mut Bytes) -> Result<u64, FrameError> {
    if buf.remaining() < 8 {
        return Err(FrameError::Truncated);
    }
    Ok(buf.get_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let mut wire = Vec::new();
        let mut payload = Vec::new();
        write_cstring(&mut payload, "PG-9.2.2/logfebe-1");
        Message::new(b'V', payload)
            .write_to(&mut wire)
            .await
            .unwrap();

        let mut cursor = &wire[..];
        let msg = Message::read_from(&mut cursor, MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(msg.tag(), b'V');

        let mut buf = msg.payload();
        assert_eq!(read_cstring(&mut buf).unwrap(), "PG-9.2.2/logfebe-1");
        assert!(!buf.has_remaining());
    }

    #[tokio::test]
    async fn test_clean_eof_between_frames() {
        let mut cursor = &b""[..];
        assert!(matches!(
            Message::read_from(&mut cursor, MAX_FRAME_SIZE).await,
            Err(FrameError::Eof)
        ));
    }

    #[tokio::test]
    async fn test_undersized_length_field() {
        let wire = [b'L', 0, 0, 0, 2];
        let mut cursor = &wire[..];
        assert!(matches!(
            Message::read_from(&mut cursor, MAX_FRAME_SIZE).await,
            Err(FrameError::BadLength(2))
        ));
    }

    #[tokio::test]
    async fn test_limit_is_enforced_without_draining() {
        // Header declares 1 MB + 1 of content; no payload follows.
        let mut wire = vec![b'L'];
        wire.extend_from_slice(&(1_048_577u32).to_be_bytes());

        let mut cursor = &wire[..];
        match Message::read_from(&mut cursor, 1_048_576).await {
            Err(FrameError::Oversized { tag: 'L', size, .. }) => {
                assert_eq!(size, 1_048_577);
            }
            other => panic!("expected Oversized, got {other:?}"),
        }
        // The (absent) payload was never consumed.
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_cstring_requires_terminator() {
        let mut buf = Bytes::from_static(b"dangling");
        assert!(matches!(
            read_cstring(&mut buf),
            Err(FrameError::UnterminatedString)
        ));
    }

    #[test]
    fn test_integer_reads_are_big_endian() {
        let mut buf = Bytes::from_static(&[0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(read_i32(&mut buf).unwrap(), 1);
        assert_eq!(read_i64(&mut buf).unwrap(), -2);
        assert!(matches!(read_i32(&mut buf), Err(FrameError::Truncated)));
    }
}
