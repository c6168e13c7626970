use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Longest encoding of a u64 as an unsigned LEB128 varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Opcodes of packets sent from the server to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientBound {
    Update = 0x00,
    Notification = 0x03,
    Ping = 0x05,
    PlayerCount = 0x0A,
}

impl ClientBound {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(ClientBound::Update),
            0x03 => Some(ClientBound::Notification),
            0x05 => Some(ClientBound::Ping),
            0x0A => Some(ClientBound::PlayerCount),
            _ => None,
        }
    }
}

/// Opcodes of packets sent from clients to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerBound {
    Ping = 0x05,
}

impl ServerBound {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x05 => Some(ServerBound::Ping),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of packet at offset {0}")]
    UnexpectedEof(usize),
    #[error("varint at offset {0} does not fit in 64 bits")]
    VarintOverflow(usize),
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// Append-only packet encoder.
///
/// Writes chain on `&mut self` so a packet reads as one expression:
/// `writer.u8(op).vu(count)`. `finish` freezes the buffer into cheaply
/// clonable `Bytes`, which lets one encoding be handed to many sockets.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Unsigned LEB128 varint.
    pub fn vu(&mut self, mut value: u64) -> &mut Self {
        while value >= 0x80 {
            self.buf.put_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buf.put_u8(value as u8);
        self
    }

    /// Zig-zag encoded signed varint.
    pub fn vi(&mut self, value: i64) -> &mut Self {
        self.vu(((value << 1) ^ (value >> 63)) as u64)
    }

    /// NUL-terminated UTF-8 string.
    pub fn string_nt(&mut self, value: &str) -> &mut Self {
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received packet.
pub struct Reader<'a> {
    data: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, at: 0 }
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        let value = *self
            .data
            .get(self.at)
            .ok_or(DecodeError::UnexpectedEof(self.at))?;
        self.at += 1;
        Ok(value)
    }

    pub fn vu(&mut self) -> Result<u64, DecodeError> {
        let start = self.at;
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.u8()?;
            let bits = (byte & 0x7F) as u64;
            // The tenth byte may only carry the single remaining bit.
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(DecodeError::VarintOverflow(start));
            }
            value |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow(start))
    }

    pub fn vi(&mut self) -> Result<i64, DecodeError> {
        let raw = self.vu()?;
        Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
    }

    pub fn string_nt(&mut self) -> Result<String, DecodeError> {
        let start = self.at;
        let rest = &self.data[start..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnexpectedEof(self.data.len()))?;
        let value = std::str::from_utf8(&rest[..len])
            .map_err(|_| DecodeError::InvalidUtf8(start))?
            .to_string();
        self.at += len + 1;
        Ok(value)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.at
    }
}

/// Encodes the player count notification: `[PlayerCount][vu count]`.
pub fn encode_player_count(count: u64) -> Bytes {
    let mut writer = Writer::new();
    writer.u8(ClientBound::PlayerCount as u8).vu(count);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vu_single_byte() {
        let mut writer = Writer::new();
        writer.vu(0).vu(1).vu(127);
        assert_eq!(&writer.finish()[..], &[0x00, 0x01, 0x7F]);
    }

    #[test]
    fn test_vu_multi_byte() {
        let mut writer = Writer::new();
        writer.vu(128).vu(300);
        assert_eq!(&writer.finish()[..], &[0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn test_vu_max_value_length() {
        let mut writer = Writer::new();
        writer.vu(u64::MAX);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), MAX_VARINT_LEN);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.vu().unwrap(), u64::MAX);
    }

    #[test]
    fn test_vi_zigzag() {
        let mut writer = Writer::new();
        writer.vi(0).vi(-1).vi(1).vi(-2);
        assert_eq!(&writer.finish()[..], &[0x00, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_vi_extremes() {
        let mut writer = Writer::new();
        writer.vi(i64::MIN).vi(i64::MAX);
        let bytes = writer.finish();

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.vi().unwrap(), i64::MIN);
        assert_eq!(reader.vi().unwrap(), i64::MAX);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_string_nt() {
        let mut writer = Writer::new();
        writer.string_nt("arena closed").u8(7);
        let bytes = writer.finish();
        assert_eq!(bytes[12], 0);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.string_nt().unwrap(), "arena closed");
        assert_eq!(reader.u8().unwrap(), 7);
    }

    #[test]
    fn test_player_count_packet_layout() {
        let bytes = encode_player_count(2);
        assert_eq!(&bytes[..], &[ClientBound::PlayerCount as u8, 0x02]);

        let bytes = encode_player_count(200);
        assert_eq!(&bytes[..], &[0x0A, 0xC8, 0x01]);
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = Reader::new(&[0x80, 0x80]);
        assert_eq!(reader.vu(), Err(DecodeError::UnexpectedEof(2)));
    }

    #[test]
    fn test_overlong_varint() {
        let data = [0xFF; 11];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.vu(), Err(DecodeError::VarintOverflow(0)));
    }

    #[test]
    fn test_unterminated_string() {
        let mut reader = Reader::new(b"abc");
        assert_eq!(reader.string_nt(), Err(DecodeError::UnexpectedEof(3)));
    }

    #[test]
    fn test_invalid_utf8_string() {
        let mut reader = Reader::new(&[0xFF, 0xFE, 0x00]);
        assert_eq!(reader.string_nt(), Err(DecodeError::InvalidUtf8(0)));
    }

    #[test]
    fn test_opcode_lookup() {
        assert_eq!(ClientBound::from_u8(0x0A), Some(ClientBound::PlayerCount));
        assert_eq!(ClientBound::from_u8(0x7F), None);
        assert_eq!(ServerBound::from_u8(0x05), Some(ServerBound::Ping));
        assert_eq!(ServerBound::from_u8(0x00), None);
    }
}
