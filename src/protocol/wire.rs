use crate::protocol::op::WireEnum;

/// Smallest `capacity - margin` a segment may be configured with.
///
/// Every fixed-layout action, and every variable-length action once clamped, fits in this many
/// bytes.
pub const MIN_ACTION_ROOM: usize = 64;

/// Bytes used by a length-prefixed text of `units` UTF-16 code units.
pub const fn text_len(units: usize) -> usize {
    4 + 2 * units
}

/// Errors raised while replaying a segment. Each one halts the segment it occurred in.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {opcode} at byte {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("segment ended at byte {offset} with {needed} more bytes expected")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unknown {what} tag {tag} at byte {offset}")]
    UnknownTag {
        what: &'static str,
        tag: u8,
        offset: usize,
    },
}

/// Little-endian primitive writes onto a segment buffer.
pub trait WireWrite {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_u32(&mut self, v: u32);
    fn put_f32(&mut self, v: f32);

    fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    fn put_enum<E: WireEnum>(&mut self, v: E) {
        self.put_u8(v.wire());
    }

    /// `u32` code-unit count followed by the UTF-16 code units of `s`.
    fn put_text(&mut self, s: &str) {
        let units = s.encode_utf16().count();
        self.put_u32(units as u32);
        for u in s.encode_utf16() {
            self.put_u16(u);
        }
    }
}

impl WireWrite for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.extend_from_slice(&v.to_le_bytes());
    }
}

/// Cursor over one segment's bytes.
pub struct SegmentReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Byte offset of the next read.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos.checked_add(N).filter(|&e| e <= self.buf.len());
        let Some(end) = end else {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: N - (self.buf.len() - self.pos.min(self.buf.len())),
            });
        };
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    /// Any non-zero byte reads as `true`.
    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub fn enum_tag<E: WireEnum>(&mut self) -> Result<E, DecodeError> {
        let offset = self.pos;
        let tag = self.u8()?;
        E::try_from(tag).map_err(|tag| DecodeError::UnknownTag {
            what: E::WHAT,
            tag,
            offset,
        })
    }

    /// Length-prefixed UTF-16 text. Unpaired surrogates decode to U+FFFD.
    pub fn text(&mut self) -> Result<String, DecodeError> {
        let units = self.u32()? as usize;
        let bytes = units.saturating_mul(2);
        let remaining = self.buf.len() - self.pos;
        if bytes > remaining {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: bytes - remaining,
            });
        }
        let raw = &self.buf[self.pos..self.pos + bytes];
        let code_units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        self.pos += bytes;
        Ok(String::from_utf16_lossy(&code_units))
    }
}

/// Longest prefix of `s` whose UTF-16 length is at most `max_units`.
///
/// Cuts only at character boundaries, so a surrogate pair is never split.
pub fn truncate_utf16(s: &str, max_units: usize) -> &str {
    let mut units = 0usize;
    for (idx, ch) in s.char_indices() {
        if units + ch.len_utf16() > max_units {
            return &s[..idx];
        }
        units += ch.len_utf16();
    }
    s
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/wire.rs"]
mod tests;
