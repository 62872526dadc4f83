use std::fmt;
use std::io::{self, Read, Write};

/// Both protocol sides share the same 7-bit varint group encoding; they differ
/// in whether signed values are zigzag-folded (Bedrock) or bit-cast (Java).
const VARINT_MORE: u8 = 0x80;
const VARINT_MASK: u8 = 0x7f;

#[derive(Debug)]
pub enum ProtocolError {
    Io(io::Error),
    /// Ran out of bytes mid-value.
    Eof,
    Malformed(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Io(err) => write!(f, "io error: {err}"),
            ProtocolError::Eof => write!(f, "unexpected end of packet"),
            ProtocolError::Malformed(msg) => write!(f, "malformed packet: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> ProtocolError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::Eof
        } else {
            ProtocolError::Io(err)
        }
    }
}

/// A value with a fixed wire layout on one protocol side.
pub trait Serializable: Sized {
    fn read_from<R: Read>(r: &mut R) -> Result<Self, ProtocolError>;
    fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ProtocolError>;
}

pub fn write_varuint32<W: Write>(w: &mut W, mut val: u32) -> Result<(), ProtocolError> {
    loop {
        let byte = (val & VARINT_MASK as u32) as u8;
        val >>= 7;
        if val == 0 {
            w.write_all(&[byte])?;
            return Ok(());
        }
        w.write_all(&[byte | VARINT_MORE])?;
    }
}

pub fn read_varuint32<R: Read>(r: &mut R) -> Result<u32, ProtocolError> {
    let mut val = 0u32;
    for shift in 0..5 {
        let mut byte = [0u8];
        r.read_exact(&mut byte)?;
        val |= ((byte[0] & VARINT_MASK) as u32) << (shift * 7);
        if byte[0] & VARINT_MORE == 0 {
            return Ok(val);
        }
    }
    log::warn!("varint32 longer than 5 bytes");
    Err(ProtocolError::Malformed("varint32 overflow".to_string()))
}

pub fn write_varuint64<W: Write>(w: &mut W, mut val: u64) -> Result<(), ProtocolError> {
    loop {
        let byte = (val & VARINT_MASK as u64) as u8;
        val >>= 7;
        if val == 0 {
            w.write_all(&[byte])?;
            return Ok(());
        }
        w.write_all(&[byte | VARINT_MORE])?;
    }
}

pub fn read_varuint64<R: Read>(r: &mut R) -> Result<u64, ProtocolError> {
    let mut val = 0u64;
    for shift in 0..10 {
        let mut byte = [0u8];
        r.read_exact(&mut byte)?;
        val |= ((byte[0] & VARINT_MASK) as u64) << (shift * 7);
        if byte[0] & VARINT_MORE == 0 {
            return Ok(val);
        }
    }
    log::warn!("varint64 longer than 10 bytes");
    Err(ProtocolError::Malformed("varint64 overflow".to_string()))
}

/// Bedrock signed varint (zigzag).
pub fn write_varint32<W: Write>(w: &mut W, val: i32) -> Result<(), ProtocolError> {
    write_varuint32(w, ((val << 1) ^ (val >> 31)) as u32)
}

pub fn read_varint32<R: Read>(r: &mut R) -> Result<i32, ProtocolError> {
    let raw = read_varuint32(r)?;
    Ok((raw >> 1) as i32 ^ -((raw & 1) as i32))
}

/// Java signed varint (plain bit cast, no zigzag).
pub fn write_java_varint<W: Write>(w: &mut W, val: i32) -> Result<(), ProtocolError> {
    write_varuint32(w, val as u32)
}

pub fn read_java_varint<R: Read>(r: &mut R) -> Result<i32, ProtocolError> {
    Ok(read_varuint32(r)? as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn varint_boundaries() {
        for val in [0u32, 1, 127, 128, 16383, 16384, u32::MAX] {
            let mut buf = Vec::new();
            write_varuint32(&mut buf, val).unwrap();
            assert_eq!(read_varuint32(&mut Cursor::new(&buf)).unwrap(), val);
        }
    }

    #[test]
    fn zigzag_keeps_small_negatives_short() {
        let mut buf = Vec::new();
        write_varint32(&mut buf, -1).unwrap();
        assert_eq!(buf, [0x01]);

        buf.clear();
        write_varint32(&mut buf, -64).unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(read_varint32(&mut Cursor::new(&buf)).unwrap(), -64);
    }

    #[test]
    fn java_varint_negative_is_five_bytes() {
        let mut buf = Vec::new();
        write_java_varint(&mut buf, -1).unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(read_java_varint(&mut Cursor::new(&buf)).unwrap(), -1);
    }

    #[test]
    fn truncated_varint_reports_eof() {
        let buf = [0x80u8];
        match read_varuint32(&mut Cursor::new(&buf)) {
            Err(ProtocolError::Eof) => {}
            other => panic!("expected eof, got {other:?}"),
        }
    }
}
