//! Wire codec for the
//! [RFC9420 Sec.2.1.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-2.1.2)
//! presentation language: fixed-width integers, variable-length vectors with a
//! QUIC-style varint length prefix, and optional values.


use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::utilities::error::{Error, Result};

/// Largest value a varint length can carry.
const VARINT_MAX: u32 = (1 << 30) - 1;

#[inline]
fn ensure_remaining<B: Buf>(buf: &B, n: usize) -> Result<()> {
    if buf.remaining() < n {
        Err(Error::BufferTooSmall)
    } else {
        Ok(())
    }
}

/// Reads a length in the 1, 2 or 4 byte encoding selected by the top two bits of the first byte.
#[inline]
pub fn deserialize_varint<B: Buf>(buf: &mut B) -> Result<u32> {
    ensure_remaining(buf, 1)?;
    let first = buf.get_u8();

    let (len, min) = match first >> 6 {
        0 => return Ok(u32::from(first)),
        1 => (2, 1 << 6),
        2 => (4, 1 << 14),
        _ => return Err(Error::InvalidVariableLengthIntegerPrefix),
    };

    ensure_remaining(buf, len - 1)?;
    let value = (1..len).fold(u32::from(first & 0x3f), |acc, _| {
        (acc << 8) | u32::from(buf.get_u8())
    });

    if value < min {
        return Err(Error::MinimumEncodingWasNotUsed);
    }
    Ok(value)
}

#[allow(clippy::cast_possible_truncation)]
#[inline]
pub fn serialize_varint<B: BufMut>(n: u32, buf: &mut B) -> Result<()> {
    match n {
        0..=0x3f => buf.put_u8(n as u8),
        0x40..=0x3fff => buf.put_u16(0x4000 | n as u16),
        0x4000..=VARINT_MAX => buf.put_u32(0x8000_0000 | n),
        _ => return Err(Error::VarintExceeds30Bits),
    }
    Ok(())
}

#[inline]
pub fn deserialize_opaque_vec<B: Buf>(buf: &mut B) -> Result<Bytes> {
    let len = deserialize_varint(buf)? as usize;
    ensure_remaining(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

#[inline]
pub fn serialize_opaque_vec<B: BufMut>(v: &[u8], buf: &mut B) -> Result<()> {
    let len = u32::try_from(v.len()).map_err(|_| Error::OpaqueSizeExceedsMaximumValueOfU32)?;
    serialize_varint(len, buf)?;
    buf.put_slice(v);
    Ok(())
}

/// Reads a length-prefixed vector, handing the body to `f` until it is consumed.
#[inline]
pub fn deserialize_vector<B: Buf>(
    buf: &mut B,
    mut f: impl FnMut(&mut Bytes) -> Result<()>,
) -> Result<()> {
    let mut body = deserialize_opaque_vec(buf)?;
    while body.has_remaining() {
        f(&mut body)?;
    }
    Ok(())
}

/// Writes `n` elements through `f` into a scratch buffer, then emits it with its length prefix.
#[inline]
pub fn serialize_vector<B: BufMut>(
    n: usize,
    buf: &mut B,
    mut f: impl FnMut(usize, &mut BytesMut) -> Result<()>,
) -> Result<()> {
    let mut body = BytesMut::new();
    for i in 0..n {
        f(i, &mut body)?;
    }
    serialize_opaque_vec(&body, buf)
}

#[inline]
pub fn deserialize_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

#[inline]
pub fn deserialize_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    ensure_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

#[inline]
pub fn deserialize_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_u32())
}

#[inline]
pub fn deserialize_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_u64())
}

/// Presence marker of an `optional<T>`: exactly 0 or 1.
#[inline]
pub fn deserialize_optional<B: Buf>(buf: &mut B) -> Result<bool> {
    match deserialize_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidOptionalValue),
    }
}

#[inline]
pub fn serialize_optional<B: BufMut>(present: bool, buf: &mut B) -> Result<()> {
    buf.put_u8(u8::from(present));
    Ok(())
}

pub trait Deserializer {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;

    /// Deserializes a value that must span the whole input.
    fn deserialize_exact(buf: impl AsRef<[u8]>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut buf = buf.as_ref();
        let value = Self::deserialize(&mut buf)?;
        if buf.has_remaining() {
            return Err(Error::TrailingData(buf.remaining()));
        }
        Ok(value)
    }
}

pub trait Serializer {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut;

    fn serialize_detached(&self) -> Result<Bytes>
    where
        Self: Sized,
    {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }
}
