//! Bounds-checked reading and writing on top of the `bytes` traits. The plain `get_*` / `put_*`
//!  methods panic when a buffer is exhausted, which is not acceptable for data coming from (or
//!  going to) the network: these variants report [CodecError::Underflow] and
//!  [CodecError::Overflow] instead, and never write a partial value.

use bytes::BytesMut;
use bytes_varint::{VarIntSupport, VarIntSupportMut};

use crate::error::{CodecError, CodecResult};


macro_rules! checked_get_impl {
    ($checked_getter: ident, $ty:ty, $getter: ident) => {
        fn $checked_getter(&mut self) -> CodecResult<$ty> {
            self.check_remaining(size_of::<$ty>())?;
            Ok(self.$getter())
        }
    }
}

macro_rules! checked_put_impl {
    ($checked_putter: ident, $ty:ty, $putter: ident) => {
        fn $checked_putter(&mut self, v: $ty) -> CodecResult<()> {
            self.check_remaining_mut(size_of::<$ty>())?;
            self.$putter(v);
            Ok(())
        }
    }
}


pub trait BufExt: bytes::Buf {
    fn check_remaining(&self, needed: usize) -> CodecResult<()> {
        if self.remaining() < needed {
            return Err(CodecError::Underflow { needed, remaining: self.remaining() });
        }
        Ok(())
    }

    checked_get_impl!(checked_get_u8, u8, get_u8);
    checked_get_impl!(checked_get_u16, u16, get_u16);
    checked_get_impl!(checked_get_u32, u32, get_u32);
    checked_get_impl!(checked_get_u64, u64, get_u64);
    checked_get_impl!(checked_get_i32, i32, get_i32);
    checked_get_impl!(checked_get_f32, f32, get_f32);
    checked_get_impl!(checked_get_f64, f64, get_f64);

    fn checked_get_bool(&mut self) -> CodecResult<bool> {
        match self.checked_get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(CodecError::InvalidValue(format!("invalid bool encoding {}", n))),
        }
    }

    fn checked_get_u32_varint(&mut self) -> CodecResult<u32> where Self: Sized {
        self.check_remaining(1)?;
        self.try_get_u32_varint()
            .map_err(|e| CodecError::InvalidValue(format!("invalid varint: {:?}", e)))
    }

    /// a string is encoded as its length in bytes (varint) followed by its UTF-8 representation
    fn checked_get_string(&mut self) -> CodecResult<String> where Self: Sized {
        let len = self.checked_get_u32_varint()? as usize;
        self.check_remaining(len)?;

        let mut raw = vec![0u8; len];
        self.copy_to_slice(&mut raw);
        String::from_utf8(raw)
            .map_err(|e| CodecError::InvalidValue(format!("string is not valid UTF-8: {}", e)))
    }
}

pub trait BufMutExt: bytes::BufMut {
    fn check_remaining_mut(&self, needed: usize) -> CodecResult<()> {
        if self.remaining_mut() < needed {
            return Err(CodecError::Overflow { needed, remaining: self.remaining_mut() });
        }
        Ok(())
    }

    checked_put_impl!(checked_put_u8, u8, put_u8);
    checked_put_impl!(checked_put_u16, u16, put_u16);
    checked_put_impl!(checked_put_u32, u32, put_u32);
    checked_put_impl!(checked_put_u64, u64, put_u64);
    checked_put_impl!(checked_put_i32, i32, put_i32);
    checked_put_impl!(checked_put_f32, f32, put_f32);
    checked_put_impl!(checked_put_f64, f64, put_f64);

    fn checked_put_bool(&mut self, v: bool) -> CodecResult<()> {
        self.checked_put_u8(v as u8)
    }

    fn checked_put_slice(&mut self, data: &[u8]) -> CodecResult<()> {
        self.check_remaining_mut(data.len())?;
        self.put_slice(data);
        Ok(())
    }

    fn checked_put_u32_varint(&mut self, v: u32) -> CodecResult<()> {
        let mut encoded = BytesMut::with_capacity(5);
        encoded.put_u32_varint(v);
        self.checked_put_slice(&encoded)
    }

    fn checked_put_string(&mut self, s: &str) -> CodecResult<()> {
        let len: u32 = s.len().try_into()
            .map_err(|_| CodecError::InvalidValue(format!("string of {} bytes is too long", s.len())))?;

        // length and contents are checked together so a failed write leaves nothing behind
        let mut encoded = BytesMut::with_capacity(5);
        encoded.put_u32_varint(len);
        self.check_remaining_mut(encoded.len() + s.len())?;
        self.put_slice(&encoded);
        self.put_slice(s.as_bytes());
        Ok(())
    }
}

impl <T: bytes::Buf + ?Sized> BufExt for T {
}

impl <T: bytes::BufMut + ?Sized> BufMutExt for T {
}
