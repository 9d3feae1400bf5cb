use crate::error::{GpkgError, Result};

use super::varint::decode_varint;

/// Bounds-checked cursor over a binary geometry buffer.
///
/// The byte order is switchable so nested WKB members can each declare their own.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian: false,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let remaining = self.remaining();
        if remaining < N {
            return Err(GpkgError::BufferUnderrun {
                needed: N,
                remaining,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.take::<1>()?;
        Ok(b)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take::<4>()?;
        Ok(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        let bytes = self.take::<8>()?;
        Ok(if self.big_endian {
            f64::from_be_bytes(bytes)
        } else {
            f64::from_le_bytes(bytes)
        })
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        decode_varint(self.buf, &mut self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_byte_orders() -> crate::Result<()> {
        let buf = [0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00];
        let mut reader = ByteReader::new(&buf);
        reader.set_big_endian(true);
        assert_eq!(reader.read_u32()?, 1);
        reader.set_big_endian(false);
        assert_eq!(reader.read_u32()?, 1);
        assert_eq!(reader.remaining(), 0);
        Ok(())
    }

    #[test]
    fn short_read_reports_underrun() {
        let mut reader = ByteReader::new(&[0x01, 0x02]);
        match reader.read_f64() {
            Err(GpkgError::BufferUnderrun { needed, remaining }) => {
                assert_eq!(needed, 8);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
