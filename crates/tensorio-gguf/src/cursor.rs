//! Bounds-checked little-endian reads over a byte slice

use tensorio_common::{Result, TensorIoError};

/// Forward-only reader that tracks its byte offset.
///
/// Every read checks bounds and advances the offset by exactly the number of
/// bytes consumed; nothing is consumed on error.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
    max_string_len: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], offset: usize, max_string_len: usize) -> Self {
        Self { data, offset, max_string_len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|&end| end <= self.data.len()).ok_or_else(
            || {
                TensorIoError::format(format!(
                    "unexpected end of data: need {len} bytes at offset {}, have {}",
                    self.offset,
                    self.remaining()
                ))
            },
        )?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Length as `usize`, rejecting values that cannot fit in the remaining data.
    pub fn read_len(&mut self, what: &str) -> Result<usize> {
        let at = self.offset;
        let len = self.read_u64()?;
        usize::try_from(len).ok().filter(|&l| l <= self.remaining()).ok_or_else(|| {
            TensorIoError::format(format!(
                "{what} length {len} at offset {at} exceeds the remaining {} bytes",
                self.remaining()
            ))
        })
    }

    /// `[u64 len][bytes]`, UTF-8 decoded. Invalid UTF-8 is replaced lossily.
    pub fn read_string(&mut self) -> Result<String> {
        let at = self.offset;
        let len = self.read_u64()?;
        if len > self.max_string_len as u64 {
            return Err(TensorIoError::format(format!(
                "string length {len} exceeds maximum {} at offset {at}",
                self.max_string_len
            )));
        }
        let bytes = self.read_bytes(len as usize)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => {
                tracing::warn!(
                    offset = at,
                    "GGUF string contained invalid UTF-8; decoding lossily"
                );
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_and_advances() {
        let mut data = Vec::new();
        data.push(0xAB);
        data.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data.extend_from_slice(&42u64.to_le_bytes());
        let mut c = ByteCursor::new(&data, 0, 1024);
        assert_eq!(c.read_u8().unwrap(), 0xAB);
        assert_eq!(c.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(c.read_u64().unwrap(), 42);
        assert_eq!(c.offset(), 13);
        assert_eq!(c.remaining(), 0);
        assert!(c.read_u8().is_err());
    }

    #[test]
    fn short_read_does_not_advance() {
        let data = [1u8, 2, 3];
        let mut c = ByteCursor::new(&data, 1, 1024);
        assert!(c.read_u32().is_err());
        assert_eq!(c.offset(), 1);
    }

    #[test]
    fn test_lossy_utf8_string_does_not_panic() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u64.to_le_bytes());
        data.extend_from_slice(&[0xC3, 0x28]); // invalid UTF-8 sequence
        let mut c = ByteCursor::new(&data, 0, 1024);
        let s = c.read_string().unwrap();
        assert!(s.contains('\u{FFFD}'), "expected replacement char in lossy decode");
        assert_eq!(c.offset(), 10);
    }

    #[test]
    fn string_longer_than_limit_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&5u64.to_le_bytes());
        data.extend_from_slice(b"hello");
        let mut c = ByteCursor::new(&data, 0, 4);
        assert!(c.read_string().is_err());
    }

    #[test]
    fn read_len_rejects_lengths_past_the_end() {
        let data = u64::MAX.to_le_bytes();
        let mut c = ByteCursor::new(&data, 0, 1024);
        assert!(c.read_len("array").is_err());
    }
}
