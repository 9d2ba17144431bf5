// crates/kryon-core/src/reader.rs
use crate::{KryonError, Result};

/// Bounds-checked little-endian cursor over a borrowed byte buffer.
///
/// Every read reports `UnexpectedEof` instead of slicing past the end, so a
/// truncated or hostile file can never panic the decoder.
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn tell(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn seek(&mut self, target: usize) -> Result<()> {
        if target > self.data.len() {
            return Err(KryonError::OutOfBounds {
                target,
                len: self.data.len(),
            });
        }
        self.position = target;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.check(count)?;
        self.position += count;
        Ok(())
    }

    fn check(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(KryonError::UnexpectedEof {
                offset: self.position,
                needed: needed - self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.check(1)?;
        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.check(2)?;
        let value = u16::from_le_bytes([self.data[self.position], self.data[self.position + 1]]);
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.check(4)?;
        let value = u32::from_le_bytes([
            self.data[self.position],
            self.data[self.position + 1],
            self.data[self.position + 2],
            self.data[self.position + 3],
        ]);
        self.position += 4;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.check(count)?;
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    /// Reads a 1-byte length prefix followed by that many bytes of UTF-8.
    /// Invalid sequences are replaced rather than rejected; a prefix that
    /// overruns the buffer is `BadStringLength`.
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        let at = self.position;
        let length = self.read_u8()? as usize;
        if self.remaining() < length {
            return Err(KryonError::BadStringLength(at));
        }
        let bytes = self.read_bytes(length)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0302);
        assert_eq!(reader.read_u32_le().unwrap(), 0x07060504);
        assert_eq!(reader.tell(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_reads_report_eof_not_panic() {
        let data = [0xAA];
        let mut reader = ByteReader::new(&data);
        assert!(matches!(
            reader.read_u32_le(),
            Err(KryonError::UnexpectedEof { offset: 0, .. })
        ));
        // the failed read must not advance the cursor
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn seek_rejects_out_of_bounds_targets() {
        let data = [0u8; 4];
        let mut reader = ByteReader::new(&data);
        reader.seek(4).unwrap(); // one-past-the-end is a valid cursor
        assert!(matches!(
            reader.seek(5),
            Err(KryonError::OutOfBounds { target: 5, len: 4 })
        ));
    }

    #[test]
    fn skip_is_bounds_checked() {
        let data = [0u8; 3];
        let mut reader = ByteReader::new(&data);
        reader.skip(2).unwrap();
        assert!(reader.skip(2).is_err());
        assert_eq!(reader.tell(), 2);
    }

    #[test]
    fn length_prefixed_strings() {
        let data = [5, b'h', b'e', b'l', b'l', b'o', 3, b'a'];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_length_prefixed_string().unwrap(), "hello");
        assert!(matches!(
            reader.read_length_prefixed_string(),
            Err(KryonError::BadStringLength(6))
        ));
    }
}
