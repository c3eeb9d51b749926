// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use uuid::Uuid;

/// A read that would go past the end of the readable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub offset: usize,
    pub size: usize,
    pub available: usize,
}

/// Bounds-checked little-endian reads at absolute offsets of a descriptor buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Reader over the same buffer which refuses reads at or beyond `end`.
    /// Offsets stay absolute.
    pub fn limited_to(&self, end: usize) -> ByteReader<'a> {
        ByteReader { data: &self.data[..end.min(self.data.len())] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_bytes(&self, offset: usize, size: usize) -> Result<&'a [u8], OutOfBounds> {
        match offset.checked_add(size) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(OutOfBounds { offset, size, available: self.data.len() }),
        }
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, OutOfBounds> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16_le(&self, offset: usize) -> Result<u16, OutOfBounds> {
        let bytes = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&self, offset: usize) -> Result<u32, OutOfBounds> {
        let bytes = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a GUID stored in the mixed-endian layout used by BOS platform capabilities.
    pub fn read_uuid(&self, offset: usize) -> Result<Uuid, OutOfBounds> {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(self.read_bytes(offset, 16)?);
        Ok(Uuid::from_bytes_le(bytes))
    }

    /// Fixed-size ASCII field, trailing NUL padding removed.
    pub fn read_ascii(&self, offset: usize, size: usize) -> Result<String, OutOfBounds> {
        let bytes = self.read_bytes(offset, size)?;
        let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        Ok(bytes[..end].iter().map(|b| if b.is_ascii() { *b as char } else { '.' }).collect())
    }

    /// UTF-16LE text without trailing NUL terminators. An odd trailing byte is ignored,
    /// unpaired surrogates are replaced.
    pub fn read_utf16le(&self, offset: usize, size: usize) -> Result<String, OutOfBounds> {
        let bytes = self.read_bytes(offset, size)?;
        let mut text = decode_utf16le(bytes);
        text.truncate(text.trim_end_matches('\0').len());
        Ok(text)
    }

    pub fn read_utf8(&self, offset: usize, size: usize) -> Result<String, OutOfBounds> {
        let bytes = self.read_bytes(offset, size)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

pub(crate) fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x34, 0x12, 0x78, 0x56, 0xAA];
        let reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8(4).unwrap(), 0xAA);
        assert_eq!(reader.read_u16_le(0).unwrap(), 0x1234);
        assert_eq!(reader.read_u32_le(0).unwrap(), 0x5678_1234);
    }

    #[test]
    fn test_read_past_end() {
        let data = [1, 2, 3];
        let reader = ByteReader::new(&data);
        assert_eq!(
            reader.read_u16_le(2),
            Err(OutOfBounds { offset: 2, size: 2, available: 3 })
        );
        assert!(reader.read_bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_limited_reader_keeps_absolute_offsets() {
        let data = [0, 1, 2, 3, 4, 5];
        let reader = ByteReader::new(&data).limited_to(4);
        assert_eq!(reader.read_u8(3).unwrap(), 3);
        assert!(reader.read_u8(4).is_err());
        assert_eq!(ByteReader::new(&data).limited_to(100).len(), 6);
    }

    #[test]
    fn test_uuid_is_read_mixed_endian() {
        let data = [
            0x38, 0xB6, 0x08, 0x34, 0xA9, 0x09, 0xA0, 0x47,
            0x8B, 0xFD, 0xA0, 0x76, 0x88, 0x15, 0xB6, 0x65,
        ];
        let uuid = ByteReader::new(&data).read_uuid(0).unwrap();
        assert_eq!(uuid, Uuid::from_u128(0x3408b638_09a9_47a0_8bfd_a0768815b665));
    }

    #[test]
    fn test_text_reads() {
        let data = [b'W', b'I', b'N', b'U', b'S', b'B', 0, 0, b'A', 0, 0xAC, 0x20];
        let reader = ByteReader::new(&data);
        assert_eq!(reader.read_ascii(0, 8).unwrap(), "WINUSB");
        assert_eq!(reader.read_utf16le(8, 4).unwrap(), "A€");
    }
}
