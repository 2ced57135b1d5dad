// ByteBuffer - little-endian packet assembly and parsing

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Packet construction buffer. All multi-byte integers are little-endian;
/// strings are written NUL-terminated.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn write_u8(&mut self, val: u8) {
        self.data.push(val);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.data.write_u16::<LittleEndian>(val).expect("vec write");
    }

    pub fn write_u32(&mut self, val: u32) {
        self.data.write_u32::<LittleEndian>(val).expect("vec write");
    }

    pub fn write_f32(&mut self, val: f32) {
        self.data.write_f32::<LittleEndian>(val).expect("vec write");
    }

    /// NUL-terminated string.
    pub fn write_cstring(&mut self, val: &str) {
        self.data.extend_from_slice(val.as_bytes());
        self.data.push(0);
    }

    fn check_available(&self, count: usize) -> Result<(), std::io::Error> {
        if self.read_pos + count > self.data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "ByteBuffer read past end",
            ));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, std::io::Error> {
        self.check_available(1)?;
        let val = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16, std::io::Error> {
        self.check_available(2)?;
        let val = Cursor::new(&self.data[self.read_pos..]).read_u16::<LittleEndian>()?;
        self.read_pos += 2;
        Ok(val)
    }

    pub fn read_u32(&mut self) -> Result<u32, std::io::Error> {
        self.check_available(4)?;
        let val = Cursor::new(&self.data[self.read_pos..]).read_u32::<LittleEndian>()?;
        self.read_pos += 4;
        Ok(val)
    }

    pub fn read_f32(&mut self) -> Result<f32, std::io::Error> {
        self.check_available(4)?;
        let val = Cursor::new(&self.data[self.read_pos..]).read_f32::<LittleEndian>()?;
        self.read_pos += 4;
        Ok(val)
    }

    /// Read up to the next NUL byte.
    pub fn read_cstring(&mut self) -> Result<String, std::io::Error> {
        let start = self.read_pos;
        while self.read_pos < self.data.len() && self.data[self.read_pos] != 0 {
            self.read_pos += 1;
        }
        if self.read_pos >= self.data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unterminated string",
            ));
        }
        let s = String::from_utf8_lossy(&self.data[start..self.read_pos]).into_owned();
        self.read_pos += 1;
        Ok(s)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, std::io::Error> {
        self.check_available(count)?;
        let bytes = self.data[self.read_pos..self.read_pos + count].to_vec();
        self.read_pos += count;
        Ok(bytes)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        ByteBuffer { data, read_pos: 0 }
    }
}
