// MessageBuffer - growable read buffer for partial socket reads
//
// A contiguous byte array with two cursors, read_pos <= write_pos <= len.
// The socket reader appends at write_pos; the packet dispatcher consumes
// from read_pos. Growth is unbounded by itself; callers enforce
// per-opcode size caps before waiting for more input.

/// Default growth block, also the initial capacity.
pub const BUFFER_BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct MessageBuffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_BLOCK_SIZE)
    }

    pub fn with_capacity(size: usize) -> Self {
        MessageBuffer {
            storage: vec![0u8; size],
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Bytes written but not yet consumed.
    pub fn active_size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Bytes writable without growing.
    pub fn remaining_size(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Shift the active region to the front of the storage.
    pub fn normalize(&mut self) {
        if self.read_pos == 0 {
            return;
        }
        if self.read_pos != self.write_pos {
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
        }
        self.write_pos -= self.read_pos;
        self.read_pos = 0;
    }

    /// Grow by one block when no writable space remains.
    pub fn ensure_free_space(&mut self) {
        if self.remaining_size() == 0 {
            self.storage.resize(self.storage.len() + BUFFER_BLOCK_SIZE, 0);
        }
    }

    pub fn read_completed(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.active_size());
        self.read_pos += bytes;
    }

    pub fn write_completed(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.remaining_size());
        self.write_pos += bytes;
    }

    /// The unconsumed bytes.
    pub fn read_slice(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// The writable tail.
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.write_pos..]
    }

    /// Append a chunk, growing as needed.
    pub fn write(&mut self, data: &[u8]) {
        self.normalize();
        while self.remaining_size() < data.len() {
            self.storage.resize(self.storage.len() + BUFFER_BLOCK_SIZE, 0);
        }
        self.storage[self.write_pos..self.write_pos + data.len()].copy_from_slice(data);
        self.write_pos += data.len();
    }
}
