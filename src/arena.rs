//! Pooled storage for small fixed-size records.
//!
//! An [`Arena`] hands out records from a chain of fixed-capacity blocks. Records
//! are never released individually: the whole chain is either cleared, keeping
//! its blocks for reuse, or released. Handles are plain indices so the records
//! can link to one another without aliasing borrows.

use std::mem;

use crate::config;
use crate::error::{ErrorKind, Result};


/// Bytes reserved at the start of every block for its bookkeeping: block size,
/// write offset, and the links to its neighbours.
pub const HEADER_BYTES: usize = 4 * mem::size_of::<usize>();

/// Round a record size up to the allocation alignment.
pub fn round_up(size: usize) -> usize {
    let size = size.max(1);
    (size + config::ALIGNMENT - 1) / config::ALIGNMENT * config::ALIGNMENT
}

/// One block in the chain. Its neighbours are the blocks either side of it in
/// the owning arena.
#[derive(Debug)]
struct MemBlock<T> {
    block_size: usize,  // total bytes, header included
    data_offset: usize, // bytes in use, header included
    records: Vec<T>,
}

impl<T> MemBlock<T> {
    fn new(block_size: usize, slots: usize, name: &'static str) -> Result<Self> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(slots)
            .map_err(|_| ErrorKind::OutOfMemory { name })?;
        Ok(Self {
            block_size,
            data_offset: HEADER_BYTES,
            records,
        })
    }

    fn has_room(&self, size: usize) -> bool {
        self.data_offset + size <= self.block_size
    }
}

/// A growable pool of `T` records addressed by index.
#[derive(Debug)]
pub struct Arena<T> {
    name: &'static str,
    block_size: usize,
    record_size: usize,
    blocks: Vec<MemBlock<T>>,
    current: usize, // block receiving new records
    released: bool,
}

impl<T> Arena<T> {
    /// Creates an empty arena. Blocks of `block_size` bytes are created on demand.
    pub fn new(name: &'static str, block_size: usize) -> Self {
        Self {
            name,
            block_size,
            record_size: round_up(mem::size_of::<T>()),
            blocks: Vec::new(),
            current: 0,
            released: false,
        }
    }

    /// Number of records that fit in one block.
    pub fn slots_per_block(&self) -> usize {
        self.block_size.saturating_sub(HEADER_BYTES) / self.record_size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of records handed out since the last clear.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|block| block.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` in the free tail of the current block, moving on to the
    /// next block (creating it if needed) when the current one is full.
    pub fn alloc(&mut self, value: T) -> Result<usize> {
        if self.released {
            return Err(ErrorKind::Released { name: self.name }.into());
        }
        let size = self.record_size;
        let capacity = self.block_size.saturating_sub(HEADER_BYTES);
        if size > capacity {
            return Err(ErrorKind::OversizedRequest {
                name: self.name,
                requested: size,
                capacity,
            }
            .into());
        }

        if self.blocks.is_empty() {
            self.blocks
                .push(MemBlock::new(self.block_size, self.slots_per_block(), self.name)?);
            self.current = 0;
        }
        if !self.blocks[self.current].has_room(size) {
            if self.current + 1 == self.blocks.len() {
                let block = MemBlock::new(self.block_size, self.slots_per_block(), self.name)?;
                self.blocks.push(block);
            }
            self.current += 1;
        }

        let slots = self.slots_per_block();
        let block = &mut self.blocks[self.current];
        let slot = block.records.len();
        block.records.push(value);
        block.data_offset += size;
        Ok(self.current * slots + slot)
    }

    pub fn get(&self, index: usize) -> &T {
        let slots = self.slots_per_block();
        &self.blocks[index / slots].records[index % slots]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let slots = self.slots_per_block();
        &mut self.blocks[index / slots].records[index % slots]
    }

    /// Resets every block's write offset without returning memory.
    pub fn clear(&mut self) {
        for block in self.blocks.iter_mut() {
            block.records.clear();
            block.data_offset = HEADER_BYTES;
        }
        self.current = 0;
        self.released = false;
    }

    /// Frees every block. The arena refuses further requests.
    pub fn release(&mut self) {
        self.blocks = Vec::new();
        self.current = 0;
        self.released = true;
    }
}
