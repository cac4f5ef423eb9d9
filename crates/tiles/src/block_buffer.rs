use film_protocol::ImageBlock;
use model::{PixelPoint, PixelSize};

/// Reusable block storage. Owned by the accumulator between acquire and release.
#[derive(Debug)]
pub struct BlockBuffer {
    block: ImageBlock,
}

impl BlockBuffer {
    fn with_capacity(capacity: usize) -> Self {
        let block = ImageBlock::from_data(
            PixelPoint::new(0, 0),
            PixelSize::new(0, 0),
            0,
            0,
            Vec::with_capacity(capacity),
        )
        .unwrap_or_else(|error| panic!("empty block buffer rejected: {error}"));
        Self { block }
    }

    pub fn block(&self) -> &ImageBlock {
        &self.block
    }

    pub(crate) fn block_mut(&mut self) -> &mut ImageBlock {
        &mut self.block
    }

    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// Overwrites the whole buffer with `source`. No zeroing pass happens first.
    pub(crate) fn reset_from(&mut self, source: &ImageBlock) {
        source.copy_to(&mut self.block);
    }
}

/// Buffer bookkeeping local to one accumulator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage {
    allocated: usize,
    live: usize,
    peak: usize,
}

impl BufferUsage {
    /// Buffers ever allocated; the free list never gives memory back.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Buffers currently held outside the free list.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Highest `live` value observed so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    fn on_acquire(&mut self, allocated: bool) {
        self.allocated += allocated as usize;
        self.live += 1;
        self.peak = self.peak.max(self.live);
    }

    fn on_release(&mut self) {
        self.live = self
            .live
            .checked_sub(1)
            .unwrap_or_else(|| panic!("block buffer released more often than acquired"));
    }
}

/// LIFO pool of spare block buffers, keyed only by capacity.
#[derive(Debug, Default)]
pub struct FreeList {
    buffers: Vec<BlockBuffer>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the most recently released buffer holding at least `min_capacity` samples,
    /// allocating a fresh one when no pooled buffer is large enough.
    pub fn acquire(&mut self, min_capacity: usize, usage: &mut BufferUsage) -> BlockBuffer {
        let reusable = self
            .buffers
            .iter()
            .rposition(|buffer| buffer.capacity() >= min_capacity);
        match reusable {
            Some(position) => {
                usage.on_acquire(false);
                self.buffers.remove(position)
            }
            None => {
                usage.on_acquire(true);
                BlockBuffer::with_capacity(min_capacity)
            }
        }
    }

    pub fn release(&mut self, buffer: BlockBuffer, usage: &mut BufferUsage) {
        usage.on_release();
        self.buffers.push(buffer);
    }

    /// Drops every pooled buffer and returns how many were freed.
    pub fn clear(&mut self) -> usize {
        let count = self.buffers.len();
        self.buffers.clear();
        count
    }
}
