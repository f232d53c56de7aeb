//! Linear byte memory with free-list span management.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Capacity, MemoryError};

/// A half-open span `[begin, end)` handed out by [`VmMemory::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemChunk {
    /// First byte of the span, inclusive.
    pub begin: usize,
    /// End of the span, exclusive.
    pub end: usize,
}

impl MemChunk {
    /// Length of the span in bytes.
    pub const fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Whether the span covers no bytes.
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// A fixed, zero-initialized byte buffer partitioned into allocated and free
/// spans.
///
/// Free spans are tracked in two indices kept in step on every mutation: an
/// address-ordered map (`begin → end`) and a size-ordered set
/// (`(length, begin)`). Allocation is best-fit through the size index; frees
/// coalesce with adjacent free spans through the address index, so no two
/// free spans ever share an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmMemory {
    data: Vec<u8>,
    by_addr: BTreeMap<usize, usize>,
    by_size: BTreeSet<(usize, usize)>,
}

impl VmMemory {
    /// Create a memory of the given capacity, fully free.
    pub fn new(capacity: Capacity) -> Self {
        let size = capacity.bytes();
        let mut mem = Self {
            data: vec![0; size],
            by_addr: BTreeMap::new(),
            by_size: BTreeSet::new(),
        };
        if size > 0 {
            mem.insert_span(0, size);
        }
        mem
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The whole underlying buffer, including free bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the whole underlying buffer.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Free spans in address order, as `(begin, end)` pairs.
    pub fn free_spans(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.by_addr.iter().map(|(&begin, &end)| (begin, end))
    }

    /// Claim the smallest free span able to hold `size` bytes.
    pub fn alloc(&mut self, size: usize) -> Result<MemChunk, MemoryError> {
        if size == 0 {
            return Ok(MemChunk { begin: 0, end: 0 });
        }

        let (len, begin) = self
            .by_size
            .range((size, 0)..)
            .next()
            .copied()
            .ok_or(MemoryError::OutOfMemory { requested: size })?;

        self.remove_span(begin, begin + len);
        if len > size {
            self.insert_span(begin + size, begin + len);
        }

        Ok(MemChunk {
            begin,
            end: begin + size,
        })
    }

    /// Return the span `[begin, end)` to the free list.
    ///
    /// Out-of-order bounds are swapped. A span reaching outside the buffer or
    /// intersecting an already free span is rejected without touching either
    /// index.
    pub fn free(&mut self, begin: usize, end: usize) -> Result<(), MemoryError> {
        let (begin, end) = if begin > end { (end, begin) } else { (begin, end) };

        if end > self.data.len() {
            return Err(MemoryError::OutOfRange {
                begin,
                end,
                size: self.data.len(),
            });
        }
        if begin == end {
            return Ok(());
        }

        let pred = self
            .by_addr
            .range(..=begin)
            .next_back()
            .map(|(&b, &e)| (b, e));
        let succ = self.by_addr.range(begin..).next().map(|(&b, &e)| (b, e));

        if pred.is_some_and(|(_, pred_end)| pred_end > begin)
            || succ.is_some_and(|(succ_begin, _)| succ_begin < end)
        {
            return Err(MemoryError::DoubleFree { begin, end });
        }

        let mut merged = (begin, end);
        if let Some((pred_begin, pred_end)) = pred {
            if pred_end == begin {
                self.remove_span(pred_begin, pred_end);
                merged.0 = pred_begin;
            }
        }
        if let Some((succ_begin, succ_end)) = succ {
            if succ_begin == end {
                self.remove_span(succ_begin, succ_end);
                merged.1 = succ_end;
            }
        }
        self.insert_span(merged.0, merged.1);

        Ok(())
    }

    /// Free the span described by a [`MemChunk`].
    pub fn free_chunk(&mut self, chunk: MemChunk) -> Result<(), MemoryError> {
        self.free(chunk.begin, chunk.end)
    }

    fn insert_span(&mut self, begin: usize, end: usize) {
        self.by_addr.insert(begin, end);
        self.by_size.insert((end - begin, begin));
    }

    fn remove_span(&mut self, begin: usize, end: usize) {
        self.by_addr.remove(&begin);
        self.by_size.remove(&(end - begin, begin));
    }
}
