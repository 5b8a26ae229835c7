//! Aligned owned buffer for block bytes.

/// An owned block buffer with `f32`-compatible alignment.
///
/// Block buffers are byte-addressed, but the codec hands out borrowed
/// `&[f32]` views into the vector regions, which requires the allocation to
/// be at least 4-byte aligned. Backing the buffer with `u64` words
/// guarantees 8-byte alignment; block sizes are multiples of 64 so the word
/// count is always exact.
pub struct BlockBuf {
    words: Vec<u64>,
    len: usize,
}

impl BlockBuf {
    /// Allocates a zero-filled buffer of `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len` is not a multiple of 8; the layout validator only
    /// produces block sizes in multiples of 64.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        assert_eq!(len % 8, 0, "block sizes are 64-byte aligned");
        Self {
            words: vec![0u64; len / 8],
            len,
        }
    }

    /// Buffer length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only byte view.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Mutable byte view.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}
