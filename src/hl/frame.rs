/// Capacity of the frame buffer
///
/// The longest frame possible with the standard PHY header.
pub const FRAME_LEN_MAX: usize = 127;


/// Holds the most recently received frame
///
/// Only the first [`len`] bytes are meaningful, and only after a good frame
/// has been received. Everything else is zero.
///
/// [`len`]: #method.len
pub struct FrameBuffer {
    data: [u8; FRAME_LEN_MAX],
    len: usize,
}

impl FrameBuffer {
    /// Creates an empty, zeroed buffer
    pub const fn new() -> Self {
        FrameBuffer {
            data: [0; FRAME_LEN_MAX],
            len: 0,
        }
    }

    /// Zeroes the buffer and marks it as empty
    pub fn clear(&mut self) {
        self.data = [0; FRAME_LEN_MAX];
        self.len = 0;
    }

    /// Reserves the first `len` bytes for a frame
    ///
    /// Frames longer than the capacity are rejected and leave the buffer
    /// untouched.
    pub fn fill(&mut self, len: usize) -> Result<&mut [u8], SizeViolation> {
        if len > FRAME_LEN_MAX {
            return Err(SizeViolation { len });
        }

        self.len = len;
        Ok(&mut self.data[..len])
    }

    /// The frame
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole buffer, including the bytes after the frame
    pub fn as_raw(&self) -> &[u8; FRAME_LEN_MAX] {
        &self.data
    }

    /// The length of the frame
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds a frame
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}


/// A frame didn't fit into the [`FrameBuffer`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SizeViolation {
    /// The length of the frame
    pub len: usize,
}
