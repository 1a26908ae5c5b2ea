//! High-level interface to the DW1000
//!
//! The entry point to this API is the [DW1000] struct. Please refer to the
//! documentation there for more details.
//!
//! This module implements a polled receiver on top of the
//! [register-level interface]. A receive operation goes through these
//! states:
//!
//! ```text
//! Idle --start_receiving--> Armed --poll--> Frame | SizeViolation
//!   ^                                     | Timeout | DeviceError
//!   |                                     |
//!   +-------------------------------------+
//! ```
//!
//! Device errors and timeouts are recovered from by resetting the receiver,
//! and reported as an [`RxEvent`]. Only bus failures are reported as errors.
//!
//! [register-level interface]: ../ll/index.html

use core::fmt;

use crate::{configs::DriverConfig, ll, regs::SysStatus};

pub use error::*;
pub use frame::*;
pub use receiving::*;
pub use uninitialized::*;

mod control;
mod error;
mod frame;
mod receiving;
mod uninitialized;


/// Entry point to the DW1000 driver API
///
/// There's one instance per DW1000. It is passed by reference into every
/// operation, so several simulated instances can coexist in tests.
pub struct DW1000<SPI, CS, IRQ> {
    ll: ll::DW1000<SPI, CS, IRQ>,
    state: RxState,
    frame: FrameBuffer,
    last_status: SysStatus,
    last_frame_len: u16,
    config: DriverConfig,
}

/// The state of the receiver
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RxState {
    /// The receiver is off, or a receive operation has finished
    Idle,

    /// The receiver has been enabled and is waiting for a frame
    Armed,
}

impl<SPI, CS, IRQ> DW1000<SPI, CS, IRQ> {
    /// Provides direct access to the register-level API
    ///
    /// Be aware that by using the register-level API, you can invalidate
    /// various assumptions that the high-level API makes about the operation
    /// of the DW1000. Don't use the register-level and high-level APIs in
    /// tandem, unless you know what you're doing.
    pub fn ll(&mut self) -> &mut ll::DW1000<SPI, CS, IRQ> {
        &mut self.ll
    }

    /// The state of the receiver
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Whether a receive operation is ongoing
    pub fn is_receiving(&self) -> bool {
        self.state == RxState::Armed
    }

    /// The status word read by the most recent poll
    pub fn last_status(&self) -> SysStatus {
        self.last_status
    }

    /// The frame length reported for the most recent good frame
    ///
    /// This is the length field as read from the DW1000, even if the frame
    /// didn't fit into the frame buffer.
    pub fn last_frame_len(&self) -> u16 {
        self.last_frame_len
    }

    /// The frame buffer
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame
    }

    /// The configuration this instance was created with
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Releases the SPI peripheral, chip select pin and interrupt control
    pub fn free(self) -> (SPI, CS, IRQ) {
        self.ll.free()
    }
}

// Can't be derived without putting requirements on `SPI`, `CS` and `IRQ`.
impl<SPI, CS, IRQ> fmt::Debug for DW1000<SPI, CS, IRQ> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DW1000 {{ state: {:?}, last_status: {:?}, last_frame_len: {}, .. }}",
            self.state, self.last_status, self.last_frame_len,
        )
    }
}
