//! Receive core for the DW1000 UWB transceiver
//!
//! The crate is layered like this:
//!
//! - [`hl`]: A receiver that is armed, polled until the DW1000 reports a
//!   frame, a timeout or an error, and forwards good frames to a serial sink.
//! - [`ll`]: Register access and the SPI transport underneath it. Every SPI
//!   transaction runs inside a critical section, see [`irq`].
//! - [`regs`]: The part of the DW1000 register map that is used here.
//!
//! Radio configuration values live in [`configs`]. Applying them is up to a
//! [`configs::RadioDriver`] implementation.


#![cfg_attr(not(test), no_std)]

#![deny(missing_docs)]


pub mod configs;
pub mod hl;
pub mod irq;
pub mod ll;
pub mod regs;
pub mod util;

#[cfg(test)]
mod mock;


pub use crate::{
    configs::{DriverConfig, RadioConfig, RadioDriver},
    hl::{
        FrameBuffer,
        RxEvent,
        RxFault,
        RxState,
        UninitializedDW1000,
        DW1000,
        Error,
        FRAME_LEN_MAX,
    },
    ll::{Registers, Transport},
};
