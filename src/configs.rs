//! Configuration structs for the driver and the radio
//!
//! [`DriverConfig`] controls how this crate talks to the DW1000. It is passed
//! once, when creating an [`UninitializedDW1000`].
//!
//! [`RadioConfig`] describes the physical layer (channel, preamble, data
//! rate, ...). This crate doesn't program those settings itself, nor does it
//! validate them. They are handed to a [`RadioDriver`] implementation, which
//! has full register access, through [`DW1000::configure`].
//!
//! [`UninitializedDW1000`]: ../hl/struct.UninitializedDW1000.html
//! [`DW1000::configure`]: ../hl/struct.DW1000.html#method.configure

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{ll::Transport, util::PollLimit};


/// Applies a [`RadioConfig`] to the DW1000
///
/// Register access is provided through `regs`. Every transaction goes
/// through the transport, so it runs inside a critical section.
pub trait RadioDriver<T: Transport + ?Sized> {
    /// Programs the DW1000 according to `config`
    fn configure(&mut self, regs: &mut T, config: &RadioConfig) -> Result<(), T::Error>;
}


/// Driver configuration
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DriverConfig {
    /// How often chip select is asserted before a transaction starts
    ///
    /// Gives the DW1000 some time to wake up on fast MCUs. Defaults to `0`.
    pub chip_select_delay: u8,

    /// How often a ready flag of the SPI peripheral is checked per byte
    pub bus_limit: PollLimit,

    /// How often the status register is polled while waiting for a frame
    ///
    /// If no receive event shows up in time, the transceiver is turned off.
    /// This should be larger than the receive timeout, if one is configured.
    pub rx_poll_limit: PollLimit,

    /// How often the sink is checked for readiness per forwarded byte
    pub sink_limit: PollLimit,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            chip_select_delay: 0,
            bus_limit: PollLimit::default(),
            rx_poll_limit: PollLimit::new(1_000_000),
            sink_limit: PollLimit::default(),
        }
    }
}


/// Radio configuration
///
/// The defaults are those of a DWM1000 module listening on channel 5 at
/// 6.8 Mbps, with the Decawave SFD for better sensitivity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RadioConfig {
    /// The channel that the DW1000 will listen at
    pub channel: UwbChannel,
    /// The PRF value
    pub pulse_repetition_frequency: PulseRepetitionFrequency,
    /// The preamble length. Only used when transmitting.
    pub preamble_length: PreambleLength,
    /// The preamble acquisition chunk size. Only used when receiving.
    pub pac_size: PacSize,
    /// Preamble code used when transmitting
    pub tx_preamble_code: u8,
    /// Preamble code used when receiving
    pub rx_preamble_code: u8,
    /// The SFD sequence that is used
    pub sfd_sequence: SfdSequence,
    /// The data rate
    pub bitrate: BitRate,
    /// The PHY header mode
    pub phr_mode: PhrMode,
    /// SFD detection timeout, in preamble symbols
    ///
    /// Only used when receiving. See [`RadioConfig::sfd_timeout_for`].
    pub sfd_timeout: u16,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            channel: UwbChannel::Channel5,
            pulse_repetition_frequency: PulseRepetitionFrequency::Mhz64,
            preamble_length: PreambleLength::Symbols128,
            pac_size: PacSize::Pac32,
            tx_preamble_code: 9,
            rx_preamble_code: 9,
            sfd_sequence: SfdSequence::Decawave,
            bitrate: BitRate::Kbps6800,
            phr_mode: PhrMode::Standard,
            sfd_timeout: 1057,
        }
    }
}

impl RadioConfig {
    /// Computes the recommended SFD timeout for the given settings
    ///
    /// That is preamble length + 1 + SFD length - PAC size, in symbols.
    pub fn sfd_timeout_for(
        preamble_length: PreambleLength,
        sfd_sequence: SfdSequence,
        bitrate: BitRate,
        pac_size: PacSize,
    ) -> u16 {
        (preamble_length.symbols() + 1 + sfd_sequence.length(bitrate))
            .saturating_sub(pac_size.symbols())
    }

    /// The recommended SFD timeout for this configuration
    pub fn recommended_sfd_timeout(&self) -> u16 {
        Self::sfd_timeout_for(
            self.preamble_length,
            self.sfd_sequence,
            self.bitrate,
            self.pac_size,
        )
    }

    /// The longest frame that can be received with this configuration
    pub fn max_frame_len(&self) -> usize {
        self.phr_mode.max_frame_len()
    }
}


/// The bitrate at which a message is transmitted
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum BitRate {
    /// 110 kilobits per second.
    /// This is an unofficial extension from decawave.
    Kbps110 = 0b00,
    /// 850 kilobits per second.
    Kbps850 = 0b01,
    /// 6.8 megabits per second.
    Kbps6800 = 0b10,
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::Kbps6800
    }
}


/// The PRF value
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PulseRepetitionFrequency {
    /// 16 megahertz
    Mhz16 = 0b01,
    /// 64 megahertz
    Mhz64 = 0b10,
}

impl Default for PulseRepetitionFrequency {
    fn default() -> Self {
        PulseRepetitionFrequency::Mhz64
    }
}


/// The length of the transmitted preamble
///
/// Longer preambles improve the reception quality and thus range. This comes
/// at the cost of longer transmission times and thus power consumption and
/// bandwidth use.
///
/// For the bit pattern, see table 16 in the user manual. Two bits TXPSR, then
/// two bits PE.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PreambleLength {
    /// Only supported at 6.8 Mbps
    Symbols64 = 0b0100,
    /// Unofficial extension from decawave
    Symbols128 = 0b0101,
    /// Unofficial extension from decawave
    Symbols256 = 0b0110,
    /// Unofficial extension from decawave
    Symbols512 = 0b0111,
    /// Not supported at 110 kbps
    Symbols1024 = 0b1000,
    /// Only supported at 110 kbps. Unofficial extension from decawave.
    Symbols1536 = 0b1001,
    /// Only supported at 110 kbps. Unofficial extension from decawave.
    Symbols2048 = 0b1010,
    /// Only supported at 110 kbps
    Symbols4096 = 0b1100,
}

impl Default for PreambleLength {
    fn default() -> Self {
        PreambleLength::Symbols128
    }
}

impl PreambleLength {
    /// The length in symbols
    pub fn symbols(&self) -> u16 {
        match self {
            PreambleLength::Symbols64 => 64,
            PreambleLength::Symbols128 => 128,
            PreambleLength::Symbols256 => 256,
            PreambleLength::Symbols512 => 512,
            PreambleLength::Symbols1024 => 1024,
            PreambleLength::Symbols1536 => 1536,
            PreambleLength::Symbols2048 => 2048,
            PreambleLength::Symbols4096 => 4096,
        }
    }
}


/// Preamble acquisition chunk size
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PacSize {
    /// 8 symbols
    Pac8,
    /// 16 symbols
    Pac16,
    /// 32 symbols
    Pac32,
    /// 64 symbols
    Pac64,
}

impl PacSize {
    /// The size in symbols
    pub fn symbols(&self) -> u16 {
        match self {
            PacSize::Pac8 => 8,
            PacSize::Pac16 => 16,
            PacSize::Pac32 => 32,
            PacSize::Pac64 => 64,
        }
    }
}


/// An enum that allows the selection between different SFD sequences
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum SfdSequence {
    /// The standard sequence defined by the IEEE standard.
    IEEE,
    /// A sequence defined by Decawave that is supposed to be more robust.
    /// This is an unofficial addition.
    Decawave,
}

impl Default for SfdSequence {
    fn default() -> Self {
        SfdSequence::IEEE
    }
}

impl SfdSequence {
    /// The length of the SFD in symbols at the given bitrate
    pub fn length(&self, bitrate: BitRate) -> u16 {
        match (self, bitrate) {
            (_, BitRate::Kbps110) => 64,
            (SfdSequence::Decawave, BitRate::Kbps850) => 16,
            _ => 8,
        }
    }
}


/// PHY header mode
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum PhrMode {
    /// Standard IEEE 802.15.4 header, frames of up to 127 bytes
    Standard,
    /// Decawave proprietary header, frames of up to 1023 bytes
    Extended,
}

impl Default for PhrMode {
    fn default() -> Self {
        PhrMode::Standard
    }
}

impl PhrMode {
    /// The longest frame that can be received in this mode
    pub fn max_frame_len(&self) -> usize {
        match self {
            PhrMode::Standard => 127,
            PhrMode::Extended => 1023,
        }
    }
}


/// All the available UWB channels.
///
/// Note that while a channel may have more bandwidth than ~900 Mhz, the DW1000 can only send up to ~900 Mhz
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum UwbChannel {
    /// Channel 1
    /// - Center frequency: 3494.4 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel1 = 1,
    /// Channel 2
    /// - Center frequency: 3993.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel2 = 2,
    /// Channel 3
    /// - Center frequency: 4492.8 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel3 = 3,
    /// Channel 4
    /// - Center frequency: 3993.6 Mhz
    /// - Bandwidth: 1331.2 Mhz
    Channel4 = 4,
    /// Channel 5
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel5 = 5,
    /// Channel 7
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 1081.6 Mhz
    Channel7 = 7,
}

impl Default for UwbChannel {
    fn default() -> Self {
        UwbChannel::Channel5
    }
}

impl UwbChannel {
    /// Gets the recommended preamble code
    pub fn recommended_preamble_code(&self, prf_value: PulseRepetitionFrequency) -> u8 {
        // Many have overlapping possibilities, so the numbers have been chosen so that there's no overlap here
        match (self, prf_value) {
            (UwbChannel::Channel1, PulseRepetitionFrequency::Mhz16) => 1,
            (UwbChannel::Channel2, PulseRepetitionFrequency::Mhz16) => 3,
            (UwbChannel::Channel3, PulseRepetitionFrequency::Mhz16) => 5,
            (UwbChannel::Channel4, PulseRepetitionFrequency::Mhz16) => 7,
            (UwbChannel::Channel5, PulseRepetitionFrequency::Mhz16) => 4,
            (UwbChannel::Channel7, PulseRepetitionFrequency::Mhz16) => 8,
            (UwbChannel::Channel1, PulseRepetitionFrequency::Mhz64) => 9,
            (UwbChannel::Channel2, PulseRepetitionFrequency::Mhz64) => 10,
            (UwbChannel::Channel3, PulseRepetitionFrequency::Mhz64) => 11,
            (UwbChannel::Channel4, PulseRepetitionFrequency::Mhz64) => 17,
            (UwbChannel::Channel5, PulseRepetitionFrequency::Mhz64) => 12,
            (UwbChannel::Channel7, PulseRepetitionFrequency::Mhz64) => 18,
        }
    }
}
