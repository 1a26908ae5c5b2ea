use core::fmt;

use embedded_hal::{digital::v2::OutputPin, spi::FullDuplex};

use crate::ll;


/// An error that can occur when receiving data
///
/// Receive errors reported by the DW1000 are not in here. They are recovered
/// from and reported as [`RxEvent::DeviceError`].
///
/// [`RxEvent::DeviceError`]: enum.RxEvent.html#variant.DeviceError
pub enum Error<SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    /// Error occured while using SPI bus
    Spi(ll::Error<SPI, CS>),

    /// The device didn't identify as a DW1000
    ///
    /// Contains the value read from `DEV_ID`.
    UnknownDevice(u32),

    /// The operation requires an ongoing receive operation
    NotReceiving,

    /// No receive event showed up in time
    ///
    /// The transceiver has been turned off.
    RxPollTimeout,

    /// The frame sink failed, or didn't become ready in time
    Sink,
}

impl<SPI, CS> From<ll::Error<SPI, CS>> for Error<SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    fn from(error: ll::Error<SPI, CS>) -> Self {
        Error::Spi(error)
    }
}

// We can't derive this implementation, as `Debug` is only implemented
// conditionally for `ll::Error`.
impl<SPI, CS> fmt::Debug for Error<SPI, CS>
where
    SPI: FullDuplex<u8>,
    <SPI as FullDuplex<u8>>::Error: fmt::Debug,
    CS: OutputPin,
    <CS as OutputPin>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Spi(error) => write!(f, "Spi({:?})", error),
            Error::UnknownDevice(id) => write!(f, "UnknownDevice({:#010x})", id),
            Error::NotReceiving => write!(f, "NotReceiving"),
            Error::RxPollTimeout => write!(f, "RxPollTimeout"),
            Error::Sink => write!(f, "Sink"),
        }
    }
}
