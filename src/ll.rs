//! Low-level interface to the DW1000
//!
//! This module implements the SPI transport and a register-level interface
//! to the DW1000. Users of this library should typically not need to use
//! this directly. Please consider using the [high-level interface] instead.
//!
//! Every SPI transaction consists of a 1 to 3 byte [`Header`], which selects
//! a register file, the sub-index within that file, and the direction of the
//! transfer, followed by the data. Chip select stays low for the whole
//! transaction, and the whole transaction runs inside a [critical section].
//!
//! [high-level interface]: ../hl/index.html
//! [critical section]: ../irq/index.html

use core::fmt;

use embedded_hal::{digital::v2::OutputPin, spi::FullDuplex};
use log::trace;

use crate::{
    irq::{CriticalSection, IrqControl},
    util::{self, PollLimit, TimeoutError},
};


/// Entry point to the DW1000 driver's low-level API
///
/// Please consider using [hl::DW1000] instead.
///
/// [hl::DW1000]: ../hl/struct.DW1000.html
pub struct DW1000<SPI, CS, IRQ> {
    bus: Bus<SPI, CS>,
    irq: IRQ,
}

impl<SPI, CS, IRQ> DW1000<SPI, CS, IRQ> {
    /// Create a new instance of `DW1000`
    ///
    /// Requires the SPI peripheral and the chip select pin that are connected
    /// to the DW1000, as well as the means to keep the DW1000 interrupt
    /// handler from running during a transaction.
    pub fn new(spi: SPI, chip_select: CS, irq: IRQ) -> Self {
        DW1000 {
            bus: Bus {
                spi,
                chip_select,
                chip_select_delay: 0,
                limit: PollLimit::default(),
            },
            irq,
        }
    }

    /// Set the chip select delay.
    ///
    /// This is the amount of times the cs pin will be set low before any data is transfered.
    /// This way, the chip can be used on fast mcu's just fine.
    pub fn set_chip_select_delay(&mut self, delay: u8) {
        self.bus.chip_select_delay = delay;
    }

    /// Sets how often a ready flag of the SPI peripheral is checked
    ///
    /// If the peripheral isn't ready to send or hasn't received a byte after
    /// this many checks, the transaction fails with [`Error::BusTimeout`].
    pub fn set_bus_limit(&mut self, limit: PollLimit) {
        self.bus.limit = limit;
    }

    /// Releases the SPI peripheral, chip select pin and interrupt control
    pub fn free(self) -> (SPI, CS, IRQ) {
        (self.bus.spi, self.bus.chip_select, self.irq)
    }
}

impl<SPI, CS, IRQ> DW1000<SPI, CS, IRQ>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    IRQ: IrqControl,
{
    /// Runs multiple transactions inside a single critical section
    ///
    /// Use this for read-modify-write sequences that must not be interrupted
    /// by the DW1000 interrupt handler. The closure gets a [`Locked`]
    /// transport, whose transactions don't enter a critical section of their
    /// own.
    pub fn atomic<T, F>(&mut self, f: F) -> Result<T, Error<SPI, CS>>
    where
        F: FnOnce(&mut Locked<SPI, CS>) -> Result<T, Error<SPI, CS>>,
    {
        let _section = CriticalSection::enter(&mut self.irq);
        f(&mut Locked(&mut self.bus))
    }
}

impl<SPI, CS, IRQ> Transport for DW1000<SPI, CS, IRQ>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    IRQ: IrqControl,
{
    type Error = Error<SPI, CS>;

    fn write_transaction(&mut self, header: &[u8], body: &[u8]) -> Result<(), Self::Error> {
        let _section = CriticalSection::enter(&mut self.irq);
        self.bus.write_transaction(header, body)
    }

    fn read_transaction(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        let _section = CriticalSection::enter(&mut self.irq);
        self.bus.read_transaction(header, buffer)
    }
}


/// Transport that is only available inside a critical section
///
/// See [`DW1000::atomic`].
pub struct Locked<'r, SPI, CS>(&'r mut Bus<SPI, CS>);

impl<'r, SPI, CS> Transport for Locked<'r, SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    type Error = Error<SPI, CS>;

    fn write_transaction(&mut self, header: &[u8], body: &[u8]) -> Result<(), Self::Error> {
        self.0.write_transaction(header, body)
    }

    fn read_transaction(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read_transaction(header, buffer)
    }
}


/// SPI bus and chip select, without any exclusion
///
/// Only reachable through `DW1000`'s `Transport` implementation or through
/// `Locked`, both of which hold a critical section.
struct Bus<SPI, CS> {
    spi: SPI,
    chip_select: CS,
    chip_select_delay: u8,
    limit: PollLimit,
}

impl<SPI, CS> Bus<SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    fn write_transaction(&mut self, header: &[u8], body: &[u8]) -> Result<(), Error<SPI, CS>> {
        trace!("spi write: header {:02x?}, {} bytes", header, body.len());

        self.transaction(|bus| {
            for &byte in header.iter().chain(body) {
                bus.exchange(byte)?;
            }
            Ok(())
        })
    }

    fn read_transaction(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        trace!("spi read: header {:02x?}, {} bytes", header, buffer.len());

        self.transaction(|bus| {
            for &byte in header {
                bus.exchange(byte)?;
            }
            for byte in buffer.iter_mut() {
                *byte = bus.exchange(0x00)?;
            }
            Ok(())
        })
    }

    /// Frames `f` with chip select
    ///
    /// Chip select is released even if asserting it or `f` fails. The first
    /// error wins.
    fn transaction<F>(&mut self, f: F) -> Result<(), Error<SPI, CS>>
    where
        F: FnOnce(&mut Self) -> Result<(), Error<SPI, CS>>,
    {
        if let Err(error) = self.assert_cs_low() {
            // With a chip select delay, earlier assertions may have gone through
            let _ = self.assert_cs_high();
            return Err(error);
        }

        let result = f(self);
        let released = self.assert_cs_high();

        result?;
        released
    }

    /// Clocks out one byte and returns the byte clocked in at the same time
    fn exchange(&mut self, byte: u8) -> Result<u8, Error<SPI, CS>> {
        let spi = &mut self.spi;

        util::poll_until(self.limit, || spi.send(byte)).map_err(Error::from_wait)?;
        util::poll_until(self.limit, || spi.read()).map_err(Error::from_wait)
    }

    fn assert_cs_low(&mut self) -> Result<(), Error<SPI, CS>> {
        for _ in 0..=self.chip_select_delay {
            self.chip_select
                .set_low()
                .map_err(|err| Error::ChipSelect(err))?;
        }

        Ok(())
    }

    fn assert_cs_high(&mut self) -> Result<(), Error<SPI, CS>> {
        self.chip_select
            .set_high()
            .map_err(|err| Error::ChipSelect(err))?;

        Ok(())
    }
}


/// Header+body SPI transactions with the DW1000
///
/// Implementations must execute every transaction inside a critical section,
/// framed by chip select. Transfers are all-or-nothing: an error means the
/// transaction as a whole failed.
pub trait Transport {
    /// The error that can occur during a transaction
    type Error;

    /// Sends `header`, followed by `body`
    fn write_transaction(&mut self, header: &[u8], body: &[u8]) -> Result<(), Self::Error>;

    /// Sends `header`, then fills `buffer` with the bytes the DW1000 sends
    fn read_transaction(&mut self, header: &[u8], buffer: &mut [u8]) -> Result<(), Self::Error>;
}


/// Register width for [`Registers::read_register`] and
/// [`Registers::write_register`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Width {
    /// 8 bits
    Bits8,
    /// 16 bits
    Bits16,
    /// 32 bits
    Bits32,
}

impl Width {
    /// The width in bytes
    pub fn len(&self) -> usize {
        match self {
            Width::Bits8 => 1,
            Width::Bits16 => 2,
            Width::Bits32 => 4,
        }
    }
}

/// Addressed register and buffer access
///
/// Implemented for every [`Transport`]. All values are little-endian, as the
/// DW1000 stores them. File ids and offsets are truncated to what a
/// [`Header`] can encode.
pub trait Registers: Transport {
    /// Reads `buffer.len()` bytes from `offset` in register file `file_id`
    fn read_buffer(
        &mut self,
        file_id: u8,
        offset: u16,
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        let header = Header::read(file_id, offset);
        self.read_transaction(header.as_bytes(), buffer)
    }

    /// Writes `data` to `offset` in register file `file_id`
    fn write_buffer(&mut self, file_id: u8, offset: u16, data: &[u8]) -> Result<(), Self::Error> {
        let header = Header::write(file_id, offset);
        self.write_transaction(header.as_bytes(), data)
    }

    /// Reads an 8-bit value
    fn read_u8(&mut self, file_id: u8, offset: u16) -> Result<u8, Self::Error> {
        let mut buffer = [0; 1];
        self.read_buffer(file_id, offset, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a 16-bit value
    fn read_u16(&mut self, file_id: u8, offset: u16) -> Result<u16, Self::Error> {
        let mut buffer = [0; 2];
        self.read_buffer(file_id, offset, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a 32-bit value
    fn read_u32(&mut self, file_id: u8, offset: u16) -> Result<u32, Self::Error> {
        let mut buffer = [0; 4];
        self.read_buffer(file_id, offset, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Writes an 8-bit value
    fn write_u8(&mut self, file_id: u8, offset: u16, value: u8) -> Result<(), Self::Error> {
        self.write_buffer(file_id, offset, &[value])
    }

    /// Writes a 16-bit value
    fn write_u16(&mut self, file_id: u8, offset: u16, value: u16) -> Result<(), Self::Error> {
        self.write_buffer(file_id, offset, &value.to_le_bytes())
    }

    /// Writes a 32-bit value
    fn write_u32(&mut self, file_id: u8, offset: u16, value: u32) -> Result<(), Self::Error> {
        self.write_buffer(file_id, offset, &value.to_le_bytes())
    }

    /// Reads a value of the given width
    fn read_register(&mut self, file_id: u8, offset: u16, width: Width) -> Result<u32, Self::Error> {
        match width {
            Width::Bits8 => self.read_u8(file_id, offset).map(u32::from),
            Width::Bits16 => self.read_u16(file_id, offset).map(u32::from),
            Width::Bits32 => self.read_u32(file_id, offset),
        }
    }

    /// Writes a value of the given width
    ///
    /// Bits that don't fit into `width` are silently truncated.
    fn write_register(
        &mut self,
        file_id: u8,
        offset: u16,
        width: Width,
        value: u32,
    ) -> Result<(), Self::Error> {
        let bytes = value.to_le_bytes();
        self.write_buffer(file_id, offset, &bytes[..width.len()])
    }
}

impl<T: Transport + ?Sized> Registers for T {}


/// SPI transaction header
///
/// The first byte carries the register file id in bits 0-5, bit 6 if a
/// sub-index follows, and bit 7 for a write. A non-zero sub-index takes one
/// extension byte for values up to 127, two otherwise. See the DW1000 user
/// manual, section 2.2.1.2.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    bytes: [u8; 3],
    len: usize,
}

impl Header {
    /// The highest sub-index that can be encoded
    pub const MAX_OFFSET: u16 = 0x7FFF;

    /// Encodes a header
    ///
    /// `file_id` is truncated to 6 bits, `offset` to 15 bits. No register
    /// file of the DW1000 is longer than that.
    pub fn new(write: bool, file_id: u8, offset: u16) -> Self {
        let offset = offset & Self::MAX_OFFSET;

        let sub_index = offset > 0;
        let mut bytes = [0; 3];

        bytes[0] = ((write as u8) << 7) | ((sub_index as u8) << 6) | (file_id & 0x3F);

        if !sub_index {
            return Header { bytes, len: 1 };
        }

        let ext_addr = offset > 127;

        bytes[1] = ((ext_addr as u8) << 7) | (offset as u8 & 0x7F); // lower 7 bits (of 15)

        if !ext_addr {
            return Header { bytes, len: 2 };
        }

        bytes[2] = ((offset & 0x7F80) >> 7) as u8; // higher 8 bits (of 15)

        Header { bytes, len: 3 }
    }

    /// Encodes a read header
    pub fn read(file_id: u8, offset: u16) -> Self {
        Self::new(false, file_id, offset)
    }

    /// Encodes a write header
    pub fn write(file_id: u8, offset: u16) -> Self {
        Self::new(true, file_id, offset)
    }

    /// The encoded header
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}


/// An SPI error that can occur when communicating with the DW1000
pub enum Error<SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    /// SPI error occured while exchanging a byte
    Spi(<SPI as FullDuplex<u8>>::Error),

    /// Error occured while changing chip select signal
    ChipSelect(<CS as OutputPin>::Error),

    /// The SPI peripheral didn't become ready in time
    ///
    /// This usually means the peripheral is misconfigured or broken. The
    /// limit can be changed with [`DW1000::set_bus_limit`].
    BusTimeout,
}

impl<SPI, CS> Error<SPI, CS>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
{
    fn from_wait(error: TimeoutError<<SPI as FullDuplex<u8>>::Error>) -> Self {
        match error {
            TimeoutError::Timeout => {
                log::warn!("spi peripheral not ready, giving up");
                Error::BusTimeout
            }
            TimeoutError::Other(error) => Error::Spi(error),
        }
    }
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
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
            Error::ChipSelect(error) => write!(f, "ChipSelect({:?})", error),
            Error::BusTimeout => write!(f, "BusTimeout"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, Access};

    #[test]
    fn header_without_sub_index() {
        assert_eq!(Header::read(0x0F, 0).as_bytes(), &[0x0F]);
        assert_eq!(Header::write(0x0F, 0).as_bytes(), &[0x8F]);
    }

    #[test]
    fn header_with_short_sub_index() {
        assert_eq!(Header::read(0x36, 0x03).as_bytes(), &[0x76, 0x03]);
        assert_eq!(Header::write(0x36, 127).as_bytes(), &[0xF6, 0x7F]);
    }

    #[test]
    fn header_with_extended_sub_index() {
        // 200 = 0b1_1001000: lower 7 bits 0x48 with the extension flag, then 1
        assert_eq!(Header::read(0x11, 200).as_bytes(), &[0x51, 0xC8, 0x01]);
        assert_eq!(Header::write(0x2E, 0x1804).as_bytes(), &[0xEE, 0x84, 0x30]);
        assert_eq!(Header::read(0x00, Header::MAX_OFFSET).as_bytes(), &[0x40, 0xFF, 0xFF]);
    }

    #[test]
    fn header_truncates_file_id_and_offset() {
        assert_eq!(Header::read(0x4F, 0), Header::read(0x0F, 0));
        assert_eq!(Header::write(0xFF, 3).as_bytes(), &[0xFF, 0x03]);
        assert_eq!(Header::read(0x11, 0x8000).as_bytes(), &[0x11]);
        assert_eq!(Header::read(0x11, 0x8000 | 200), Header::read(0x11, 200));
    }

    #[test]
    fn registers_wrap_out_of_range_addresses() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().set_u32(0x0F, 0, 0x0000_0002);

        assert_eq!(dw1000.read_u8(0x4F, 0).unwrap(), 0x02);
        dw1000.write_u8(0x11, 0x8005, 0xAB).unwrap();

        let device = device.borrow();
        assert_eq!(device.files[0x11][5], 0xAB);
        assert_eq!(device.log[1], Access::write(0x11, 5, &[0xAB]));
    }

    #[test]
    fn write_transaction_is_framed_and_guarded() {
        let (mut dw1000, device) = mock::ll();

        dw1000.write_u16(0x0D, 0, 0x0100).unwrap();

        let device = device.borrow();
        assert_eq!(device.log, [Access::write(0x0D, 0, &[0x00, 0x01])]);
        assert_eq!(device.cs_lows, 1);
        assert_eq!(device.cs_highs, 1);
        assert_eq!(device.irq_enters, 1);
        assert_eq!(device.irq_exits, 1);
        assert_eq!(device.unguarded, 0);
    }

    #[test]
    fn read_transaction_captures_reply() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().set_u32(0x00, 0, 0xDECA_0130);

        assert_eq!(dw1000.read_u32(0x00, 0).unwrap(), 0xDECA_0130);
        assert_eq!(dw1000.read_register(0x00, 2, Width::Bits16).unwrap(), 0xDECA);
        assert_eq!(dw1000.read_register(0x00, 0, Width::Bits8).unwrap(), 0x30);

        let device = device.borrow();
        assert_eq!(device.irq_enters, 3);
        assert_eq!(device.irq_exits, 3);
    }

    #[test]
    fn write_register_truncates_to_width() {
        let (mut dw1000, device) = mock::ll();

        dw1000.write_register(0x36, 3, Width::Bits8, 0x1E0).unwrap();

        assert_eq!(device.borrow().log, [Access::write(0x36, 3, &[0xE0])]);
    }

    #[test]
    fn buffer_access_uses_extended_sub_index() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().files[0x11][200..203].copy_from_slice(&[1, 2, 3]);

        let mut buffer = [0; 3];
        dw1000.read_buffer(0x11, 200, &mut buffer).unwrap();

        assert_eq!(buffer, [1, 2, 3]);
        assert!(device.borrow().logged(&[Access::read(0x11, 200, 3)]));
    }

    #[test]
    fn busy_peripheral_is_waited_for() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().busy_polls = 3;
        device.borrow_mut().set_u32(0x00, 0, 0x1234_5678);

        assert_eq!(dw1000.read_u32(0x00, 0).unwrap(), 0x1234_5678);
    }

    #[test]
    fn stuck_peripheral_times_out_and_releases_everything() {
        let (mut dw1000, device) = mock::ll();
        dw1000.set_bus_limit(PollLimit::new(50));
        device.borrow_mut().stalled = true;

        let result = dw1000.read_u32(0x0F, 0);

        assert!(matches!(result, Err(Error::BusTimeout)));
        let device = device.borrow();
        assert_eq!(device.cs_highs, 1);
        assert_eq!(device.irq_exits, 1);
        assert_eq!(device.irq_depth, 0);
    }

    #[test]
    fn spi_error_releases_chip_select_and_guard() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().spi_fails = true;

        let result = dw1000.write_u8(0x36, 3, 0xE0);

        assert!(matches!(result, Err(Error::Spi(mock::MockError))));
        let device = device.borrow();
        assert!(!device.cs_low);
        assert_eq!(device.irq_depth, 0);
        assert!(device.log.is_empty());
    }

    #[test]
    fn chip_select_error_releases_guard() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().cs_fails = true;

        let result = dw1000.read_u8(0x0F, 0);

        assert!(matches!(result, Err(Error::ChipSelect(mock::MockError))));
        assert_eq!(device.borrow().irq_exits, 1);
    }

    #[test]
    fn failed_repeated_assertion_releases_chip_select() {
        let (mut dw1000, device) = mock::ll();
        dw1000.set_chip_select_delay(2);
        device.borrow_mut().cs_low_fails_after = Some(1);

        let result = dw1000.read_u8(0x0F, 0);

        assert!(matches!(result, Err(Error::ChipSelect(mock::MockError))));
        let device = device.borrow();
        assert!(!device.cs_low);
        assert_eq!(device.cs_lows, 1);
        assert_eq!(device.cs_highs, 1);
        assert_eq!(device.irq_depth, 0);
        assert!(device.log.is_empty());
    }

    #[test]
    fn chip_select_delay_repeats_assertion() {
        let (mut dw1000, device) = mock::ll();
        dw1000.set_chip_select_delay(4);

        dw1000.write_u8(0x0F, 0, 0).unwrap();

        assert_eq!(device.borrow().cs_lows, 5);
    }

    #[test]
    fn atomic_runs_transactions_under_one_guard() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().set_u32(0x0E, 0, 0x0000_4000);

        let mask = dw1000
            .atomic(|regs| {
                let mask = regs.read_u32(0x0E, 0)?;
                regs.write_u32(0x0E, 0, 0)?;
                regs.write_u32(0x0E, 0, mask)?;
                Ok(mask)
            })
            .unwrap();

        assert_eq!(mask, 0x0000_4000);
        let device = device.borrow();
        assert_eq!(device.log.len(), 3);
        assert_eq!(device.irq_enters, 1);
        assert_eq!(device.irq_exits, 1);
        assert_eq!(device.unguarded, 0);
    }

    #[test]
    fn atomic_releases_guard_when_closure_fails() {
        let (mut dw1000, device) = mock::ll();
        device.borrow_mut().stalled = true;
        dw1000.set_bus_limit(PollLimit::new(10));

        let result = dw1000.atomic(|regs| regs.read_u32(0x0E, 0));

        assert!(result.is_err());
        assert_eq!(device.borrow().irq_depth, 0);
    }
}
