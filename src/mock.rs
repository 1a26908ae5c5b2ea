//! Simulated DW1000 for the unit tests
//!
//! The simulation decodes the SPI protocol byte by byte, keeps register files
//! in memory and logs every completed transaction. The SPI peripheral, chip
//! select pin and IRQ control all share one `Device`, so tests can check
//! that transactions only ever happen inside a critical section.

extern crate std;

use std::{cell::RefCell, collections::VecDeque, rc::Rc, vec, vec::Vec};

use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::OutputPin,
    serial,
    spi::FullDuplex,
};

use crate::{hl, irq::IrqControl, ll, regs};


/// Size of every simulated register file
pub const FILE_LEN: usize = 1024;


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MockError;


/// A completed transaction
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Access {
    pub write: bool,
    pub file_id: u8,
    pub offset: u16,
    pub data: Vec<u8>,
}

impl Access {
    pub fn read(file_id: u8, offset: u16, len: usize) -> Self {
        Access {
            write: false,
            file_id,
            offset,
            data: vec![0; len],
        }
    }

    pub fn write(file_id: u8, offset: u16, data: &[u8]) -> Self {
        Access {
            write: true,
            file_id,
            offset,
            data: data.to_vec(),
        }
    }

    /// Compares everything but read data
    fn matches(&self, other: &Access) -> bool {
        self.write == other.write
            && self.file_id == other.file_id
            && self.offset == other.offset
            && self.data.len() == other.data.len()
            && (!self.write || self.data == other.data)
    }
}


#[derive(Default)]
struct Partial {
    header: Vec<u8>,
    parsed: Option<(bool, u8, u16)>,
    data: Vec<u8>,
}

impl Partial {
    fn parse(&mut self) {
        let first = self.header[0];
        let write = first & 0x80 != 0;
        let file_id = first & 0x3F;

        if first & 0x40 == 0 {
            self.parsed = Some((write, file_id, 0));
            return;
        }
        if self.header.len() < 2 {
            return;
        }

        let low = (self.header[1] & 0x7F) as u16;
        if self.header[1] & 0x80 == 0 {
            self.parsed = Some((write, file_id, low));
            return;
        }
        if self.header.len() < 3 {
            return;
        }

        self.parsed = Some((write, file_id, low | (self.header[2] as u16) << 7));
    }
}


pub struct Device {
    pub files: Vec<Vec<u8>>,
    pub log: Vec<Access>,

    pub cs_low: bool,
    pub cs_lows: usize,
    pub cs_highs: usize,
    pub cs_fails: bool,
    /// `set_low` fails once it has succeeded this many times
    pub cs_low_fails_after: Option<usize>,

    pub irq_depth: usize,
    pub irq_enters: usize,
    pub irq_exits: usize,
    /// Transactions started outside of a critical section
    pub unguarded: usize,

    /// Every send returns `WouldBlock` this many times first
    pub busy_polls: u32,
    busy_left: u32,
    pub stalled: bool,
    pub spi_fails: bool,
    /// Data bytes written to this register file fail to send
    pub failing_writes: Option<u8>,

    /// Bits that show up in `SYS_STATUS` after the given number of reads
    pending_status: Option<(u32, u32)>,

    current: Option<Partial>,
    reply: VecDeque<u8>,
}

impl Device {
    fn new() -> Self {
        let mut device = Device {
            files: vec![vec![0; FILE_LEN]; 64],
            log: Vec::new(),
            cs_low: false,
            cs_lows: 0,
            cs_highs: 0,
            cs_fails: false,
            cs_low_fails_after: None,
            irq_depth: 0,
            irq_enters: 0,
            irq_exits: 0,
            unguarded: 0,
            busy_polls: 0,
            busy_left: 0,
            stalled: false,
            spi_fails: false,
            failing_writes: None,
            pending_status: None,
            current: None,
            reply: VecDeque::new(),
        };
        device.set_u32(regs::DEV_ID, 0, regs::DEVICE_ID);
        device
    }

    pub fn set_u32(&mut self, file_id: u8, offset: u16, value: u32) {
        let offset = offset as usize;
        self.files[file_id as usize][offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn get_u32(&self, file_id: u8, offset: u16) -> u32 {
        let offset = offset as usize;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.files[file_id as usize][offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    pub fn status(&self) -> u32 {
        self.get_u32(regs::SYS_STATUS, 0)
    }

    pub fn set_status(&mut self, bits: u32) {
        self.set_u32(regs::SYS_STATUS, 0, bits);
    }

    /// Raises `bits` in `SYS_STATUS` once it has been read `reads` times
    pub fn raise_status_after(&mut self, reads: u32, bits: u32) {
        self.pending_status = Some((reads, bits));
    }

    pub fn set_frame(&mut self, data: &[u8]) {
        self.files[regs::RX_BUFFER as usize][..data.len()].copy_from_slice(data);
        self.set_u32(regs::RX_FINFO, 0, data.len() as u32);
    }

    /// Transactions that touched the given register file
    pub fn accesses(&self, file_id: u8) -> Vec<&Access> {
        self.log.iter().filter(|access| access.file_id == file_id).collect()
    }

    /// Writes to the given register file, as (offset, data)
    pub fn writes(&self, file_id: u8) -> Vec<(u16, Vec<u8>)> {
        self.accesses(file_id)
            .into_iter()
            .filter(|access| access.write)
            .map(|access| (access.offset, access.data.clone()))
            .collect()
    }

    pub fn logged(&self, expected: &[Access]) -> bool {
        self.log.len() == expected.len()
            && self.log.iter().zip(expected).all(|(a, b)| a.matches(b))
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        let current = match self.current.as_mut() {
            Some(current) => current,
            None => return 0xFF,
        };

        let (write, file_id, offset) = match current.parsed {
            Some(parsed) => parsed,
            None => {
                current.header.push(byte);
                current.parse();

                let parsed = current.parsed;
                if let Some((false, regs::SYS_STATUS, _)) = parsed {
                    self.status_read();
                }
                return 0x00;
            }
        };

        let address = offset as usize + current.data.len();
        if write {
            current.data.push(byte);
            0x00
        }
        else {
            let value = self.files[file_id as usize][address];
            current.data.push(value);
            value
        }
    }

    fn status_read(&mut self) {
        if let Some((reads, bits)) = self.pending_status {
            if reads == 0 {
                let status = self.status() | bits;
                self.set_status(status);
                self.pending_status = None;
            }
            else {
                self.pending_status = Some((reads - 1, bits));
            }
        }
    }

    fn write_fails(&self) -> bool {
        match (&self.current, self.failing_writes) {
            (Some(current), Some(failing)) => {
                matches!(current.parsed, Some((true, file_id, _)) if file_id == failing)
            }
            _ => false,
        }
    }

    fn begin(&mut self) {
        if !self.cs_low && self.irq_depth == 0 {
            self.unguarded += 1;
        }
        if !self.cs_low {
            self.current = Some(Partial::default());
        }
        self.cs_low = true;
        self.cs_lows += 1;
    }

    fn end(&mut self) {
        self.cs_low = false;
        self.cs_highs += 1;

        let current = match self.current.take() {
            Some(current) => current,
            None => return,
        };
        let (write, file_id, offset) = match current.parsed {
            Some(parsed) => parsed,
            None => return,
        };

        if write {
            let file = &mut self.files[file_id as usize];
            for (i, &byte) in current.data.iter().enumerate() {
                let address = offset as usize + i;
                if file_id == regs::SYS_STATUS {
                    // write-1-to-clear
                    file[address] &= !byte;
                }
                else {
                    file[address] = byte;
                }
            }
        }

        self.log.push(Access {
            write,
            file_id,
            offset,
            data: current.data,
        });
    }
}


pub type Shared = Rc<RefCell<Device>>;

pub struct MockSpi(Shared);

impl FullDuplex<u8> for MockSpi {
    type Error = MockError;

    fn read(&mut self) -> nb::Result<u8, MockError> {
        self.0.borrow_mut().reply.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn send(&mut self, byte: u8) -> nb::Result<(), MockError> {
        let mut device = self.0.borrow_mut();

        if device.spi_fails || device.write_fails() {
            return Err(nb::Error::Other(MockError));
        }
        if device.stalled {
            return Err(nb::Error::WouldBlock);
        }
        if device.busy_left > 0 {
            device.busy_left -= 1;
            return Err(nb::Error::WouldBlock);
        }
        device.busy_left = device.busy_polls;

        let reply = device.exchange(byte);
        device.reply.push_back(reply);
        Ok(())
    }
}

pub struct MockCs(Shared);

impl OutputPin for MockCs {
    type Error = MockError;

    fn set_low(&mut self) -> Result<(), MockError> {
        let mut device = self.0.borrow_mut();
        if device.cs_fails || device.cs_low_fails_after == Some(0) {
            return Err(MockError);
        }
        if let Some(left) = device.cs_low_fails_after.as_mut() {
            *left -= 1;
        }
        device.begin();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), MockError> {
        let mut device = self.0.borrow_mut();
        if device.cs_fails {
            return Err(MockError);
        }
        device.end();
        Ok(())
    }
}

/// Checks that critical sections are entered and left in LIFO order
pub struct MockIrq(Shared);

impl IrqControl for MockIrq {
    type State = usize;

    fn disable(&mut self) -> usize {
        let mut device = self.0.borrow_mut();
        let previous = device.irq_depth;
        device.irq_depth += 1;
        device.irq_enters += 1;
        previous
    }

    fn restore(&mut self, state: usize) {
        let mut device = self.0.borrow_mut();
        assert_eq!(device.irq_depth, state + 1, "critical sections left out of order");
        device.irq_depth = state;
        device.irq_exits += 1;
    }
}


#[derive(Default)]
pub struct MockDelay {
    pub total_ms: u32,
}

impl DelayMs<u8> for MockDelay {
    fn delay_ms(&mut self, ms: u8) {
        self.total_ms += ms as u32;
    }
}


/// Serial port that is only ready for every other byte
#[derive(Default)]
pub struct MockSink {
    pub bytes: Vec<u8>,
    pub busy_polls: usize,
    pub broken: bool,
    pub ready: bool,
}

impl serial::Write<u8> for MockSink {
    type Error = MockError;

    fn write(&mut self, byte: u8) -> nb::Result<(), MockError> {
        if self.broken {
            return Err(nb::Error::Other(MockError));
        }
        if !self.ready {
            self.ready = true;
            self.busy_polls += 1;
            return Err(nb::Error::WouldBlock);
        }

        self.ready = false;
        self.bytes.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), MockError> {
        Ok(())
    }
}


pub type MockLl = ll::DW1000<MockSpi, MockCs, MockIrq>;
pub type MockDw1000 = hl::DW1000<MockSpi, MockCs, MockIrq>;

pub fn ll() -> (MockLl, Shared) {
    let device = Rc::new(RefCell::new(Device::new()));
    let dw1000 = ll::DW1000::new(
        MockSpi(device.clone()),
        MockCs(device.clone()),
        MockIrq(device.clone()),
    );

    (dw1000, device)
}

pub fn uninitialized() -> (hl::UninitializedDW1000<MockSpi, MockCs, MockIrq>, Shared) {
    let device = Rc::new(RefCell::new(Device::new()));
    let dw1000 = hl::UninitializedDW1000::new(
        MockSpi(device.clone()),
        MockCs(device.clone()),
        MockIrq(device.clone()),
    );

    (dw1000, device)
}

/// An initialized instance with a clean transaction log
pub fn hl() -> (MockDw1000, Shared) {
    let (dw1000, device) = uninitialized();
    let dw1000 = dw1000.init(&mut MockDelay::default()).unwrap();

    let mut d = device.borrow_mut();
    d.log.clear();
    d.irq_enters = 0;
    d.irq_exits = 0;
    d.cs_lows = 0;
    d.cs_highs = 0;
    drop(d);

    (dw1000, device)
}
