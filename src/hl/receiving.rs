use bitflags::bitflags;
use embedded_hal::{digital::v2::OutputPin, serial, spi::FullDuplex};
use log::{debug, trace, warn};

use crate::{
    hl::control::{reset_receiver, sync_rx_buffer_pointers},
    irq::IrqControl,
    ll::Registers as _,
    regs::{self, SysCtrl, SysStatus},
    util::{self, PollLimit, TimeoutError},
    Error,
    RxState,
    DW1000,
    FRAME_LEN_MAX,
};


/// The outcome of a receive operation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RxEvent {
    /// A frame with a good checksum was received
    ///
    /// The frame is available through [`DW1000::frame`].
    Frame {
        /// The length of the frame, including the checksum
        len: usize,
    },

    /// A good frame was received, but it doesn't fit into the frame buffer
    ///
    /// The frame has been dropped.
    SizeViolation {
        /// The length reported by the DW1000
        len: usize,
        /// The capacity of the frame buffer
        capacity: usize,
    },

    /// No frame arrived before the receiver timed out
    ///
    /// Contains the timeout events that were set. The receiver has been
    /// reset.
    Timeout(SysStatus),

    /// The DW1000 reported a receive error
    ///
    /// The receiver has been reset.
    DeviceError(RxFault),
}

impl RxEvent {
    /// Whether a frame is available
    pub fn is_frame(&self) -> bool {
        matches!(self, RxEvent::Frame { .. })
    }
}


bitflags! {
    /// Receive errors reported by the DW1000
    ///
    /// Uses the same bits as [`SysStatus`].
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct RxFault: u32 {
        /// PHY header error
        const PHY_HEADER      = SysStatus::RXPHE.bits();
        /// Checksum error
        const CRC             = SysStatus::RXFCE.bits();
        /// Reed Solomon frame sync loss
        const SYNC_LOSS       = SysStatus::RXRFSL.bits();
        /// Leading edge detection processing error
        const LDE             = SysStatus::LDEERR.bits();
        /// SFD timeout
        const SFD_TIMEOUT     = SysStatus::RXSFDTO.bits();
        /// The frame was rejected by automatic frame filtering
        const FILTER_REJECTED = SysStatus::AFFREJ.bits();
    }
}

impl RxFault {
    /// Extracts the receive errors from a status word
    pub fn from_status(status: SysStatus) -> Self {
        Self::from_bits_truncate(status.bits())
    }

    /// Whether the frame failed the checksum
    pub fn is_crc(&self) -> bool {
        self.contains(RxFault::CRC)
    }

    /// Whether the PHY header was corrupt
    pub fn is_phy_header(&self) -> bool {
        self.contains(RxFault::PHY_HEADER)
    }

    /// Whether the receiver lost frame sync
    pub fn is_sync_loss(&self) -> bool {
        self.contains(RxFault::SYNC_LOSS)
    }

    /// Whether the SFD wasn't detected in time
    pub fn is_sfd_timeout(&self) -> bool {
        self.contains(RxFault::SFD_TIMEOUT)
    }
}


impl<SPI, CS, IRQ> DW1000<SPI, CS, IRQ>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    IRQ: IrqControl,
{
    /// Enables the receiver
    ///
    /// Clears the frame buffer. If a receive operation is already ongoing,
    /// that's all this does. Otherwise, receive events left over from an
    /// earlier operation are cleared before the receiver is enabled.
    pub fn start_receiving(&mut self) -> Result<(), Error<SPI, CS>> {
        self.frame.clear();

        if self.is_receiving() {
            trace!("already receiving");
            return Ok(());
        }

        self.ll.atomic(|bus| {
            let stale = SysStatus::ALL_RX_GOOD
                .union(SysStatus::ALL_RX_ERR)
                .union(SysStatus::ALL_RX_TO);
            bus.write_u32(regs::SYS_STATUS, 0, stale.bits())?;

            sync_rx_buffer_pointers(bus)?;
            bus.write_u16(regs::SYS_CTRL, 0, SysCtrl::RXENAB.bits() as u16)
        })?;

        self.state = RxState::Armed;
        debug!("receiver armed");

        Ok(())
    }

    /// Checks whether the receive operation has finished
    ///
    /// Reads the status word once. If the DW1000 received a frame, it is read
    /// into the frame buffer. If it reports an error or a timeout, the event
    /// is cleared and the receiver reset. Either way, the receive operation
    /// is over, and [`start_receiving`] has to be called again.
    ///
    /// Returns `WouldBlock`, if nothing happened yet. Use this to busily wait
    /// with `nb`'s `block!` macro, or see [`wait_event`].
    ///
    /// [`start_receiving`]: #method.start_receiving
    /// [`wait_event`]: #method.wait_event
    pub fn poll(&mut self) -> nb::Result<RxEvent, Error<SPI, CS>> {
        if !self.is_receiving() {
            return Err(nb::Error::Other(Error::NotReceiving));
        }

        match self.classify() {
            Ok(Some(event)) => {
                self.state = RxState::Idle;
                Ok(event)
            }
            Ok(None) => Err(nb::Error::WouldBlock),
            Err(error) => {
                warn!("bus error while receiving, receiver idle");
                self.state = RxState::Idle;
                Err(nb::Error::Other(error))
            }
        }
    }

    /// Polls until the receive operation has finished
    ///
    /// `yield_fn` is called between polls, to let other tasks run. If there's
    /// still no result after `limit` polls, the transceiver is turned off and
    /// [`Error::RxPollTimeout`] is returned.
    pub fn wait_event<Y>(&mut self, limit: PollLimit, yield_fn: Y) -> Result<RxEvent, Error<SPI, CS>>
    where
        Y: FnMut(),
    {
        match util::poll_until_with(limit, || self.poll(), yield_fn) {
            Ok(event) => Ok(event),
            Err(TimeoutError::Other(error)) => Err(error),
            Err(TimeoutError::Timeout) => {
                warn!("no receive event after {} polls", limit.max_polls());
                self.force_idle()?;
                Err(Error::RxPollTimeout)
            }
        }
    }

    /// Aborts an ongoing receive operation
    ///
    /// Does nothing, if there is none.
    pub fn abort_receiving(&mut self) -> Result<(), Error<SPI, CS>> {
        if self.is_receiving() {
            self.force_idle()?;
        }

        Ok(())
    }

    /// The most recently received frame
    ///
    /// Empty, unless the last receive operation produced [`RxEvent::Frame`].
    pub fn frame(&self) -> &[u8] {
        self.frame.as_slice()
    }

    /// Writes the current frame to `sink`, byte by byte
    ///
    /// Waits for the sink before every byte, up to the configured sink
    /// limit. Returns the number of bytes written.
    pub fn forward<S>(&self, sink: &mut S) -> Result<usize, TimeoutError<S::Error>>
    where
        S: serial::Write<u8>,
    {
        let limit = self.config.sink_limit;

        for &byte in self.frame.as_slice() {
            util::poll_until(limit, || sink.write(byte))?;
        }

        Ok(self.frame.len())
    }

    /// Runs a complete receive operation
    ///
    /// Enables the receiver, waits for the result and forwards a good frame
    /// to `sink`. The pause before the next cycle is up to the caller.
    pub fn receive_cycle<S, Y>(&mut self, sink: &mut S, yield_fn: Y) -> Result<RxEvent, Error<SPI, CS>>
    where
        S: serial::Write<u8>,
        Y: FnMut(),
    {
        self.start_receiving()?;
        let event = self.wait_event(self.config.rx_poll_limit, yield_fn)?;

        if event.is_frame() {
            self.forward(sink).map_err(|_| {
                warn!("failed to forward frame");
                Error::Sink
            })?;
        }

        Ok(event)
    }

    fn classify(&mut self) -> Result<Option<RxEvent>, Error<SPI, CS>> {
        let status = SysStatus::from_bits_retain(self.ll.read_u32(regs::SYS_STATUS, 0)?);
        self.last_status = status;

        if !status.intersects(SysStatus::RX_DONE) {
            return Ok(None);
        }

        if status.contains(SysStatus::RXFCG) {
            return self.drain_frame().map(Some);
        }

        if status.intersects(SysStatus::ALL_RX_ERR) {
            let fault = RxFault::from_status(status);
            warn!("receive error: {:?}", fault);

            self.ll.atomic(|bus| {
                let events = SysStatus::ALL_RX_TO.union(SysStatus::ALL_RX_ERR);
                bus.write_u32(regs::SYS_STATUS, 0, events.bits())?;
                reset_receiver(bus)
            })?;

            return Ok(Some(RxEvent::DeviceError(fault)));
        }

        debug!("receive timeout");

        self.ll.atomic(|bus| {
            bus.write_u32(regs::SYS_STATUS, 0, SysStatus::ALL_RX_TO.bits())?;
            reset_receiver(bus)
        })?;

        Ok(Some(RxEvent::Timeout(status & SysStatus::ALL_RX_TO)))
    }

    fn drain_frame(&mut self) -> Result<RxEvent, Error<SPI, CS>> {
        let rx_finfo = self.ll.read_u32(regs::RX_FINFO, 0)?;
        let len = (rx_finfo & regs::RX_FINFO_RXFL_MASK) as usize;
        self.last_frame_len = len as u16;

        let event = match self.frame.fill(len) {
            Ok(buffer) => {
                if let Err(error) = self.ll.read_buffer(regs::RX_BUFFER, 0, buffer) {
                    self.frame.clear();
                    return Err(error.into());
                }
                debug!("received frame of {} bytes", len);
                RxEvent::Frame { len }
            }
            Err(_) => {
                warn!("dropping frame of {} bytes", len);
                RxEvent::SizeViolation {
                    len,
                    capacity: FRAME_LEN_MAX,
                }
            }
        };

        if let Err(error) = self.ll.write_u32(regs::SYS_STATUS, 0, SysStatus::RXFCG.bits()) {
            self.frame.clear();
            return Err(error.into());
        }

        Ok(event)
    }
}
