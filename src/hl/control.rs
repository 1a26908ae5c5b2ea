use embedded_hal::{digital::v2::OutputPin, spi::FullDuplex};
use log::debug;

use crate::{
    configs::{RadioConfig, RadioDriver},
    irq::IrqControl,
    ll::{self, Registers},
    regs::{self, SysCtrl, SysStatus},
    Error,
    RxState,
    DW1000,
};


impl<SPI, CS, IRQ> DW1000<SPI, CS, IRQ>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    IRQ: IrqControl,
{
    /// Resets the receiver, without touching the rest of the DW1000
    pub fn rx_reset(&mut self) -> Result<(), Error<SPI, CS>> {
        self.ll.atomic(|bus| reset_receiver(bus))?;
        Ok(())
    }

    /// Turns the transceiver off immediately
    ///
    /// Any ongoing receive operation is aborted, and all transmit and
    /// receive events are cleared. Runs in a single critical section, so the
    /// DW1000 interrupt handler never sees the intermediate state.
    pub fn force_idle(&mut self) -> Result<(), Error<SPI, CS>> {
        // Not receiving anymore, even if this fails halfway
        self.state = RxState::Idle;

        self.ll.atomic(|bus| {
            let mask = bus.read_u32(regs::SYS_MASK, 0)?;
            bus.write_u32(regs::SYS_MASK, 0, 0)?;

            bus.write_u8(regs::SYS_CTRL, 0, SysCtrl::TRXOFF.bits() as u8)?;

            let events = SysStatus::ALL_TX
                .union(SysStatus::ALL_RX_ERR)
                .union(SysStatus::ALL_RX_TO)
                .union(SysStatus::ALL_RX_GOOD);
            bus.write_u32(regs::SYS_STATUS, 0, events.bits())?;

            sync_rx_buffer_pointers(bus)?;

            bus.write_u32(regs::SYS_MASK, 0, mask)
        })?;

        debug!("transceiver off");
        Ok(())
    }

    /// Sets the receive frame wait timeout
    ///
    /// `time` is in units of 512/499.2 MHz, roughly 1.026 µs. If no frame
    /// has been received when the timeout expires, the next poll reports
    /// [`RxEvent::Timeout`]. `0` disables the timeout.
    ///
    /// [`RxEvent::Timeout`]: enum.RxEvent.html#variant.Timeout
    pub fn set_rx_timeout(&mut self, time: u16) -> Result<(), Error<SPI, CS>> {
        let enable = (regs::SYS_CFG_RXWTOE >> 24) as u8;

        self.ll.atomic(|bus| {
            let mut sys_cfg = bus.read_u8(regs::SYS_CFG, 3)?;

            if time > 0 {
                bus.write_u16(regs::RX_FWTO, 0, time)?;
                sys_cfg |= enable;
            }
            else {
                sys_cfg &= !enable;
            }

            bus.write_u8(regs::SYS_CFG, 3, sys_cfg)
        })?;

        Ok(())
    }

    /// Applies a radio configuration
    ///
    /// An ongoing receive operation is aborted first. The configuration
    /// itself is not validated.
    pub fn configure<D>(&mut self, driver: &mut D, config: &RadioConfig) -> Result<(), Error<SPI, CS>>
    where
        D: RadioDriver<ll::DW1000<SPI, CS, IRQ>>,
    {
        if self.is_receiving() {
            self.force_idle()?;
        }

        driver.configure(&mut self.ll, config)?;
        debug!("radio configured: {:?}", config);

        Ok(())
    }
}


/// Issues a receiver-only soft reset
pub(crate) fn reset_receiver<R: Registers + ?Sized>(bus: &mut R) -> Result<(), R::Error> {
    let offset = regs::PMSC_CTRL0_SOFTRESET_OFFSET;

    bus.write_u8(regs::PMSC, offset, regs::SOFTRESET_RX)?;
    bus.write_u8(regs::PMSC, offset, regs::SOFTRESET_CLEAR)
}

/// Makes the host side receive buffer pointer match the IC side one
///
/// Only matters in double-buffered mode, but the DW1000 might have been left
/// in any state.
pub(crate) fn sync_rx_buffer_pointers<R: Registers + ?Sized>(
    bus: &mut R,
) -> Result<(), R::Error> {
    let status = bus.read_u8(regs::SYS_STATUS, 3)?;

    let icrbp = status & (SysStatus::ICRBP.bits() >> 24) as u8;
    let hsrbp = status & (SysStatus::HSRBP.bits() >> 24) as u8;

    if icrbp != hsrbp << 1 {
        bus.write_u8(
            regs::SYS_CTRL,
            regs::SYS_CTRL_HRBT_OFFSET,
            (SysCtrl::HRBPT.bits() >> 24) as u8,
        )?;
    }

    Ok(())
}
