use embedded_hal::{blocking::delay::DelayMs, digital::v2::OutputPin, spi::FullDuplex};
use log::{debug, warn};

use crate::{
    configs::DriverConfig,
    irq::IrqControl,
    ll::{self, Registers as _},
    regs,
    Error,
    FrameBuffer,
    RxState,
    DW1000,
};


/// A DW1000 before initialization
///
/// Calling [`init`] checks that a DW1000 is actually connected, resets it and
/// returns the [`DW1000`] instance the rest of the API is available on.
///
/// [`init`]: #method.init
pub struct UninitializedDW1000<SPI, CS, IRQ> {
    ll: ll::DW1000<SPI, CS, IRQ>,
    config: DriverConfig,
}

impl<SPI, CS, IRQ> UninitializedDW1000<SPI, CS, IRQ>
where
    SPI: FullDuplex<u8>,
    CS: OutputPin,
    IRQ: IrqControl,
{
    /// Create a new instance of `DW1000` with the default configuration
    ///
    /// Requires the SPI peripheral and the chip select pin that are connected
    /// to the DW1000, as well as the means to keep the DW1000 interrupt
    /// handler from running during a transaction. See [`irq`].
    ///
    /// [`irq`]: ../irq/index.html
    pub fn new(spi: SPI, chip_select: CS, irq: IRQ) -> Self {
        Self::with_config(spi, chip_select, irq, DriverConfig::default())
    }

    /// Create a new instance of `DW1000`
    pub fn with_config(spi: SPI, chip_select: CS, irq: IRQ, config: DriverConfig) -> Self {
        let mut ll = ll::DW1000::new(spi, chip_select, irq);
        ll.set_chip_select_delay(config.chip_select_delay);
        ll.set_bus_limit(config.bus_limit);

        UninitializedDW1000 { ll, config }
    }

    /// Get the low-level interface to the uninitialized DW1000
    pub fn ll(&mut self) -> &mut ll::DW1000<SPI, CS, IRQ> {
        &mut self.ll
    }

    /// Initialize the DW1000
    ///
    /// Reads the device id and fails with [`Error::UnknownDevice`], if it
    /// doesn't belong to a DW1000. Then resets the DW1000 and leaves it in
    /// its idle state, with the receiver off.
    pub fn init<D: DelayMs<u8>>(
        mut self,
        delay: &mut D,
    ) -> Result<DW1000<SPI, CS, IRQ>, Error<SPI, CS>> {
        let id = self.ll.read_u32(regs::DEV_ID, 0)?;
        if id != regs::DEVICE_ID {
            warn!("unexpected device id {:#010x}", id);
            return Err(Error::UnknownDevice(id));
        }

        self.soft_reset(delay)?;
        debug!("dw1000 initialized");

        Ok(DW1000 {
            ll: self.ll,
            state: RxState::Idle,
            frame: FrameBuffer::new(),
            last_status: regs::SysStatus::empty(),
            last_frame_len: 0,
            config: self.config,
        })
    }

    /// Resets everything but the host interface
    ///
    /// See the DW1000 user manual, section 7.2.50.1.
    fn soft_reset<D: DelayMs<u8>>(&mut self, delay: &mut D) -> Result<(), Error<SPI, CS>> {
        // The system clock must run from the crystal during the reset.
        let pmsc_ctrl0 = self.ll.read_u8(regs::PMSC, regs::PMSC_CTRL0_OFFSET)?;
        self.ll.write_u8(
            regs::PMSC,
            regs::PMSC_CTRL0_OFFSET,
            (pmsc_ctrl0 & !regs::PMSC_CTRL0_SYSCLKS_MASK) | regs::PMSC_CTRL0_SYSCLKS_XTI,
        )?;
        self.ll.write_u16(regs::PMSC, regs::PMSC_CTRL1_OFFSET, 0)?;

        // Keep the always-on block from restoring a stale configuration
        self.ll.write_u16(regs::AON, regs::AON_WCFG_OFFSET, 0)?;
        self.ll.write_u8(regs::AON, regs::AON_CFG0_OFFSET, 0)?;
        self.ll.write_u8(regs::AON, regs::AON_CTRL_OFFSET, 0)?;
        self.ll.write_u8(regs::AON, regs::AON_CTRL_OFFSET, regs::AON_CTRL_SAVE)?;

        self.ll.write_u8(regs::PMSC, regs::PMSC_CTRL0_SOFTRESET_OFFSET, regs::SOFTRESET_ALL)?;
        delay.delay_ms(1);
        self.ll.write_u8(regs::PMSC, regs::PMSC_CTRL0_SOFTRESET_OFFSET, regs::SOFTRESET_CLEAR)?;

        Ok(())
    }
}
