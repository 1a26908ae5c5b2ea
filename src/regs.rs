//! DW1000 register map
//!
//! Only the registers this crate actually touches are listed here. The
//! DW1000 user manual, section 7.1, has the full map. Register files are
//! addressed by their 6-bit id, and bytes within a file by a 15-bit
//! sub-index, see [`ll::Header`].
//!
//! [`ll::Header`]: ../ll/struct.Header.html

use bitflags::bitflags;


/// Device identifier
pub const DEV_ID: u8 = 0x00;
/// System configuration
pub const SYS_CFG: u8 = 0x04;
/// Receive frame wait timeout period
pub const RX_FWTO: u8 = 0x0C;
/// System control
pub const SYS_CTRL: u8 = 0x0D;
/// System event mask
pub const SYS_MASK: u8 = 0x0E;
/// System event status
pub const SYS_STATUS: u8 = 0x0F;
/// Receive frame information
pub const RX_FINFO: u8 = 0x10;
/// Receive data buffer
pub const RX_BUFFER: u8 = 0x11;
/// Always-on system control
pub const AON: u8 = 0x2C;
/// Power management and system control
pub const PMSC: u8 = 0x36;

/// The value of `DEV_ID` for a DW1000
pub const DEVICE_ID: u32 = 0xDECA_0130;

/// Mask for the frame length field of `RX_FINFO`
///
/// Covers the 7-bit standard length plus the 3-bit extension used with
/// non-standard PHR mode.
pub const RX_FINFO_RXFL_MASK: u32 = 0x3FF;

/// Receive wait timeout enable bit in `SYS_CFG`
pub const SYS_CFG_RXWTOE: u32 = 0x1000_0000;

/// Offset of `AON_WCFG` in `AON`
pub const AON_WCFG_OFFSET: u16 = 0x00;
/// Offset of `AON_CTRL` in `AON`
pub const AON_CTRL_OFFSET: u16 = 0x02;
/// Offset of `AON_CFG0` in `AON`
pub const AON_CFG0_OFFSET: u16 = 0x06;
/// Uploads the AON configuration array when written to `AON_CTRL`
pub const AON_CTRL_SAVE: u8 = 0x02;

/// Offset of `PMSC_CTRL0` in `PMSC`
pub const PMSC_CTRL0_OFFSET: u16 = 0x00;
/// Offset of the soft reset byte of `PMSC_CTRL0`
pub const PMSC_CTRL0_SOFTRESET_OFFSET: u16 = 0x03;
/// Offset of `PMSC_CTRL1` in `PMSC`
pub const PMSC_CTRL1_OFFSET: u16 = 0x04;
/// Mask of the system clock selection bits in `PMSC_CTRL0`
pub const PMSC_CTRL0_SYSCLKS_MASK: u8 = 0x03;
/// Forces the system clock to the 19.2 MHz XTI clock
pub const PMSC_CTRL0_SYSCLKS_XTI: u8 = 0x01;
/// Soft reset byte value: reset everything
pub const SOFTRESET_ALL: u8 = 0x00;
/// Soft reset byte value: reset the receiver
pub const SOFTRESET_RX: u8 = 0xE0;
/// Soft reset byte value: release all resets
pub const SOFTRESET_CLEAR: u8 = 0xF0;

/// Offset of the byte containing `HRBPT` in `SYS_CTRL`
pub const SYS_CTRL_HRBT_OFFSET: u16 = 0x03;


bitflags! {
    /// System event status (`SYS_STATUS`, lower 32 bits)
    ///
    /// Events are cleared by writing a 1 to the respective bit.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct SysStatus: u32 {
        /// Interrupt request status
        const IRQS     = 1 << 0;
        /// Clock PLL lock
        const CPLOCK   = 1 << 1;
        /// External sync clock reset
        const ESYNCR   = 1 << 2;
        /// Automatic acknowledge trigger
        const AAT      = 1 << 3;
        /// TX frame begins
        const TXFRB    = 1 << 4;
        /// TX preamble sent
        const TXPRS    = 1 << 5;
        /// TX PHY header sent
        const TXPHS    = 1 << 6;
        /// TX frame sent
        const TXFRS    = 1 << 7;
        /// Receiver preamble detected
        const RXPRD    = 1 << 8;
        /// Receiver SFD detected
        const RXSFDD   = 1 << 9;
        /// LDE processing done
        const LDEDONE  = 1 << 10;
        /// Receiver PHY header detected
        const RXPHD    = 1 << 11;
        /// Receiver PHY header error
        const RXPHE    = 1 << 12;
        /// Receiver data frame ready
        const RXDFR    = 1 << 13;
        /// Receiver FCS good
        const RXFCG    = 1 << 14;
        /// Receiver FCS error
        const RXFCE    = 1 << 15;
        /// Receiver Reed Solomon frame sync loss
        const RXRFSL   = 1 << 16;
        /// Receiver frame wait timeout
        const RXRFTO   = 1 << 17;
        /// Leading edge detection processing error
        const LDEERR   = 1 << 18;
        /// Receiver overrun
        const RXOVRR   = 1 << 20;
        /// Preamble detection timeout
        const RXPTO    = 1 << 21;
        /// GPIO interrupt
        const GPIOIRQ  = 1 << 22;
        /// SLEEP to INIT
        const SLP2INIT = 1 << 23;
        /// RF PLL losing lock
        const RFPLL_LL = 1 << 24;
        /// Clock PLL losing lock
        const CLKPLL_LL = 1 << 25;
        /// Receive SFD timeout
        const RXSFDTO  = 1 << 26;
        /// Half period delay warning
        const HPDWARN  = 1 << 27;
        /// Transmit buffer error
        const TXBERR   = 1 << 28;
        /// Automatic frame filtering rejection
        const AFFREJ   = 1 << 29;
        /// Host side receive buffer pointer
        const HSRBP    = 1 << 30;
        /// IC side receive buffer pointer
        const ICRBP    = 1 << 31;
    }
}

impl SysStatus {
    /// All events of a good reception
    pub const ALL_RX_GOOD: Self = Self::RXDFR
        .union(Self::RXFCG)
        .union(Self::RXPRD)
        .union(Self::RXSFDD)
        .union(Self::RXPHD)
        .union(Self::LDEDONE);

    /// All receive errors
    ///
    /// Any of these ends a receive operation.
    pub const ALL_RX_ERR: Self = Self::RXPHE
        .union(Self::RXFCE)
        .union(Self::RXRFSL)
        .union(Self::RXSFDTO)
        .union(Self::AFFREJ)
        .union(Self::LDEERR);

    /// All receive timeouts
    pub const ALL_RX_TO: Self = Self::RXRFTO.union(Self::RXPTO);

    /// All transmit events
    pub const ALL_TX: Self = Self::AAT
        .union(Self::TXFRB)
        .union(Self::TXPRS)
        .union(Self::TXPHS)
        .union(Self::TXFRS);

    /// Any event that ends a receive operation
    pub const RX_DONE: Self = Self::RXFCG
        .union(Self::ALL_RX_ERR)
        .union(Self::ALL_RX_TO);
}


bitflags! {
    /// System control (`SYS_CTRL`)
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct SysCtrl: u32 {
        /// Suppress auto-FCS transmission
        const SFCST     = 1 << 0;
        /// Transmit start
        const TXSTRT    = 1 << 1;
        /// Transmitter delayed sending
        const TXDLYS    = 1 << 2;
        /// Cancel suppression of auto-FCS transmission
        const CANSFCS   = 1 << 3;
        /// Transceiver off
        const TRXOFF    = 1 << 6;
        /// Wait for response
        const WAIT4RESP = 1 << 7;
        /// Enable receiver
        const RXENAB    = 1 << 8;
        /// Receiver delayed enable
        const RXDLYE    = 1 << 9;
        /// Host side receive buffer pointer toggle
        const HRBPT     = 1 << 24;
    }
}
