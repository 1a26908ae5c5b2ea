//! Critical sections around DW1000 bus transactions
//!
//! Every SPI transaction with the DW1000 runs inside a critical section, so
//! neither an interrupt handler serving the DW1000 IRQ line nor another task
//! can observe a half-written register. What exactly needs to be disabled
//! depends on the platform, which is why this is abstracted by
//! [`IrqControl`].
//!
//! Critical sections are entered through [`CriticalSection::enter`], which
//! returns a guard that restores the previous state when dropped. The raw
//! [`enter`]/[`exit`] pair is available for code that can't hold a guard.
//!
//! Critical sections are not meant to be nested. The transport layer takes
//! care to enter exactly one per transaction, see [`ll::DW1000::atomic`] for
//! running multiple transactions under a single one.
//!
//! [`ll::DW1000::atomic`]: ../ll/struct.DW1000.html#method.atomic

use cortex_m::{interrupt::InterruptNumber, peripheral::NVIC, register::primask};


/// Platform hook for masking the interrupts that could access the DW1000
///
/// Implementations must disable the interrupt associated with the DW1000's
/// IRQ line, as well as task preemption, and report what the state was
/// before. `restore` must put back exactly that state. It must never
/// unconditionally re-enable anything.
pub trait IrqControl {
    /// The interrupt state saved by `disable`
    type State;

    /// Disables the DW1000 interrupt and preemption
    fn disable(&mut self) -> Self::State;

    /// Restores the state saved by a previous call to `disable`
    fn restore(&mut self, state: Self::State);
}


/// Saved interrupt state, returned by [`enter`]
///
/// Must be passed to [`exit`] exactly once. This type is neither `Clone` nor
/// `Copy`, so the compiler won't let it be used twice.
#[must_use = "the saved state must be passed to `irq::exit`"]
pub struct IrqToken<S>(S);

/// Enters a critical section
pub fn enter<I: IrqControl>(irq: &mut I) -> IrqToken<I::State> {
    IrqToken(irq.disable())
}

/// Leaves a critical section, restoring the state saved by `enter`
pub fn exit<I: IrqControl>(irq: &mut I, token: IrqToken<I::State>) {
    irq.restore(token.0)
}


/// A critical section that is left when this guard is dropped
pub struct CriticalSection<'r, I: IrqControl> {
    irq: &'r mut I,
    token: Option<IrqToken<I::State>>,
}

impl<'r, I: IrqControl> CriticalSection<'r, I> {
    /// Enters a critical section
    pub fn enter(irq: &'r mut I) -> Self {
        let token = enter(irq);

        CriticalSection {
            irq,
            token: Some(token),
        }
    }

    /// Leaves the critical section
    ///
    /// Equivalent to dropping the guard.
    pub fn exit(self) {}
}

impl<'r, I: IrqControl> Drop for CriticalSection<'r, I> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            exit(&mut *self.irq, token);
        }
    }
}


/// For boards that poll the DW1000 and don't connect its IRQ line
///
/// Without an interrupt handler touching the DW1000, there's nothing to
/// exclude.
#[derive(Debug, Default)]
pub struct NoIrq;

impl IrqControl for NoIrq {
    type State = ();

    fn disable(&mut self) {}

    fn restore(&mut self, _: ()) {}
}


/// Masks the NVIC line of the DW1000 IRQ input and all other interrupts
///
/// Setting PRIMASK also keeps the RTOS tick from switching tasks, so this
/// excludes both the DW1000 interrupt handler and other tasks. Both are only
/// re-enabled on exit if they were enabled on entry.
pub struct DeviceIrq<N> {
    line: N,
}

impl<N: InterruptNumber> DeviceIrq<N> {
    /// Creates an instance for the interrupt the DW1000 IRQ line is routed to
    pub fn new(line: N) -> Self {
        DeviceIrq { line }
    }
}

/// Interrupt state saved by [`DeviceIrq`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceIrqState {
    line_enabled: bool,
    interrupts_enabled: bool,
}

impl<N: InterruptNumber> IrqControl for DeviceIrq<N> {
    type State = DeviceIrqState;

    fn disable(&mut self) -> DeviceIrqState {
        mask_all(self)
    }

    fn restore(&mut self, state: DeviceIrqState) {
        unmask_saved(self, state)
    }
}


/// The interrupt controls `DeviceIrq` needs
trait InterruptLines {
    fn interrupts_enabled(&self) -> bool;
    fn disable_interrupts(&mut self);
    fn enable_interrupts(&mut self);

    fn line_enabled(&self) -> bool;
    fn mask_line(&mut self);
    fn unmask_line(&mut self);
}

impl<N: InterruptNumber> InterruptLines for DeviceIrq<N> {
    fn interrupts_enabled(&self) -> bool {
        primask::read().is_active()
    }

    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable()
    }

    fn enable_interrupts(&mut self) {
        // Only called if PRIMASK was clear on entry.
        unsafe { cortex_m::interrupt::enable() }
    }

    fn line_enabled(&self) -> bool {
        NVIC::is_enabled(self.line)
    }

    fn mask_line(&mut self) {
        NVIC::mask(self.line)
    }

    fn unmask_line(&mut self) {
        // Only called if the line was unmasked on entry.
        unsafe { NVIC::unmask(self.line) }
    }
}

fn mask_all<L: InterruptLines>(lines: &mut L) -> DeviceIrqState {
    let interrupts_enabled = lines.interrupts_enabled();
    lines.disable_interrupts();

    let line_enabled = lines.line_enabled();
    lines.mask_line();

    DeviceIrqState {
        line_enabled,
        interrupts_enabled,
    }
}

fn unmask_saved<L: InterruptLines>(lines: &mut L, state: DeviceIrqState) {
    // The line first, so a pending DW1000 interrupt fires only once
    // everything is back.
    if state.line_enabled {
        lines.unmask_line();
    }
    if state.interrupts_enabled {
        lines.enable_interrupts();
    }
}


/// Delegates to the `critical-section` crate
///
/// Useful on platforms that already provide a `critical-section`
/// implementation, for example an RTOS port.
#[derive(Debug, Default)]
pub struct GlobalCriticalSection;

impl IrqControl for GlobalCriticalSection {
    type State = critical_section::RestoreState;

    fn disable(&mut self) -> Self::State {
        // Released by `restore`, which `irq::exit` calls with the returned
        // state exactly once.
        unsafe { critical_section::acquire() }
    }

    fn restore(&mut self, state: Self::State) {
        unsafe { critical_section::release(state) }
    }
}
