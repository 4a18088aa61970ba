/*
 * Interrupt Kinds
 *
 * The CPU reports the interrupt cause in register A when it traps into the
 * kernel. The raw value is decoded here; anything outside the table is
 * handled as unknown and is fatal.
 */

/// Cause of a kernel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Irq {
    /// Delivered once when the machine powers on.
    Reset = 0,
    /// The CPU detected an illegal condition; the error code is in the
    /// save area.
    CpuFault = 1,
    /// A trap instruction executed a supervisor call.
    Syscall = 2,
    /// The interval timer expired.
    Timer = 3,
    /// Keyboard attention (not used by this kernel).
    Keyboard = 4,
    /// Screen attention (not used by this kernel).
    Screen = 5,
}

/// How many distinct interrupt kinds the metrics collector tracks.
pub const IRQ_KINDS: usize = 6;

impl Irq {
    /// Decode the raw value the trampoline passed in register A.
    pub fn from_raw(raw: i32) -> Option<Irq> {
        match raw {
            0 => Some(Irq::Reset),
            1 => Some(Irq::CpuFault),
            2 => Some(Irq::Syscall),
            3 => Some(Irq::Timer),
            4 => Some(Irq::Keyboard),
            5 => Some(Irq::Screen),
            _ => None,
        }
    }

    /// Index into the per-kind counters.
    pub fn index(self) -> usize {
        self as i32 as usize
    }

    /// Short name for logging and the metrics report.
    pub fn name(self) -> &'static str {
        match self {
            Irq::Reset => "reset",
            Irq::CpuFault => "cpu fault",
            Irq::Syscall => "syscall",
            Irq::Timer => "timer",
            Irq::Keyboard => "keyboard",
            Irq::Screen => "screen",
        }
    }
}
