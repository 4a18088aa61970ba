/*
 * Port Map
 *
 * Layout of the simulated device bus. Four character terminals occupy the
 * low ports, four ports each: keyboard data, keyboard ready, screen data,
 * screen ready. Above them sit the instruction-count clock and the interval
 * timer (countdown plus interrupt-enable).
 *
 * The accessors at the bottom are the device gateway: they translate a
 * descriptor's terminal id into the concrete ports the kernel reads and
 * writes.
 */

use core::fmt;

/// Number of terminals on the bus.
pub const TERMINAL_COUNT: u8 = 4;

const PORTS_PER_TERMINAL: usize = 4;

/// Instruction-count clock, read-only.
pub const CLOCK: Port = Port(16);
/// Timer countdown; writing arms the next interrupt.
pub const TIMER_COUNTDOWN: Port = Port(17);
/// Timer interrupt-enable and pending flag; 0 clears both.
pub const TIMER_IRQ: Port = Port(18);

/// Index of a device port on the simulated bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port(pub usize);

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the four terminals, as assigned to a process by `pid mod 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalId(u8);

impl TerminalId {
    /// Terminal for a given pid (callers pass a non-negative pid).
    pub fn for_pid(pid: i32) -> Self {
        TerminalId((pid.rem_euclid(TERMINAL_COUNT as i32)) as u8)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    fn base(self) -> usize {
        self.0 as usize * PORTS_PER_TERMINAL
    }

    /// Keyboard data port of this terminal.
    pub fn keyboard_data(self) -> Port {
        Port(self.base())
    }

    /// Keyboard ready-status port; non-zero means a datum is waiting.
    pub fn keyboard_ready(self) -> Port {
        Port(self.base() + 1)
    }

    /// Screen data port of this terminal.
    pub fn screen_data(self) -> Port {
        Port(self.base() + 2)
    }

    /// Screen ready-status port; non-zero means the screen accepts a write.
    pub fn screen_ready(self) -> Port {
        Port(self.base() + 3)
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminals_tile_the_low_ports() {
        let t0 = TerminalId::for_pid(0);
        assert_eq!(t0.keyboard_data(), Port(0));
        assert_eq!(t0.keyboard_ready(), Port(1));
        assert_eq!(t0.screen_data(), Port(2));
        assert_eq!(t0.screen_ready(), Port(3));

        let t3 = TerminalId::for_pid(3);
        assert_eq!(t3.keyboard_data(), Port(12));
        assert_eq!(t3.screen_ready(), Port(15));
    }

    #[test]
    fn pid_wraps_around_the_terminal_count() {
        assert_eq!(TerminalId::for_pid(5), TerminalId::for_pid(1));
        assert_eq!(TerminalId::for_pid(8), TerminalId::for_pid(0));
    }

    #[test]
    fn clock_and_timer_sit_above_the_terminals() {
        let top = TerminalId::for_pid(3).screen_ready();
        assert!(CLOCK.0 > top.0);
        assert_eq!(TIMER_COUNTDOWN.0, CLOCK.0 + 1);
        assert_eq!(TIMER_IRQ.0, CLOCK.0 + 2);
    }
}
