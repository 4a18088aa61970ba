/*
 * Machine Boundary
 *
 * Everything the kernel knows about the simulated computer lives here: the
 * traits the simulator implements (memory, device bus, image loader), the
 * memory layout the interrupt trampoline expects, and the errors those
 * accesses can produce.
 *
 * The kernel never talks to the simulator through anything else. The test
 * suite provides scripted implementations of these traits, so every kernel
 * path can be exercised without the real simulator.
 */

use thiserror::Error;

pub mod ports;

pub use ports::{Port, TerminalId};

/// Save-area address for the interrupted program counter.
pub const SAVE_PC: usize = 0;
/// Save-area address for register A.
pub const SAVE_A: usize = 1;
/// Save-area address for register X.
pub const SAVE_X: usize = 2;
/// Save-area address for the CPU error code of a fault.
pub const SAVE_ERROR: usize = 3;
/// Save-area address for the CPU mode bit.
pub const SAVE_MODE: usize = 4;

/// Address the trampoline image must be loaded at. The CPU vectors here on
/// every interrupt; the image ends in the trap instruction that enters the
/// kernel.
pub const TRAMPOLINE_ADDR: usize = 10;

/// What the kernel tells the simulator after an interrupt was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Resume execution; a descriptor was dispatched (or the machine idles
    /// in the trampoline until the next interrupt).
    Resume,
    /// Stop the machine.
    Halt,
}

impl Control {
    /// Raw value for the simulator callback (0 resumes, 1 halts).
    pub fn as_raw(self) -> i32 {
        match self {
            Control::Resume => 0,
            Control::Halt => 1,
        }
    }
}

/// A program image ready to be copied into simulated memory.
///
/// The loader parses the on-disk format; the kernel only sees the declared
/// load address and the words.
#[derive(Debug, Clone)]
pub struct Program {
    pub load_address: usize,
    pub words: Vec<i32>,
}

impl Program {
    /// First address past the image once loaded.
    pub fn end_address(&self) -> usize {
        self.load_address + self.words.len()
    }
}

/// Failure of a memory or device-port access.
///
/// The simulator is trusted to present well-behaved devices, so any of
/// these is fatal to the kernel once it reaches the interrupt dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("memory address {0} out of range")]
    BadAddress(usize),
    #[error("no device behind port {0}")]
    BadPort(usize),
    #[error("device behind port {0} refused the access")]
    DeviceFault(usize),
}

/// Failure to produce a program image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("image '{0}' not found")]
    NotFound(String),
    #[error("image '{0}' is malformed")]
    Malformed(String),
}

/// Word-addressable main memory of the simulated machine.
pub trait Memory {
    fn read(&self, addr: usize) -> Result<i32, MachineError>;
    fn write(&mut self, addr: usize, value: i32) -> Result<(), MachineError>;
}

/// Memory-mapped device ports.
///
/// Reads take `&mut self` because reading a data port consumes the datum
/// on terminal keyboards.
pub trait DeviceBus {
    fn read(&mut self, port: Port) -> Result<i32, MachineError>;
    fn write(&mut self, port: Port, value: i32) -> Result<(), MachineError>;
}

/// Source of program images named by supervisor calls and by boot.
pub trait ImageLoader {
    fn load(&self, name: &str) -> Result<Program, LoadError>;
}
