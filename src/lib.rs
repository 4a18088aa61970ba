/*
 * maqos - process kernel for a simulated machine
 *
 * This crate implements the interrupt-driven process subsystem of a small
 * operating system that runs on a simulated computer. The machine exposes a
 * CPU with two general registers (A and X), a program counter, a mode bit,
 * main memory, four character terminals, a programmable interval timer and
 * an instruction-count clock.
 *
 * The kernel executes only inside its interrupt entry point. Every trap
 * performs the same fixed sequence:
 *
 * 1. account elapsed simulated time into per-process state buckets
 * 2. save the interrupted CPU context into the current descriptor
 * 3. service the interrupt (reset, supervisor call, CPU fault, timer)
 * 4. re-examine blocked descriptors and release the ones whose condition
 *    now holds
 * 5. run the scheduling policy
 * 6. dispatch the chosen descriptor, or halt when no work remains
 *
 * The simulator itself (CPU, memory, bus, program loader, console) is not
 * part of this crate. It is reached through the traits in `machine`, and
 * the test suite substitutes a scripted mock machine behind the same
 * traits.
 */

pub mod irq;
pub mod kernel;
pub mod machine;
pub mod metrics;
pub mod process;
pub mod queue;
pub mod sched;
pub mod syscall;

pub use irq::Irq;
pub use kernel::{Kernel, KernelConfig};
pub use machine::{Control, DeviceBus, ImageLoader, MachineError, Memory, Program};
pub use process::{BlockReason, CpuMode, Pid, Process, ProcessState};
pub use sched::SchedulerKind;
pub use syscall::SyscallId;

/// Instructions between two timer interrupts.
pub const TIMER_INTERVAL: i32 = 50;

/// Timer ticks a descriptor may run before preemption is considered.
pub const QUANTUM: u32 = 10;

/// Capacity of the process table.
pub const MAX_PROCS: usize = 10;

/// Image executed by the first process after reset.
pub const INIT_IMAGE: &str = "init.maq";

/// Image holding the interrupt trampoline, installed at boot.
pub const TRAMPOLINE_IMAGE: &str = "trampoline.maq";

/// Default name of the metrics report written on shutdown.
pub const METRICS_REPORT: &str = "metricas_processos.txt";
