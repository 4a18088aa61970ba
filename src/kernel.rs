/*
 * Kernel Core
 *
 * The kernel object and its single entry point. The simulator calls
 * `handle_interrupt` from the trampoline's trap instruction; everything
 * else in this crate runs inside that call.
 *
 * Every entry follows the same fixed sequence: account elapsed time, save
 * the interrupted context, service the IRQ, release blocked descriptors
 * whose condition now holds, run the scheduling policy, then dispatch the
 * chosen descriptor or halt when nothing unfinished remains.
 *
 * The kernel is not reentrant and holds no global state: construction
 * yields one object that owns the process table, the ready queue, the
 * policy and the machine handles.
 */

use std::path::PathBuf;

use thiserror::Error;

use crate::irq::Irq;
use crate::machine::{
    Control, DeviceBus, ImageLoader, LoadError, MachineError, Memory, SAVE_A, SAVE_ERROR,
    SAVE_MODE, SAVE_PC, SAVE_X, TRAMPOLINE_ADDR, ports,
};
use crate::metrics::{self, KernelMetrics};
use crate::process::{BlockReason, CpuMode, Pid, Process, ProcessState, ProcessTable};
use crate::queue::ReadyQueue;
use crate::sched::{Decision, SchedCtx, SchedPolicy, SchedulerKind};
use crate::{INIT_IMAGE, METRICS_REPORT, QUANTUM, TIMER_INTERVAL, TRAMPOLINE_IMAGE};

/// Construction-time choices.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub scheduler: SchedulerKind,
    /// Where the shutdown report is written.
    pub metrics_path: PathBuf,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            scheduler: SchedulerKind::Simple,
            metrics_path: PathBuf::from(METRICS_REPORT),
        }
    }
}

/// Failure to place a program image in memory.
#[derive(Debug, Error)]
pub(crate) enum LoadFailure {
    #[error(transparent)]
    Image(#[from] LoadError),
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// The operating system kernel for one simulated machine.
pub struct Kernel {
    pub(crate) mem: Box<dyn Memory>,
    pub(crate) bus: Box<dyn DeviceBus>,
    pub(crate) loader: Box<dyn ImageLoader>,
    policy: Box<dyn SchedPolicy>,
    pub(crate) table: ProcessTable,
    pub(crate) queue: ReadyQueue,
    pub(crate) current: Option<usize>,
    pub(crate) quantum: u32,
    metrics: KernelMetrics,
    last_clock: i32,
    pub(crate) internal_error: bool,
    shut_down: bool,
    metrics_path: PathBuf,
}

impl Kernel {
    /// Build the kernel over the machine handles: install the trampoline
    /// image at its fixed address and arm the interval timer. The first
    /// interrupt the simulator delivers must be the reset.
    pub fn new(
        mem: Box<dyn Memory>,
        bus: Box<dyn DeviceBus>,
        loader: Box<dyn ImageLoader>,
        config: KernelConfig,
    ) -> Kernel {
        let mut kernel = Kernel {
            mem,
            bus,
            loader,
            policy: config.scheduler.build(),
            table: ProcessTable::new(),
            queue: ReadyQueue::new(config.scheduler.queue_order()),
            current: None,
            quantum: 0,
            metrics: KernelMetrics::new(),
            last_clock: 0,
            internal_error: false,
            shut_down: false,
            metrics_path: config.metrics_path,
        };
        log::info!("kernel starting, policy {}", kernel.policy.name());

        match kernel.load_program(TRAMPOLINE_IMAGE) {
            Ok(addr) if addr as usize == TRAMPOLINE_ADDR => {}
            Ok(addr) => {
                log::error!("trampoline image loads at {addr}, expected {TRAMPOLINE_ADDR}");
                kernel.internal_error = true;
            }
            Err(err) => {
                log::error!("cannot install trampoline: {err}");
                kernel.internal_error = true;
            }
        }
        if let Err(err) = kernel.bus.write(ports::TIMER_COUNTDOWN, TIMER_INTERVAL) {
            log::error!("cannot arm the timer: {err}");
            kernel.internal_error = true;
        }
        kernel
    }

    /// Simulator callback: the raw interrupt cause arrives in register A,
    /// the return value tells the CPU to resume (0) or halt (1).
    pub fn handle_interrupt(&mut self, reg_a: i32) -> i32 {
        self.interrupt(reg_a).as_raw()
    }

    /// One kernel entry.
    pub fn interrupt(&mut self, raw: i32) -> Control {
        if self.shut_down {
            return Control::Halt;
        }

        let irq = Irq::from_raw(raw);
        self.account_entry(irq);
        log::debug!(
            "kernel entry: irq {raw} ({})",
            irq.map_or("unknown", Irq::name)
        );

        self.save_cpu_state();

        match irq {
            Some(Irq::Reset) => self.on_reset(),
            Some(Irq::Syscall) => self.on_syscall(),
            Some(Irq::CpuFault) => self.on_cpu_fault(),
            Some(Irq::Timer) => self.on_timer(),
            Some(Irq::Keyboard) | Some(Irq::Screen) | None => self.on_unknown(raw),
        }

        self.service_blocked();
        self.schedule();

        if self.internal_error {
            log::error!("internal error, halting the machine");
            return Control::Halt;
        }
        if self.table.has_unfinished() {
            self.dispatch()
        } else {
            self.shutdown();
            Control::Halt
        }
    }

    // ======================================================================
    // ENTRY STEPS
    // ======================================================================

    /// Step one: count the interrupt and accrue the elapsed instruction
    /// ticks into the state bucket each descriptor was in when the
    /// interrupt arrived.
    fn account_entry(&mut self, irq: Option<Irq>) {
        self.metrics.record_irq(irq);
        let now = match self.bus.read(ports::CLOCK) {
            Ok(now) => now,
            Err(err) => {
                log::error!("cannot read the instruction clock: {err}");
                self.internal_error = true;
                return;
            }
        };
        let elapsed = (now - self.last_clock).max(0) as u64;
        self.last_clock = now;
        self.metrics.accrue(&mut self.table, elapsed);
    }

    /// Step two: copy the trampoline save area into the descriptor that
    /// was interrupted. Nothing to do when the CPU was idle or the
    /// descriptor already left the running state.
    fn save_cpu_state(&mut self) {
        let Some(slot) = self.current else {
            return;
        };
        if self.table.get(slot).map(|p| p.state) != Some(ProcessState::Running) {
            return;
        }
        let read_all = || -> Result<(i32, i32, i32, i32), MachineError> {
            Ok((
                self.mem.read(SAVE_PC)?,
                self.mem.read(SAVE_MODE)?,
                self.mem.read(SAVE_A)?,
                self.mem.read(SAVE_X)?,
            ))
        };
        match read_all() {
            Ok((pc, mode_raw, a, x)) => {
                let Some(mode) = CpuMode::from_raw(mode_raw) else {
                    log::error!("save area holds invalid cpu mode {mode_raw}");
                    self.internal_error = true;
                    return;
                };
                if let Some(proc) = self.table.get_mut(slot) {
                    proc.pc = pc;
                    proc.mode = mode;
                    proc.reg_a = a;
                    proc.reg_x = x;
                }
            }
            Err(err) => {
                log::error!("context save failed: {err}");
                self.internal_error = true;
            }
        }
    }

    /// Reset: seed the boot process from `init.maq`. It enters the table
    /// ready and the scheduling pass of this same entry dispatches it.
    fn on_reset(&mut self) {
        let entry = match self.load_program(INIT_IMAGE) {
            Ok(entry) => entry,
            Err(err) => {
                log::error!("cannot load the boot image: {err}");
                self.internal_error = true;
                return;
            }
        };
        match self.table.create(entry) {
            Some(slot) => {
                self.enqueue_ready(slot);
                let pid = self.table.get(slot).map_or(Pid::NONE, |p| p.pid);
                log::info!("boot process pid {pid} created at pc {entry}");
            }
            None => {
                log::error!("process table full at reset");
                self.internal_error = true;
            }
        }
    }

    /// CPU fault: the offending descriptor is finalized and the machine
    /// keeps running. A fault with nobody on the CPU cannot be attributed
    /// and is fatal.
    fn on_cpu_fault(&mut self) {
        let code = match self.mem.read(SAVE_ERROR) {
            Ok(code) => code,
            Err(err) => {
                log::error!("cannot read the cpu fault code: {err}");
                self.internal_error = true;
                return;
            }
        };
        match self.current {
            Some(slot) => {
                let pid = self.table.get(slot).map_or(Pid::NONE, |p| p.pid);
                log::error!("cpu fault {code} in pid {pid}, killing it");
                self.finish_slot(slot);
                self.current = None;
            }
            None => {
                log::error!("cpu fault {code} with no process on the cpu");
                self.internal_error = true;
            }
        }
    }

    /// Timer: acknowledge the device, rearm the countdown and burn one
    /// tick of the current quantum.
    fn on_timer(&mut self) {
        let rearm = self
            .bus
            .write(ports::TIMER_IRQ, 0)
            .and_then(|()| self.bus.write(ports::TIMER_COUNTDOWN, TIMER_INTERVAL));
        if let Err(err) = rearm {
            log::error!("cannot rearm the timer: {err}");
            self.internal_error = true;
        }
        self.quantum = self.quantum.saturating_sub(1);
    }

    fn on_unknown(&mut self, raw: i32) {
        log::error!("unhandled irq {raw}");
        self.internal_error = true;
    }

    /// Step four: walk the blocked descriptors and release every one whose
    /// condition now holds. Running this twice with no external change is
    /// a no-op the second time.
    fn service_blocked(&mut self) {
        for slot in 0..self.table.len() {
            let Some(ProcessState::Blocked(reason)) = self.table.get(slot).map(|p| p.state)
            else {
                continue;
            };
            let outcome = match reason {
                BlockReason::Writing => self.try_finish_write(slot),
                BlockReason::Reading => self.try_finish_read(slot),
                BlockReason::WaitingPid(pid) => {
                    self.try_finish_wait(slot, pid);
                    Ok(())
                }
            };
            if let Err(err) = outcome {
                log::error!("device access failed while unblocking: {err}");
                self.internal_error = true;
            }
        }
    }

    /// A writer wakes up when its screen accepts the datum still held in
    /// its saved X register.
    fn try_finish_write(&mut self, slot: usize) -> Result<(), MachineError> {
        let Some((term, datum)) = self.table.get(slot).map(|p| (p.out_term, p.reg_x)) else {
            return Ok(());
        };
        if self.bus.read(term.screen_ready())? == 0 {
            return Ok(());
        }
        self.bus.write(term.screen_data(), datum)?;
        if let Some(proc) = self.table.get_mut(slot) {
            proc.reg_a = 0;
        }
        self.wake(slot);
        Ok(())
    }

    /// A reader wakes up when its keyboard has a datum, which lands in its
    /// saved A register.
    fn try_finish_read(&mut self, slot: usize) -> Result<(), MachineError> {
        let Some(term) = self.table.get(slot).map(|p| p.in_term) else {
            return Ok(());
        };
        if self.bus.read(term.keyboard_ready())? == 0 {
            return Ok(());
        }
        let datum = self.bus.read(term.keyboard_data())?;
        if let Some(proc) = self.table.get_mut(slot) {
            proc.reg_a = datum;
        }
        self.wake(slot);
        Ok(())
    }

    /// A waiter wakes up once the awaited pid is finished.
    fn try_finish_wait(&mut self, slot: usize, awaited: Pid) {
        let finished = self
            .table
            .slot_of(awaited)
            .and_then(|t| self.table.get(t))
            .is_some_and(|p| p.state.is_finished());
        if !finished {
            return;
        }
        if let Some(proc) = self.table.get_mut(slot) {
            proc.reg_a = 0;
        }
        self.wake(slot);
        if let Some(proc) = self.table.get(slot) {
            log::info!("pid {} resumed, pid {awaited} finished", proc.pid);
        }
    }

    fn wake(&mut self, slot: usize) {
        if let Some(proc) = self.table.get(slot) {
            log::debug!("pid {} unblocked", proc.pid);
        }
        self.enqueue_ready(slot);
    }

    /// Step five: let the policy decide, then execute the decision. The
    /// chosen slot leaves the queue, becomes current and gets a fresh
    /// quantum; an idle decision parks the CPU until the next interrupt.
    fn schedule(&mut self) {
        self.log_table();
        let mut ctx = SchedCtx {
            table: &mut self.table,
            queue: &mut self.queue,
            current: self.current,
            quantum: self.quantum,
        };
        match self.policy.choose_next(&mut ctx) {
            Decision::Keep => {}
            Decision::Switch(slot) => {
                self.queue.remove(slot);
                if self.current != Some(slot) {
                    let pid = self.table.get(slot).map_or(Pid::NONE, |p| p.pid);
                    log::debug!("dispatching pid {pid}");
                }
                self.current = Some(slot);
                self.quantum = QUANTUM;
            }
            Decision::Idle => {
                if self.table.has_unfinished() {
                    log::debug!("nothing ready, idling until the next interrupt");
                }
                self.current = None;
                self.quantum = 0;
            }
        }
    }

    /// Step six: write the chosen descriptor's context into the save area
    /// and resume. With no descriptor chosen the machine idles in the
    /// trampoline; the timer keeps interrupting.
    fn dispatch(&mut self) -> Control {
        match self.current {
            Some(slot) => match self.restore(slot) {
                Ok(()) => Control::Resume,
                Err(err) => {
                    log::error!("context restore failed: {err}");
                    self.internal_error = true;
                    Control::Halt
                }
            },
            None => Control::Resume,
        }
    }

    fn restore(&mut self, slot: usize) -> Result<(), MachineError> {
        let Some((pc, mode, a, x)) = self
            .table
            .get(slot)
            .map(|p| (p.pc, p.mode, p.reg_a, p.reg_x))
        else {
            debug_assert!(false, "restore of a slot that was never created");
            return Ok(());
        };
        self.mem.write(SAVE_PC, pc)?;
        self.mem.write(SAVE_MODE, mode.as_raw())?;
        self.mem.write(SAVE_A, a)?;
        self.mem.write(SAVE_X, x)?;
        if let Some(proc) = self.table.get_mut(slot) {
            proc.transition(ProcessState::Running);
        }
        Ok(())
    }

    /// Orderly end of the machine: disarm the timer, derive the final
    /// numbers and write the report.
    fn shutdown(&mut self) {
        log::info!("no unfinished process remains, shutting down");
        let disarm_countdown = self.bus.write(ports::TIMER_COUNTDOWN, 0);
        let disarm_irq = self.bus.write(ports::TIMER_IRQ, 0);
        if disarm_countdown.is_err() || disarm_irq.is_err() {
            log::warn!("could not disarm the timer");
        }
        self.metrics.finalize(&self.table);
        match metrics::write_report(
            &self.metrics_path,
            self.policy.name(),
            &self.table,
            &self.metrics,
        ) {
            Ok(()) => log::info!("metrics written to {}", self.metrics_path.display()),
            Err(err) => log::error!("cannot write the metrics report: {err}"),
        }
        self.shut_down = true;
    }

    // ======================================================================
    // SHARED HELPERS
    // ======================================================================

    /// Put a descriptor in the ready state and queue it under its priority.
    pub(crate) fn enqueue_ready(&mut self, slot: usize) {
        if let Some(proc) = self.table.get_mut(slot) {
            proc.transition(ProcessState::Ready);
            let key = proc.priority;
            self.queue.push(slot, key);
        }
    }

    /// Block the current descriptor for the given reason and take it out
    /// of the ready queue.
    pub(crate) fn block_current(&mut self, slot: usize, reason: BlockReason) {
        self.queue.remove(slot);
        if let Some(proc) = self.table.get_mut(slot) {
            proc.transition(ProcessState::Blocked(reason));
            log::debug!("pid {} blocked: {reason}", proc.pid);
        }
    }

    /// Finalize a descriptor. It stays in the table for waiters and for
    /// the report, but never runs again.
    pub(crate) fn finish_slot(&mut self, slot: usize) {
        self.queue.remove(slot);
        if let Some(proc) = self.table.get_mut(slot) {
            proc.transition(ProcessState::Finished);
            log::info!("pid {} finished", proc.pid);
        }
    }

    /// Copy a program image into simulated memory and return its entry
    /// address.
    pub(crate) fn load_program(&mut self, name: &str) -> Result<i32, LoadFailure> {
        let program = self.loader.load(name)?;
        for (offset, &word) in program.words.iter().enumerate() {
            self.mem.write(program.load_address + offset, word)?;
        }
        log::info!(
            "loaded '{name}' at {}..{}",
            program.load_address,
            program.end_address()
        );
        Ok(program.load_address as i32)
    }

    fn log_table(&self) {
        if log::log_enabled!(log::Level::Trace) {
            for proc in self.table.iter() {
                log::trace!("{proc}");
            }
        }
    }

    // ======================================================================
    // INTROSPECTION
    // ======================================================================

    /// Descriptor for a pid, if it was ever created.
    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.table.slot_of(pid).and_then(|slot| self.table.get(slot))
    }

    /// Every descriptor ever created, in slot order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.table.iter()
    }

    /// Pid of the descriptor on the CPU.
    pub fn current_pid(&self) -> Option<Pid> {
        self.current
            .and_then(|slot| self.table.get(slot))
            .map(|p| p.pid)
    }

    /// Pids in the ready queue, front to back.
    pub fn ready_pids(&self) -> Vec<Pid> {
        self.queue
            .iter()
            .filter_map(|slot| self.table.get(slot))
            .map(|p| p.pid)
            .collect()
    }

    pub fn quantum_remaining(&self) -> u32 {
        self.quantum
    }

    pub fn metrics(&self) -> &KernelMetrics {
        &self.metrics
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Whether a fatal internal error was recorded.
    pub fn has_failed(&self) -> bool {
        self.internal_error
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}
