/*
 * Supervisor Calls
 *
 * The five services a process can request through the trap instruction:
 * read a character, write a character, spawn a program, kill a process and
 * wait for one to finish.
 *
 * The call id arrives in the saved A register, the argument (datum,
 * address or pid) in the saved X register, and the result goes back into
 * the caller's saved A register, which the dispatcher restores before the
 * process resumes. A call that cannot complete right away blocks the
 * caller; the unblock engine finishes it on a later entry.
 */

use thiserror::Error;

use crate::kernel::{Kernel, LoadFailure};
use crate::machine::MachineError;
use crate::process::{BlockReason, Pid};

/// Longest accepted image name, terminator included.
pub const NAME_MAX: usize = 100;

/// Identifier a process places in register A before trapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallId {
    Read = 1,
    Write = 2,
    Spawn = 3,
    Kill = 4,
    Wait = 5,
}

impl SyscallId {
    pub fn from_raw(raw: i32) -> Option<SyscallId> {
        match raw {
            1 => Some(SyscallId::Read),
            2 => Some(SyscallId::Write),
            3 => Some(SyscallId::Spawn),
            4 => Some(SyscallId::Kill),
            5 => Some(SyscallId::Wait),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SyscallId::Read => "read",
            SyscallId::Write => "write",
            SyscallId::Spawn => "spawn",
            SyscallId::Kill => "kill",
            SyscallId::Wait => "wait",
        }
    }
}

/// Rejection of the image name passed to spawn.
#[derive(Debug, Error)]
pub(crate) enum NameError {
    #[error("image name not terminated within {0} bytes")]
    Unterminated(usize),
    #[error("memory word {0} is not a character")]
    NotAByte(i32),
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Why a spawn request failed. All of these surface to the caller as -1.
#[derive(Debug, Error)]
pub(crate) enum SpawnError {
    #[error("bad image name: {0}")]
    Name(#[from] NameError),
    #[error("cannot load image: {0}")]
    Load(#[from] LoadFailure),
    #[error("process table is full")]
    TableFull,
    #[error("image name address {0} is negative")]
    BadAddress(i32),
}

impl Kernel {
    /// Decode and run the supervisor call the current process trapped
    /// with. An unknown id is fatal.
    pub(crate) fn on_syscall(&mut self) {
        let Some(slot) = self.current else {
            log::error!("supervisor call with no process on the cpu");
            self.internal_error = true;
            return;
        };
        let Some((pid, raw)) = self.table.get(slot).map(|p| (p.pid, p.reg_a)) else {
            log::error!("supervisor call from a slot that was never created");
            self.internal_error = true;
            return;
        };
        match SyscallId::from_raw(raw) {
            Some(id) => {
                log::debug!("pid {pid} supervisor call: {}", id.name());
                match id {
                    SyscallId::Read => self.sys_read(slot),
                    SyscallId::Write => self.sys_write(slot),
                    SyscallId::Spawn => self.sys_spawn(slot),
                    SyscallId::Kill => self.sys_kill(slot),
                    SyscallId::Wait => self.sys_wait(slot),
                }
            }
            None => {
                log::error!("pid {pid} made unknown supervisor call {raw}");
                self.internal_error = true;
            }
        }
    }

    /// Read one character from the caller's terminal. Blocks until the
    /// keyboard has a datum.
    fn sys_read(&mut self, slot: usize) {
        let Some(term) = self.table.get(slot).map(|p| p.in_term) else {
            return;
        };
        match self.bus.read(term.keyboard_ready()) {
            Ok(0) => self.block_current(slot, BlockReason::Reading),
            Ok(_) => match self.bus.read(term.keyboard_data()) {
                Ok(datum) => {
                    if let Some(proc) = self.table.get_mut(slot) {
                        proc.reg_a = datum;
                    }
                }
                Err(err) => self.device_failure(err),
            },
            Err(err) => self.device_failure(err),
        }
    }

    /// Write the saved X register to the caller's terminal. Blocks until
    /// the screen is ready; a completed write answers 0.
    fn sys_write(&mut self, slot: usize) {
        let Some((term, datum)) = self.table.get(slot).map(|p| (p.out_term, p.reg_x)) else {
            return;
        };
        match self.bus.read(term.screen_ready()) {
            Ok(0) => self.block_current(slot, BlockReason::Writing),
            Ok(_) => match self.bus.write(term.screen_data(), datum) {
                Ok(()) => {
                    if let Some(proc) = self.table.get_mut(slot) {
                        proc.reg_a = 0;
                    }
                }
                Err(err) => self.device_failure(err),
            },
            Err(err) => self.device_failure(err),
        }
    }

    /// Create a process from the image whose name the caller placed in
    /// memory at the address in X. Answers the new pid, or -1.
    fn sys_spawn(&mut self, slot: usize) {
        let Some(addr) = self.table.get(slot).map(|p| p.reg_x) else {
            return;
        };
        let answer = match self.spawn_process(addr) {
            Ok(pid) => pid.0,
            Err(err) => {
                log::warn!("spawn failed: {err}");
                -1
            }
        };
        if let Some(proc) = self.table.get_mut(slot) {
            proc.reg_a = answer;
        }
    }

    fn spawn_process(&mut self, addr: i32) -> Result<Pid, SpawnError> {
        if addr < 0 {
            return Err(SpawnError::BadAddress(addr));
        }
        let name = self.copy_string(addr as usize, NAME_MAX)?;
        let entry = self.load_program(&name)?;
        let new_slot = self.table.create(entry).ok_or(SpawnError::TableFull)?;
        self.enqueue_ready(new_slot);
        let pid = self.table.get(new_slot).map_or(Pid::NONE, |p| p.pid);
        log::info!("spawned '{name}' as pid {pid}");
        Ok(pid)
    }

    /// Finalize a process: the caller itself when X is 0, otherwise the
    /// process whose pid is in X. Killing a live foreign pid answers 0;
    /// an unknown or already finished target answers -1.
    fn sys_kill(&mut self, slot: usize) {
        let Some((caller, x)) = self.table.get(slot).map(|p| (p.pid, p.reg_x)) else {
            return;
        };
        if x == 0 {
            log::info!("pid {caller} exits");
            self.finish_slot(slot);
            self.current = None;
            return;
        }
        let target = Pid(x);
        match self.table.slot_of(target) {
            Some(t) if self.table.get(t).is_some_and(|p| !p.state.is_finished()) => {
                self.finish_slot(t);
                if self.current == Some(t) {
                    // The caller named its own pid.
                    self.current = None;
                } else if let Some(proc) = self.table.get_mut(slot) {
                    proc.reg_a = 0;
                }
            }
            _ => {
                log::warn!("pid {caller} tried to kill unknown pid {target}");
                if let Some(proc) = self.table.get_mut(slot) {
                    proc.reg_a = -1;
                }
            }
        }
    }

    /// Block the caller until the pid in X finishes. A pid that was never
    /// created, or the caller's own, answers -1 immediately.
    fn sys_wait(&mut self, slot: usize) {
        let Some((caller, x)) = self.table.get(slot).map(|p| (p.pid, p.reg_x)) else {
            return;
        };
        let target = Pid(x);
        if target == caller || self.table.slot_of(target).is_none() {
            log::warn!("pid {caller} cannot wait for pid {target}");
            if let Some(proc) = self.table.get_mut(slot) {
                proc.reg_a = -1;
            }
            return;
        }
        log::debug!("pid {caller} waits for pid {target}");
        self.block_current(slot, BlockReason::WaitingPid(target));
    }

    /// Pull a NUL-terminated image name out of simulated memory.
    pub(crate) fn copy_string(&self, addr: usize, max: usize) -> Result<String, NameError> {
        let mut name = String::new();
        for offset in 0..max {
            let word = self.mem.read(addr + offset)?;
            if word == 0 {
                return Ok(name);
            }
            if !(0..=255).contains(&word) {
                return Err(NameError::NotAByte(word));
            }
            name.push(word as u8 as char);
        }
        Err(NameError::Unterminated(max))
    }

    fn device_failure(&mut self, err: MachineError) {
        log::error!("device access failed during a supervisor call: {err}");
        self.internal_error = true;
    }
}
