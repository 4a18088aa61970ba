/*
 * Process Descriptors
 *
 * This module defines the descriptor the kernel keeps for every process:
 * identity, saved execution context, scheduling state and the per-process
 * metric counters, plus the fixed-capacity table that owns all descriptors.
 *
 * The table is the only owner. Everything else (the ready queue, the
 * current-process handle, the policies) refers to descriptors by slot
 * index, so there are no aliasing cycles between the queue and the table.
 */

use core::fmt;

use crate::MAX_PROCS;
use crate::machine::ports::TerminalId;

/// Priority given to every new descriptor. Lower is better under the
/// priority policy.
pub const DEFAULT_PRIORITY: f64 = 0.5;

/// Process identity, unique for the lifetime of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// Marker for "no process".
    pub const NONE: Pid = Pid(-1);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CPU privilege mode, as stored in the trampoline save area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    Kernel,
    User,
}

impl CpuMode {
    pub fn from_raw(raw: i32) -> Option<CpuMode> {
        match raw {
            0 => Some(CpuMode::Kernel),
            1 => Some(CpuMode::User),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            CpuMode::Kernel => 0,
            CpuMode::User => 1,
        }
    }
}

/// Why a blocked descriptor is blocked, together with the data that
/// condition needs. The awaited pid exists only in the variant that uses
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Output device was busy; the pending datum stays in register X.
    Writing,
    /// Input device had nothing to deliver.
    Reading,
    /// Waiting for the named process to finish.
    WaitingPid(Pid),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Writing => write!(f, "writing"),
            BlockReason::Reading => write!(f, "reading"),
            BlockReason::WaitingPid(pid) => write!(f, "waiting pid {pid}"),
        }
    }
}

/// Scheduling state of a descriptor.
///
/// There is no "empty" state: a slot that was never created simply does not
/// exist in the table. Finished descriptors stay in the table so waiters
/// can observe them and the final report can include them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Blocked(BlockReason),
    Finished,
}

impl ProcessState {
    pub fn is_blocked(self) -> bool {
        matches!(self, ProcessState::Blocked(_))
    }

    pub fn is_finished(self) -> bool {
        self == ProcessState::Finished
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Blocked(_) => "blocked",
            ProcessState::Finished => "finished",
        }
    }
}

/// Per-process counters, accrued on every kernel entry and summarized in
/// the shutdown report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMetrics {
    pub entries_ready: u32,
    pub entries_running: u32,
    pub entries_blocked: u32,
    pub time_ready: u64,
    pub time_running: u64,
    pub time_blocked: u64,
    pub preemptions: u32,
}

impl ProcMetrics {
    /// Total observable lifetime: ready plus running plus blocked.
    pub fn turnaround(&self) -> u64 {
        self.time_ready + self.time_running + self.time_blocked
    }

    /// Mean ready-to-run latency.
    pub fn mean_response(&self) -> f64 {
        if self.entries_ready == 0 {
            0.0
        } else {
            self.time_ready as f64 / self.entries_ready as f64
        }
    }
}

/// Kernel record for one process.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    /// Saved program counter.
    pub pc: i32,
    pub reg_a: i32,
    pub reg_x: i32,
    pub mode: CpuMode,
    pub state: ProcessState,
    pub in_term: TerminalId,
    pub out_term: TerminalId,
    pub priority: f64,
    pub metrics: ProcMetrics,
}

impl Process {
    /// Build a fresh descriptor at its entry point. New processes start in
    /// user mode, ready to run, with their terminals derived from the pid.
    fn new(pid: Pid, pc: i32) -> Self {
        let term = TerminalId::for_pid(pid.0);
        Process {
            pid,
            pc,
            reg_a: 0,
            reg_x: 0,
            mode: CpuMode::User,
            state: ProcessState::Ready,
            in_term: term,
            out_term: term,
            priority: DEFAULT_PRIORITY,
            metrics: ProcMetrics {
                entries_ready: 1,
                ..ProcMetrics::default()
            },
        }
    }

    /// Move to a new scheduling state, counting the entry in the metric
    /// block. A finished descriptor never transitions again.
    pub fn transition(&mut self, to: ProcessState) {
        debug_assert!(
            !self.state.is_finished(),
            "finished descriptor pid {} must not change state",
            self.pid
        );
        if self.state == to {
            return;
        }
        match to {
            ProcessState::Ready => self.metrics.entries_ready += 1,
            ProcessState::Running => self.metrics.entries_running += 1,
            ProcessState::Blocked(_) => self.metrics.entries_blocked += 1,
            ProcessState::Finished => {}
        }
        self.state = to;
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid {} pc {} a {} x {} {} prio {:.2}",
            self.pid,
            self.pc,
            self.reg_a,
            self.reg_x,
            self.state.name(),
            self.priority
        )
    }
}

/// Fixed-capacity table owning every descriptor, plus the monotonic pid
/// counter. Slots are never reused; a full table fails `create`.
#[derive(Debug)]
pub struct ProcessTable {
    procs: heapless::Vec<Process, MAX_PROCS>,
    next_pid: i32,
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable {
            procs: heapless::Vec::new(),
            next_pid: 0,
        }
    }

    /// Create a descriptor for a program loaded at `pc`. Returns the slot,
    /// or `None` when the table is full.
    pub fn create(&mut self, pc: i32) -> Option<usize> {
        let pid = Pid(self.next_pid);
        let proc = Process::new(pid, pc);
        match self.procs.push(proc) {
            Ok(()) => {
                self.next_pid += 1;
                Some(self.procs.len() - 1)
            }
            Err(_) => None,
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Process> {
        self.procs.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Process> {
        self.procs.get_mut(slot)
    }

    /// Slot holding the given pid, if it was ever created.
    pub fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.procs.iter().position(|p| p.pid == pid)
    }

    /// Number of processes ever created.
    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.procs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.procs.iter_mut()
    }

    /// True while any descriptor still has work to do or to wait for.
    pub fn has_unfinished(&self) -> bool {
        self.procs.iter().any(|p| !p.state.is_finished())
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
