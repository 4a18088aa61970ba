/*
 * Scripted machine for the scenario suite.
 *
 * Implements the kernel's machine traits over one shared state cell: a
 * word memory, four terminals whose keyboards and screens the tests script
 * between kernel entries, the instruction clock the tests advance by hand,
 * and a map of loadable program images.
 *
 * `Sim` wraps a kernel over that machine and re-checks the structural
 * invariants after every entry: at most one running descriptor, queue
 * membership exactly for ready descriptors, bucket sums matching the
 * collector, pid uniqueness, and finished descriptors staying finished.
 */

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

use maqos::machine::ports::{self, Port, TERMINAL_COUNT};
use maqos::machine::{
    Control, DeviceBus, ImageLoader, LoadError, MachineError, Memory, Program, SAVE_A, SAVE_X,
    TRAMPOLINE_ADDR,
};
use maqos::process::ProcessState;
use maqos::syscall::SyscallId;
use maqos::{Irq, Kernel, KernelConfig, Pid, SchedulerKind, TIMER_INTERVAL};

const MEM_SIZE: usize = 4096;

/// Load address handed to `init.maq` in every scenario.
pub const INIT_PC: usize = 100;

#[derive(Default)]
struct Terminal {
    keyboard_data: i32,
    keyboard_ready: i32,
    screen_ready: i32,
}

struct SimState {
    mem: Vec<i32>,
    terminals: [Terminal; TERMINAL_COUNT as usize],
    screen_output: Vec<(u8, i32)>,
    timer_countdown: i32,
    timer_irq: i32,
    clock: i32,
    images: HashMap<String, Program>,
}

impl SimState {
    fn new() -> Self {
        let mut terminals: [Terminal; TERMINAL_COUNT as usize] = Default::default();
        for term in &mut terminals {
            term.screen_ready = 1;
        }
        SimState {
            mem: vec![0; MEM_SIZE],
            terminals,
            screen_output: Vec::new(),
            timer_countdown: 0,
            timer_irq: 0,
            clock: 0,
            images: HashMap::new(),
        }
    }
}

#[derive(Clone)]
struct Shared(Rc<RefCell<SimState>>);

struct SimMemory(Shared);

impl Memory for SimMemory {
    fn read(&self, addr: usize) -> Result<i32, MachineError> {
        self.0
            .0
            .borrow()
            .mem
            .get(addr)
            .copied()
            .ok_or(MachineError::BadAddress(addr))
    }

    fn write(&mut self, addr: usize, value: i32) -> Result<(), MachineError> {
        match self.0.0.borrow_mut().mem.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(MachineError::BadAddress(addr)),
        }
    }
}

struct SimBus(Shared);

impl DeviceBus for SimBus {
    fn read(&mut self, port: Port) -> Result<i32, MachineError> {
        let mut state = self.0.0.borrow_mut();
        if port == ports::CLOCK {
            return Ok(state.clock);
        }
        if port == ports::TIMER_COUNTDOWN {
            return Ok(state.timer_countdown);
        }
        if port == ports::TIMER_IRQ {
            return Ok(state.timer_irq);
        }
        let term_index = port.0 / 4;
        let term = state
            .terminals
            .get_mut(term_index)
            .ok_or(MachineError::BadPort(port.0))?;
        match port.0 % 4 {
            // Reading the keyboard consumes the pending datum.
            0 => {
                let datum = term.keyboard_data;
                term.keyboard_ready = 0;
                Ok(datum)
            }
            1 => Ok(term.keyboard_ready),
            2 => Ok(0),
            3 => Ok(term.screen_ready),
            _ => unreachable!(),
        }
    }

    fn write(&mut self, port: Port, value: i32) -> Result<(), MachineError> {
        let mut state = self.0.0.borrow_mut();
        if port == ports::TIMER_COUNTDOWN {
            state.timer_countdown = value;
            return Ok(());
        }
        if port == ports::TIMER_IRQ {
            state.timer_irq = value;
            return Ok(());
        }
        let term_index = port.0 / 4;
        if term_index >= state.terminals.len() {
            return Err(MachineError::BadPort(port.0));
        }
        match port.0 % 4 {
            2 => {
                state.screen_output.push((term_index as u8, value));
                Ok(())
            }
            _ => Err(MachineError::DeviceFault(port.0)),
        }
    }
}

struct SimLoader(Shared);

impl ImageLoader for SimLoader {
    fn load(&self, name: &str) -> Result<Program, LoadError> {
        self.0
            .0
            .borrow()
            .images
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

/// A booted-or-bootable kernel over the scripted machine.
pub struct Sim {
    state: Shared,
    pub kernel: Kernel,
    finished: HashSet<i32>,
    metrics_path: PathBuf,
    _tmpdir: tempfile::TempDir,
}

impl Sim {
    /// Build a kernel with the trampoline and `init.maq` registered, plus
    /// any extra images as `(name, load_address)`.
    pub fn new(kind: SchedulerKind, extra_images: &[(&str, usize)]) -> Sim {
        let _ = env_logger::builder().is_test(true).try_init();

        let state = Shared(Rc::new(RefCell::new(SimState::new())));
        {
            let mut inner = state.0.borrow_mut();
            inner.images.insert(
                maqos::TRAMPOLINE_IMAGE.to_string(),
                Program {
                    load_address: TRAMPOLINE_ADDR,
                    words: vec![0; 8],
                },
            );
            inner.images.insert(
                maqos::INIT_IMAGE.to_string(),
                Program {
                    load_address: INIT_PC,
                    words: vec![0; 16],
                },
            );
            for &(name, addr) in extra_images {
                inner.images.insert(
                    name.to_string(),
                    Program {
                        load_address: addr,
                        words: vec![0; 16],
                    },
                );
            }
        }

        let tmpdir = tempfile::tempdir().expect("tempdir");
        let metrics_path = tmpdir.path().join(maqos::METRICS_REPORT);
        let kernel = Kernel::new(
            Box::new(SimMemory(state.clone())),
            Box::new(SimBus(state.clone())),
            Box::new(SimLoader(state.clone())),
            KernelConfig {
                scheduler: kind,
                metrics_path: metrics_path.clone(),
            },
        );
        Sim {
            state,
            kernel,
            finished: HashSet::new(),
            metrics_path,
            _tmpdir: tmpdir,
        }
    }

    /// Boot a fresh machine: power-on reset.
    pub fn boot(kind: SchedulerKind, extra_images: &[(&str, usize)]) -> Sim {
        let mut sim = Sim::new(kind, extra_images);
        assert_eq!(sim.interrupt(Irq::Reset), Control::Resume);
        sim
    }

    /// Deliver an interrupt and re-check the structural invariants.
    pub fn interrupt(&mut self, irq: Irq) -> Control {
        let control = self.kernel.interrupt(irq as i32);
        if !self.kernel.has_failed() {
            self.assert_invariants();
        }
        control
    }

    /// One timer interrupt, a full interval of simulated instructions
    /// later.
    pub fn tick(&mut self) -> Control {
        self.advance_clock(TIMER_INTERVAL);
        self.state.0.borrow_mut().timer_irq = 1;
        self.interrupt(Irq::Timer)
    }

    /// Trap into the kernel the way a running process would: call id in
    /// register A, argument in register X. A few instructions pass on the
    /// clock before the trap.
    pub fn syscall(&mut self, id: SyscallId, x: i32) -> Control {
        self.advance_clock(10);
        {
            let mut state = self.state.0.borrow_mut();
            state.mem[SAVE_A] = id as i32;
            state.mem[SAVE_X] = x;
        }
        self.interrupt(Irq::Syscall)
    }

    pub fn advance_clock(&mut self, delta: i32) {
        self.state.0.borrow_mut().clock += delta;
    }

    /// Write one word of simulated memory.
    pub fn poke_word(&mut self, addr: usize, value: i32) {
        self.state.0.borrow_mut().mem[addr] = value;
    }

    /// Place a NUL-terminated image name in simulated memory.
    pub fn poke_str(&mut self, addr: usize, text: &str) {
        let mut state = self.state.0.borrow_mut();
        for (i, b) in text.bytes().enumerate() {
            state.mem[addr + i] = b as i32;
        }
        state.mem[addr + text.len()] = 0;
    }

    /// Script a keystroke: the terminal's keyboard turns ready with this
    /// datum.
    pub fn press_key(&mut self, term: u8, datum: i32) {
        let mut state = self.state.0.borrow_mut();
        state.terminals[term as usize].keyboard_data = datum;
        state.terminals[term as usize].keyboard_ready = 1;
    }

    pub fn set_screen_busy(&mut self, term: u8, busy: bool) {
        self.state.0.borrow_mut().terminals[term as usize].screen_ready =
            if busy { 0 } else { 1 };
    }

    /// Every datum written to any screen, in order.
    pub fn screen_output(&self) -> Vec<(u8, i32)> {
        self.state.0.borrow().screen_output.clone()
    }

    pub fn timer_armed(&self) -> bool {
        self.state.0.borrow().timer_countdown != 0
    }

    pub fn metrics_text(&self) -> String {
        std::fs::read_to_string(&self.metrics_path).expect("metrics report")
    }

    pub fn state_of(&self, pid: i32) -> Option<ProcessState> {
        self.kernel.process(Pid(pid)).map(|p| p.state)
    }

    pub fn reg_a_of(&self, pid: i32) -> i32 {
        self.kernel.process(Pid(pid)).expect("process").reg_a
    }

    fn assert_invariants(&mut self) {
        let kernel = &self.kernel;

        // At most one descriptor runs, and it is the current one.
        let running: Vec<Pid> = kernel
            .processes()
            .filter(|p| p.state == ProcessState::Running)
            .map(|p| p.pid)
            .collect();
        assert!(running.len() <= 1, "more than one running: {running:?}");
        if let Some(&pid) = running.first() {
            assert_eq!(kernel.current_pid(), Some(pid));
        }

        // In the ready queue iff ready.
        let queued = kernel.ready_pids();
        for proc in kernel.processes() {
            assert_eq!(
                queued.contains(&proc.pid),
                proc.state == ProcessState::Ready,
                "pid {} is {} but queue holds {queued:?}",
                proc.pid,
                proc.state.name()
            );
        }

        // Time buckets add up to what the collector accrued.
        let bucket_sum: u64 = kernel.processes().map(|p| p.metrics.turnaround()).sum();
        assert_eq!(bucket_sum, kernel.metrics().accumulated_ticks);

        // Pids are unique.
        let mut pids: Vec<i32> = kernel.processes().map(|p| p.pid.0).collect();
        pids.sort_unstable();
        let before = pids.len();
        pids.dedup();
        assert_eq!(before, pids.len(), "duplicate pid");

        // Finished descriptors stay finished.
        for pid in &self.finished {
            assert_eq!(
                self.state_of(*pid),
                Some(ProcessState::Finished),
                "pid {pid} left the finished state"
            );
        }
        let newly_finished: Vec<i32> = kernel
            .processes()
            .filter(|p| p.state.is_finished())
            .map(|p| p.pid.0)
            .collect();
        self.finished.extend(newly_finished);
    }
}
