use std::error::Error;
use std::fs::File;

use serde::Deserialize;

use crate::engine::engine::{CycleEvent, Engine, Snapshot};
use crate::instructions::instructions::{InstrQueue, Opcode, Program, RegisterType, WordType};

pub(crate) struct PerfCounters {
    pub cycle_cnt: u64,
    pub issue_cnt: u64,
    pub stall_cnt: u64,
    pub execute_cnt: u64,
    pub writeback_cnt: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self { cycle_cnt: 0, issue_cnt: 0, stall_cnt: 0, execute_cnt: 0, writeback_cnt: 0 }
    }
}

#[derive(Clone, Default, Deserialize, Debug)]
pub(crate) struct Trace {
    pub issue: bool,
    pub execute: bool,
    pub writeback: bool,
    pub cycle: bool,
    pub status: bool,
}

// Execution latency, in cycles, per operation kind.
#[derive(Clone, Deserialize, Debug)]
pub(crate) struct LatencyTable {
    pub add: u8,
    pub sub: u8,
    pub mul: u8,
    pub div: u8,
    pub load: u8,
}

impl LatencyTable {
    pub(crate) fn for_opcode(&self, opcode: Opcode) -> u8 {
        match opcode {
            Opcode::ADD => self.add,
            Opcode::SUB => self.sub,
            Opcode::MUL => self.mul,
            Opcode::DIV => self.div,
            Opcode::LOAD => self.load,
        }
    }
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self { add: 2, sub: 2, mul: 10, div: 40, load: 1 }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub(crate) struct SimConfig {
    // the number of reservation stations in the additive pool
    pub(crate) add_rs_count: u16,
    // the number of reservation stations in the multiplicative pool
    pub(crate) mul_rs_count: u16,
    // the number of results the bus can carry per cycle
    pub(crate) cdb_width: u8,
    // the number of architectural registers
    pub(crate) reg_count: u16,
    pub(crate) latencies: LatencyTable,
    // explicit initial register values; register i holds i + 1 when absent
    pub(crate) initial_regs: Option<Vec<WordType>>,
    // if processing of the simulation should be traced (printed)
    #[serde(default)]
    pub(crate) trace: Trace,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            add_rs_count: 3,
            mul_rs_count: 2,
            cdb_width: 1,
            reg_count: 11,
            latencies: LatencyTable::default(),
            initial_regs: None,
            trace: Trace::default(),
        }
    }
}

pub(crate) fn load_sim_config(file_path: &str) -> Result<SimConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config: SimConfig = serde_yaml::from_reader(file)?;

    let latencies = &config.latencies;
    for (name, cycles) in [("add", latencies.add), ("sub", latencies.sub), ("mul", latencies.mul),
                           ("div", latencies.div), ("load", latencies.load)] {
        if cycles == 0 {
            return Err(format!("latency '{}' must be at least 1 cycle", name).into());
        }
    }
    if config.cdb_width == 0 {
        return Err("cdb_width must be at least 1".into());
    }

    Ok(config)
}

/// The cycle scheduler: owns the whole simulation state (engine plus the
/// pending instruction stream) and drives it one cycle at a time until the
/// stream is drained and every station is idle.
pub(crate) struct Simulator {
    engine: Engine,
    instr_queue: InstrQueue,
    trace: Trace,
    perf_counters: PerfCounters,
}

impl Simulator {
    pub(crate) fn new(config: &SimConfig) -> Simulator {
        Simulator {
            engine: Engine::new(config),
            instr_queue: InstrQueue::new(),
            trace: config.trace.clone(),
            perf_counters: PerfCounters::new(),
        }
    }

    pub(crate) fn init(&mut self, program: &Program) {
        for instr in &program.code {
            self.instr_queue.enqueue(*instr);
        }
    }

    // Runs one cycle; None once the queue is drained and every station is
    // idle (a completed result that has not won the bus keeps its station
    // busy, so pending writebacks hold off termination).
    pub(crate) fn step(&mut self) -> Option<Snapshot> {
        if self.instr_queue.is_empty() && self.engine.is_idle() {
            return None;
        }

        let events = self.engine.do_cycle(&mut self.instr_queue, &mut self.perf_counters);
        Some(self.engine.snapshot(events))
    }

    pub(crate) fn run(&mut self) {
        while let Some(snapshot) = self.step() {
            self.report(&snapshot);
        }
    }

    fn report(&self, snapshot: &Snapshot) {
        if self.trace.cycle {
            println!("Cycle {}", snapshot.cycle);
        }
        for event in &snapshot.events {
            let show = match event {
                CycleEvent::Issued { .. } | CycleEvent::Stalled { .. } => self.trace.issue,
                CycleEvent::ExecStarted { .. } | CycleEvent::ExecCompleted { .. } => self.trace.execute,
                CycleEvent::WroteBack { .. } | CycleEvent::Faulted { .. } | CycleEvent::Cancelled { .. } => self.trace.writeback,
            };
            if show {
                println!("  {}", event);
            }
        }
        if self.trace.status {
            println!("{}", snapshot);
        }
    }

    pub(crate) fn reg_value(&self, reg: RegisterType) -> WordType {
        self.engine.reg_value(reg)
    }

    pub(crate) fn perf_counters(&self) -> &PerfCounters {
        &self.perf_counters
    }
}
