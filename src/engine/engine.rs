use std::fmt;

use thiserror::Error;

use crate::engine::register_file::RegFile;
use crate::engine::reservation_station::{Operand, PoolKind, RSPool, RSState, RS, Tag};
use crate::instructions::instructions::{mnemonic, Instr, InstrQueue, Opcode, RegisterType,
                                        WordType, MAX_SOURCE_COUNT};
use crate::simulator::{LatencyTable, PerfCounters, SimConfig};

// The bias the unary load adds to its operand, standing in for a memory access.
pub(crate) const LOAD_BIAS: WordType = 100;

#[derive(Error, Clone, Copy, PartialEq, Debug)]
pub(crate) enum ExecError {
    #[error("division by zero")]
    DivisionByZero,
}

// A result on its way over the bus; exists only during the writeback phase
// of a single cycle.
struct CDBBroadcast {
    tag: Tag,
    dest: RegisterType,
    value: WordType,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum CycleEvent {
    Issued { tag: Tag, instr: Instr },
    // structural hazard: no free station this cycle, the instruction retries
    Stalled { opcode: Opcode },
    ExecStarted { tag: Tag },
    ExecCompleted { tag: Tag },
    WroteBack { tag: Tag, dest: RegisterType, value: WordType },
    Faulted { tag: Tag, error: ExecError },
    // the producer this station waited on faulted and will never broadcast
    Cancelled { tag: Tag, waiting_on: Tag },
}

impl fmt::Display for CycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleEvent::Issued { tag, instr } => write!(f, "Issued [{}] to {}", instr, tag),
            CycleEvent::Stalled { opcode } => write!(f, "Stalled {} (no free station)", mnemonic(*opcode)),
            CycleEvent::ExecStarted { tag } => write!(f, "Execution started {}", tag),
            CycleEvent::ExecCompleted { tag } => write!(f, "Execution complete {}", tag),
            CycleEvent::WroteBack { tag, dest, value } => write!(f, "Write-back {}: R{} = {}", tag, dest, value),
            CycleEvent::Faulted { tag, error } => write!(f, "Faulted {}: {}", tag, error),
            CycleEvent::Cancelled { tag, waiting_on } => write!(f, "Cancelled {} (waiting on {})", tag, waiting_on),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct StationSnapshot {
    pub(crate) tag: Tag,
    pub(crate) busy: bool,
    pub(crate) opcode: Option<Opcode>,
    pub(crate) source: [Operand; MAX_SOURCE_COUNT],
    pub(crate) source_cnt: u8,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) cycles_remaining: u8,
    pub(crate) issued_at: Option<u64>,
    pub(crate) exec_started_at: Option<u64>,
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct RegisterSnapshot {
    pub(crate) reg: RegisterType,
    pub(crate) value: WordType,
    pub(crate) producer: Option<Tag>,
}

/// Per-cycle state export for the reporting side. The engine knows nothing
/// about formatting beyond the Display impls on these types.
#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Snapshot {
    pub(crate) cycle: u64,
    pub(crate) events: Vec<CycleEvent>,
    pub(crate) stations: Vec<StationSnapshot>,
    pub(crate) registers: Vec<RegisterSnapshot>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reservation stations:")?;
        for station in &self.stations {
            if let (true, Some(opcode), Some(dest)) = (station.busy, station.opcode, station.dest) {
                write!(f, "  {}: {} R{}", station.tag, mnemonic(opcode), dest)?;
                for k in 0..station.source_cnt as usize {
                    write!(f, " {}", station.source[k])?;
                }
                writeln!(f, " rem={}", station.cycles_remaining)?;
            } else {
                writeln!(f, "  {}: free", station.tag)?;
            }
        }
        write!(f, "Registers:")?;
        for register in &self.registers {
            match register.producer {
                Some(tag) => write!(f, " R{}={}({})", register.reg, register.value, tag)?,
                None => write!(f, " R{}={}", register.reg, register.value)?,
            }
        }
        Ok(())
    }
}

/// The scheduling core: both station pools, the register status table and
/// the bus, advanced one cycle at a time in a fixed phase order.
pub(crate) struct Engine {
    // additive pool first: the arbiter's priority order is the array order
    pools: [RSPool; 2],
    reg_file: RegFile,
    latencies: LatencyTable,
    cdb_width: u8,
    cycle: u64,
    cdb_broadcast_buffer: Vec<CDBBroadcast>,
}

impl Engine {
    pub(crate) fn new(config: &SimConfig) -> Engine {
        let mut reg_file = RegFile::new(config.reg_count);
        if let Some(values) = &config.initial_regs {
            for (reg, value) in values.iter().enumerate().take(config.reg_count as usize) {
                reg_file.set_value(reg as RegisterType, *value);
            }
        }

        Engine {
            pools: [RSPool::new(PoolKind::Add, config.add_rs_count),
                    RSPool::new(PoolKind::Mul, config.mul_rs_count)],
            reg_file,
            latencies: config.latencies.clone(),
            cdb_width: config.cdb_width,
            cycle: 0,
            cdb_broadcast_buffer: Vec::with_capacity(config.cdb_width as usize),
        }
    }

    pub(crate) fn reg_value(&self, reg: RegisterType) -> WordType {
        self.reg_file.get_value(reg)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pools.iter().all(|pool| pool.is_idle())
    }

    // One simulation cycle. The phase order is fixed and load-bearing:
    // writeback drains results produced in earlier cycles before execute
    // advances anything and before issue reads the register status table.
    pub(crate) fn do_cycle(&mut self, instr_queue: &mut InstrQueue, perf_counters: &mut PerfCounters) -> Vec<CycleEvent> {
        self.cycle += 1;
        perf_counters.cycle_cnt += 1;

        let mut events = Vec::new();
        self.cycle_writeback(&mut events, perf_counters);
        self.cycle_execute(&mut events, perf_counters);
        self.cycle_issue(instr_queue, &mut events, perf_counters);
        events
    }

    fn cycle_writeback(&mut self, events: &mut Vec<CycleEvent>, perf_counters: &mut PerfCounters) {
        debug_assert!(self.cdb_broadcast_buffer.is_empty());

        // Candidates in arbitration order: additive pool before
        // multiplicative pool, ascending slot index within a pool. Losers
        // keep their result and compete again next cycle.
        let mut candidates = Vec::new();
        for pool in &self.pools {
            pool.collect_ready(&mut candidates);
        }
        candidates.truncate(self.cdb_width as usize);

        for tag in candidates {
            let rs = self.pools[tag.pool as usize].get_mut(tag.index);
            debug_assert!(rs.state == RSState::BUSY && rs.cycles_remaining == 0);

            match compute(rs) {
                Ok(value) => {
                    let dest = rs.dest;
                    self.pools[tag.pool as usize].release(tag.index);
                    self.cdb_broadcast_buffer.push(CDBBroadcast { tag, dest, value });
                    events.push(CycleEvent::WroteBack { tag, dest, value });
                    perf_counters.writeback_cnt += 1;
                }
                Err(error) => {
                    // the station still frees its slot and its bus turn, but
                    // nothing reaches the register file
                    let dest = rs.dest;
                    self.pools[tag.pool as usize].release(tag.index);
                    self.reg_file.clear_producer(dest, tag);
                    events.push(CycleEvent::Faulted { tag, error });
                    self.cancel_waiters(tag, events);
                }
            }
        }

        // Propagation: the register file first, then every waiting station.
        for req in &self.cdb_broadcast_buffer {
            self.reg_file.resolve(req.dest, req.tag, req.value);
            for pool in &mut self.pools {
                pool.broadcast(req.tag, req.value);
            }
        }
        self.cdb_broadcast_buffer.clear();
    }

    // A faulted producer will never broadcast. Anything renamed to it would
    // wait forever, so the rename is undone and its waiters are drained too,
    // cascading through their own dependents.
    fn cancel_waiters(&mut self, dead: Tag, events: &mut Vec<CycleEvent>) {
        let mut dead_tags = vec![dead];
        while let Some(dead) = dead_tags.pop() {
            for pool_index in 0..self.pools.len() {
                for index in 0..self.pools[pool_index].capacity {
                    let rs = self.pools[pool_index].get(index);
                    if rs.state == RSState::IDLE {
                        continue;
                    }
                    let waiting = (0..rs.source_cnt as usize)
                        .any(|k| rs.source[k] == Operand::Pending(dead));
                    if !waiting {
                        continue;
                    }

                    let tag = self.pools[pool_index].tag(index);
                    let dest = rs.dest;
                    self.pools[pool_index].release(index);
                    self.reg_file.clear_producer(dest, tag);
                    events.push(CycleEvent::Cancelled { tag, waiting_on: dead });
                    dead_tags.push(tag);
                }
            }
        }
    }

    fn cycle_execute(&mut self, events: &mut Vec<CycleEvent>, perf_counters: &mut PerfCounters) {
        let cycle = self.cycle;
        let mut started = Vec::new();
        let mut completed = Vec::new();
        for pool in &mut self.pools {
            pool.tick(cycle, &mut started, &mut completed);
        }

        for tag in started {
            events.push(CycleEvent::ExecStarted { tag });
        }
        for tag in completed {
            events.push(CycleEvent::ExecCompleted { tag });
            perf_counters.execute_cnt += 1;
        }
    }

    fn cycle_issue(&mut self, instr_queue: &mut InstrQueue, events: &mut Vec<CycleEvent>, perf_counters: &mut PerfCounters) {
        if instr_queue.is_empty() {
            return;
        }

        let instr = instr_queue.peek();
        let kind = PoolKind::for_opcode(instr.opcode);
        let index = match self.pools[kind as usize].find_free() {
            Some(index) => index,
            None => {
                // the instruction stays queued; nothing is renamed on a
                // stalled attempt
                events.push(CycleEvent::Stalled { opcode: instr.opcode });
                perf_counters.stall_cnt += 1;
                return;
            }
        };
        instr_queue.dequeue();

        // Source snapshot before the destination rename, so an instruction
        // reading its own destination sees the previous producer.
        let mut source = [Operand::Unused; MAX_SOURCE_COUNT];
        let mut source_cnt = 1u8;
        source[0] = self.reg_file.operand(instr.src1);
        if let Some(src2) = instr.src2 {
            source[1] = self.reg_file.operand(src2);
            source_cnt = 2;
        }

        let latency = self.latencies.for_opcode(instr.opcode);
        let tag = self.pools[kind as usize].tag(index);
        self.pools[kind as usize].allocate(index, instr.opcode, instr.dest, source, source_cnt, latency, self.cycle);
        self.reg_file.bind_producer(instr.dest, tag);

        events.push(CycleEvent::Issued { tag, instr });
        perf_counters.issue_cnt += 1;
    }

    pub(crate) fn snapshot(&self, events: Vec<CycleEvent>) -> Snapshot {
        let mut stations = Vec::new();
        for pool in &self.pools {
            for index in 0..pool.capacity {
                let rs = pool.get(index);
                let busy = rs.state == RSState::BUSY;
                stations.push(StationSnapshot {
                    tag: pool.tag(index),
                    busy,
                    opcode: if busy { Some(rs.opcode) } else { None },
                    source: rs.source,
                    source_cnt: rs.source_cnt,
                    dest: if busy { Some(rs.dest) } else { None },
                    cycles_remaining: rs.cycles_remaining,
                    issued_at: rs.issued_at,
                    exec_started_at: rs.exec_started_at,
                });
            }
        }

        let registers = (0..self.reg_file.reg_count())
            .map(|reg| RegisterSnapshot {
                reg,
                value: self.reg_file.get_value(reg),
                producer: self.reg_file.producer(reg),
            })
            .collect();

        Snapshot { cycle: self.cycle, events, stations, registers }
    }
}

fn compute(rs: &RS) -> Result<WordType, ExecError> {
    let v1 = rs.source[0].value();
    match rs.opcode {
        Opcode::ADD => Ok(v1 + rs.source[1].value()),
        Opcode::SUB => Ok(v1 - rs.source[1].value()),
        Opcode::MUL => Ok(v1 * rs.source[1].value()),
        Opcode::DIV => {
            let divisor = rs.source[1].value();
            if divisor == 0 {
                return Err(ExecError::DivisionByZero);
            }
            Ok(v1 / divisor)
        }
        Opcode::LOAD => Ok(v1 + LOAD_BIAS),
    }
}
