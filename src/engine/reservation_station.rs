use std::fmt;
use std::fmt::Display;

use crate::instructions::instructions::{Opcode, RegisterType, WordType, MAX_SOURCE_COUNT};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PoolKind {
    Add,
    Mul,
}

impl PoolKind {
    // Issue routing: the short-latency additive class also takes the unary load.
    pub(crate) fn for_opcode(opcode: Opcode) -> PoolKind {
        match opcode {
            Opcode::ADD | Opcode::SUB | Opcode::LOAD => PoolKind::Add,
            Opcode::MUL | Opcode::DIV => PoolKind::Mul,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            PoolKind::Add => "Add",
            PoolKind::Mul => "Mul",
        }
    }
}

/// Identity of a reservation station: the owning pool plus the slot index.
/// Registers and pending operands refer to their producer by this tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Tag {
    pub(crate) pool: PoolKind,
    pub(crate) index: u16,
}

impl Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pool.prefix(), self.index + 1)
    }
}

/// One operand slot of a station: either a concrete value, or the tag of the
/// station that will produce it. Exactly one of the two is meaningful;
/// `Unused` fills the absent second slot of unary operations.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum Operand {
    Value(WordType),
    Pending(Tag),
    Unused,
}

impl Operand {
    pub(crate) fn value(&self) -> WordType {
        match self {
            Operand::Value(value) => *value,
            _ => panic!("Operand is not a Value but {:?}", self),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{}", value),
            Operand::Pending(tag) => write!(f, "{}", tag),
            Operand::Unused => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
}

// A single reservation station.
pub(crate) struct RS {
    pub(crate) state: RSState,
    pub(crate) opcode: Opcode,
    pub(crate) source: [Operand; MAX_SOURCE_COUNT],
    pub(crate) source_cnt: u8,
    pub(crate) source_ready_cnt: u8,
    pub(crate) dest: RegisterType,
    pub(crate) cycles_remaining: u8,
    pub(crate) issued_at: Option<u64>,
    pub(crate) exec_started_at: Option<u64>,
    pub(crate) exec_completed_at: Option<u64>,
}

impl RS {
    fn new() -> Self {
        Self {
            state: RSState::IDLE,
            opcode: Opcode::ADD,
            source: [Operand::Unused; MAX_SOURCE_COUNT],
            source_cnt: 0,
            source_ready_cnt: 0,
            dest: 0,
            cycles_remaining: 0,
            issued_at: None,
            exec_started_at: None,
            exec_completed_at: None,
        }
    }

    // The one transition back to the free state.
    fn reset(&mut self) {
        *self = RS::new();
    }
}

/// A fixed-capacity set of reservation stations for one functional-unit
/// class. Slots are addressed by index; the ascending scan order is
/// observable in tag assignment and in the report, so it is fixed.
pub(crate) struct RSPool {
    pub(crate) kind: PoolKind,
    pub(crate) capacity: u16,
    array: Vec<RS>,
}

impl RSPool {
    pub(crate) fn new(kind: PoolKind, capacity: u16) -> RSPool {
        let mut array = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            array.push(RS::new());
        }

        RSPool { kind, capacity, array }
    }

    pub(crate) fn tag(&self, index: u16) -> Tag {
        Tag { pool: self.kind, index }
    }

    pub(crate) fn get(&self, index: u16) -> &RS {
        &self.array[index as usize]
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> &mut RS {
        &mut self.array[index as usize]
    }

    // First free slot in ascending index order; None is a structural hazard,
    // the caller stalls and retries next cycle.
    pub(crate) fn find_free(&self) -> Option<u16> {
        (0..self.capacity).find(|&index| self.array[index as usize].state == RSState::IDLE)
    }

    pub(crate) fn allocate(&mut self,
                           index: u16,
                           opcode: Opcode,
                           dest: RegisterType,
                           source: [Operand; MAX_SOURCE_COUNT],
                           source_cnt: u8,
                           latency: u8,
                           cycle: u64) {
        let rs = &mut self.array[index as usize];
        debug_assert!(rs.state == RSState::IDLE, "allocating a busy station");

        rs.state = RSState::BUSY;
        rs.opcode = opcode;
        rs.source = source;
        rs.source_cnt = source_cnt;
        rs.source_ready_cnt = source.iter()
            .take(source_cnt as usize)
            .filter(|operand| matches!(operand, Operand::Value(_)))
            .count() as u8;
        rs.dest = dest;
        rs.cycles_remaining = latency;
        rs.issued_at = Some(cycle);
    }

    pub(crate) fn release(&mut self, index: u16) {
        self.array[index as usize].reset();
    }

    // Advances every busy slot whose operands are all ready. Readiness is
    // re-checked every cycle until the countdown starts; once started the
    // slot runs to completion.
    pub(crate) fn tick(&mut self, cycle: u64, started: &mut Vec<Tag>, completed: &mut Vec<Tag>) {
        for index in 0..self.capacity {
            let rs = &mut self.array[index as usize];
            if rs.state == RSState::IDLE
                || rs.cycles_remaining == 0
                || rs.source_ready_cnt != rs.source_cnt {
                continue;
            }

            if rs.exec_started_at.is_none() {
                rs.exec_started_at = Some(cycle);
                started.push(Tag { pool: self.kind, index });
            }

            rs.cycles_remaining -= 1;
            if rs.cycles_remaining == 0 {
                rs.exec_completed_at = Some(cycle);
                completed.push(Tag { pool: self.kind, index });
            }
        }
    }

    // Busy slots that finished executing and have not yet won the bus, in
    // ascending index order.
    pub(crate) fn collect_ready(&self, out: &mut Vec<Tag>) {
        for index in 0..self.capacity {
            let rs = &self.array[index as usize];
            if rs.state == RSState::BUSY && rs.cycles_remaining == 0 && rs.exec_completed_at.is_some() {
                out.push(Tag { pool: self.kind, index });
            }
        }
    }

    // A completed result reaches every waiting operand; this is how
    // dependent stations become ready.
    pub(crate) fn broadcast(&mut self, tag: Tag, value: WordType) {
        for rs in &mut self.array {
            if rs.state == RSState::IDLE {
                continue;
            }
            for source_index in 0..rs.source_cnt as usize {
                if rs.source[source_index] == Operand::Pending(tag) {
                    rs.source[source_index] = Operand::Value(value);
                    rs.source_ready_cnt += 1;
                }
            }
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.array.iter().all(|rs| rs.state == RSState::IDLE)
    }
}
