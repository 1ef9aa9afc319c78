use std::fmt;

pub(crate) type RegisterType = u16;
pub(crate) type WordType = i64;

// The maximum number of source operands for an instruction.
pub(crate) const MAX_SOURCE_COUNT: usize = 2;

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum Opcode {
    ADD,
    SUB,
    MUL,
    DIV,
    LOAD,
}

pub(crate) fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::ADD => "ADD",
        Opcode::SUB => "SUB",
        Opcode::MUL => "MUL",
        Opcode::DIV => "DIV",
        Opcode::LOAD => "LOAD",
    }
}

pub(crate) fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.to_uppercase();
    let mnemonic_uppercased = string.as_str();

    match mnemonic_uppercased {
        "ADD" => Some(Opcode::ADD),
        "SUB" => Some(Opcode::SUB),
        "MUL" => Some(Opcode::MUL),
        "DIV" => Some(Opcode::DIV),
        "LOAD" => Some(Opcode::LOAD),
        _ => None,
    }
}

pub(crate) fn get_register(name: &str) -> Option<RegisterType> {
    let name_uppercased = name.trim().to_uppercase();
    let reg_name = name_uppercased.strip_prefix('R')?;
    reg_name.parse().ok()
}

/// A decoded instruction. Immutable once created; consumed exactly once by
/// the issue phase. `src2` is absent for the unary LOAD.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct Instr {
    pub(crate) opcode: Opcode,
    pub(crate) dest: RegisterType,
    pub(crate) src1: RegisterType,
    pub(crate) src2: Option<RegisterType>,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} R{}, R{}", mnemonic(self.opcode), self.dest, self.src1)?;
        if let Some(src2) = self.src2 {
            write!(f, ", R{}", src2)?;
        }
        Ok(())
    }
}

pub(crate) struct Program {
    pub(crate) code: Vec<Instr>,
}

// The InstrQueue sits between the decoded program and the engine's issue
// phase. The engine pulls from the head, at most one instruction per cycle.
pub(crate) struct InstrQueue {
    head: usize,
    instructions: Vec<Instr>,
}

impl InstrQueue {
    pub fn new() -> Self {
        InstrQueue {
            head: 0,
            instructions: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, instr: Instr) {
        self.instructions.push(instr);
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.instructions.len()
    }

    pub fn peek(&self) -> Instr {
        assert!(!self.is_empty(), "Can't peek when InstrQueue is empty.");
        self.instructions[self.head]
    }

    pub fn dequeue(&mut self) {
        assert!(!self.is_empty(), "Can't dequeue when InstrQueue is empty.");
        self.head += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = InstrQueue::new();
        assert!(queue.is_empty());

        let add = Instr { opcode: Opcode::ADD, dest: 1, src1: 2, src2: Some(3) };
        let load = Instr { opcode: Opcode::LOAD, dest: 6, src1: 0, src2: None };
        queue.enqueue(add);
        queue.enqueue(load);

        assert_eq!(queue.peek(), add);
        queue.dequeue();
        assert_eq!(queue.peek(), load);
        queue.dequeue();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_get_opcode_is_case_insensitive() {
        assert_eq!(get_opcode("mul"), Some(Opcode::MUL));
        assert_eq!(get_opcode("Load"), Some(Opcode::LOAD));
        assert_eq!(get_opcode("NOP"), None);
    }

    #[test]
    fn test_get_register() {
        assert_eq!(get_register("R7"), Some(7));
        assert_eq!(get_register("r10"), Some(10));
        assert_eq!(get_register("X1"), None);
        assert_eq!(get_register("R"), None);
    }
}
