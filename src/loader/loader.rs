use std::fs;

use log::warn;
use regex::Regex;
use thiserror::Error;

use crate::instructions::instructions::{get_opcode, get_register, Instr, Opcode, Program, RegisterType};
use crate::simulator::SimConfig;

#[derive(Error, Debug)]
pub(crate) enum LoadError {
    #[error("error reading program: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    #[error("line {line}: unknown register '{name}'")]
    UnknownRegister { line: usize, name: String },
}

struct Loader {
    reg_count: RegisterType,
    code: Vec<Instr>,
}

impl Loader {
    fn parse(&mut self, input: &str) -> Result<(), LoadError> {
        let instr_pattern = Regex::new(r"^\s*([A-Za-z]+)\s+(.+?)\s*$").unwrap();

        for (line_index, raw_line) in input.lines().enumerate() {
            let line = line_index + 1;
            let text = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };
            if text.trim().is_empty() {
                continue;
            }

            let captures = instr_pattern.captures(text).ok_or_else(|| LoadError::Syntax {
                line,
                msg: format!("expected 'OPCODE dest, src1, src2', got '{}'", text.trim()),
            })?;

            let opcode = match get_opcode(&captures[1]) {
                Some(opcode) => opcode,
                None => {
                    // unsupported operations are dropped; the rest of the
                    // program still runs
                    warn!("line {}: unsupported operation '{}', skipping", line, &captures[1]);
                    continue;
                }
            };

            let operands: Vec<&str> = captures[2].split(',').map(str::trim).collect();
            let expected = if opcode == Opcode::LOAD { 2 } else { 3 };
            if operands.len() != expected {
                return Err(LoadError::Syntax {
                    line,
                    msg: format!("{} expects {} operands, but {} are provided",
                                 &captures[1], expected, operands.len()),
                });
            }

            let dest = self.parse_register(operands[0], line)?;
            let src1 = self.parse_register(operands[1], line)?;
            let src2 = if opcode == Opcode::LOAD {
                None
            } else {
                Some(self.parse_register(operands[2], line)?)
            };

            self.code.push(Instr { opcode, dest, src1, src2 });
        }

        Ok(())
    }

    fn parse_register(&self, name: &str, line: usize) -> Result<RegisterType, LoadError> {
        match get_register(name) {
            Some(reg) if reg < self.reg_count => Ok(reg),
            _ => Err(LoadError::UnknownRegister { line, name: name.to_string() }),
        }
    }
}

pub(crate) fn load(config: &SimConfig, path: &str) -> Result<Program, LoadError> {
    let input = fs::read_to_string(path)?;
    load_from_string(config, &input)
}

pub(crate) fn load_from_string(config: &SimConfig, input: &str) -> Result<Program, LoadError> {
    let mut loader = Loader { reg_count: config.reg_count, code: Vec::new() };
    loader.parse(input)?;
    Ok(Program { code: loader.code })
}
