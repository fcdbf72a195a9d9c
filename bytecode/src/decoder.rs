use core::fmt;

use crate::instruction::Instruction;
use crate::op::Op;

/// Reasons a byte stream does not decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte at `offset` is not an opcode.
    InvalidOpcode { byte: u8, offset: usize },
    /// The instruction at `offset` runs past the end of the stream.
    Truncated { op: Op, offset: usize },
    /// `offset` is past the end of the stream.
    OutOfRange { offset: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOpcode { byte, offset } => {
                write!(f, "invalid opcode 0x{byte:02x} at {offset}")
            }
            Self::Truncated { op, offset } => {
                write!(f, "truncated {} at {offset}", op.name())
            }
            Self::OutOfRange { offset } => {
                write!(f, "bytecode index {offset} out of range")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the single instruction starting at `offset`.
pub fn decode_at(bytes: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    let byte = *bytes
        .get(offset)
        .ok_or(DecodeError::OutOfRange { offset })?;
    let op = Op::try_from(byte)
        .map_err(|byte| DecodeError::InvalidOpcode { byte, offset })?;
    let operands = bytes
        .get(offset + 1..offset + op.length())
        .ok_or(DecodeError::Truncated { op, offset })?;

    let u8_at = |i: usize| operands[i];
    let lit = || u16::from_le_bytes([operands[0], operands[1]]);

    Ok(match op {
        Op::Halt => Instruction::Halt,
        Op::Dup => Instruction::Dup,
        Op::PushLocal => Instruction::PushLocal {
            idx: u8_at(0),
            level: u8_at(1),
        },
        Op::PushArgument => Instruction::PushArgument {
            idx: u8_at(0),
            level: u8_at(1),
        },
        Op::PushField => Instruction::PushField { idx: u8_at(0) },
        Op::PushBlock => Instruction::PushBlock { lit: lit() },
        Op::PushConstant => Instruction::PushConstant { lit: lit() },
        Op::PushGlobal => Instruction::PushGlobal { lit: lit() },
        Op::Pop => Instruction::Pop,
        Op::PopLocal => Instruction::PopLocal {
            idx: u8_at(0),
            level: u8_at(1),
        },
        Op::PopArgument => Instruction::PopArgument {
            idx: u8_at(0),
            level: u8_at(1),
        },
        Op::PopField => Instruction::PopField { idx: u8_at(0) },
        Op::Send => Instruction::Send { lit: lit() },
        Op::SuperSend => Instruction::SuperSend { lit: lit() },
        Op::ReturnLocal => Instruction::ReturnLocal,
        Op::ReturnNonLocal => Instruction::ReturnNonLocal,
    })
}

/// Decodes a bytecode byte slice into [`Instruction`]s.
///
/// Yields `(offset, result)` pairs. Decoding stops after the first error
/// since the instruction boundaries past it are unknown.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the stream.
    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the decoder has reached the end of the bytecode.
    #[inline(always)]
    pub fn is_at_end(&self) -> bool {
        self.failed || self.pos >= self.bytes.len()
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = (usize, Result<Instruction, DecodeError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let offset = self.pos;
        let result = decode_at(self.bytes, offset);
        match &result {
            Ok(instr) => self.pos += instr.length(),
            Err(_) => self.failed = true,
        }
        Some((offset, result))
    }
}

/// Render a bytecode stream one instruction per line, `offset: instruction`.
pub fn disassemble(bytes: &[u8]) -> String {
    use fmt::Write;

    let mut out = String::new();
    for (offset, result) in BytecodeDecoder::new(bytes) {
        let _ = match result {
            Ok(instr) => writeln!(out, "{offset:4}: {instr}"),
            Err(e) => writeln!(out, "{offset:4}: <{e}>"),
        };
    }
    out
}
