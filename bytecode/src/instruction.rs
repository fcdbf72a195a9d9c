use core::fmt;

use crate::op::Op;

/// A decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Halt,
    Dup,
    PushLocal { idx: u8, level: u8 },
    PushArgument { idx: u8, level: u8 },
    PushField { idx: u8 },
    PushBlock { lit: u16 },
    PushConstant { lit: u16 },
    PushGlobal { lit: u16 },
    Pop,
    PopLocal { idx: u8, level: u8 },
    PopArgument { idx: u8, level: u8 },
    PopField { idx: u8 },
    Send { lit: u16 },
    SuperSend { lit: u16 },
    ReturnLocal,
    ReturnNonLocal,
}

impl Instruction {
    pub const fn op(&self) -> Op {
        match self {
            Self::Halt => Op::Halt,
            Self::Dup => Op::Dup,
            Self::PushLocal { .. } => Op::PushLocal,
            Self::PushArgument { .. } => Op::PushArgument,
            Self::PushField { .. } => Op::PushField,
            Self::PushBlock { .. } => Op::PushBlock,
            Self::PushConstant { .. } => Op::PushConstant,
            Self::PushGlobal { .. } => Op::PushGlobal,
            Self::Pop => Op::Pop,
            Self::PopLocal { .. } => Op::PopLocal,
            Self::PopArgument { .. } => Op::PopArgument,
            Self::PopField { .. } => Op::PopField,
            Self::Send { .. } => Op::Send,
            Self::SuperSend { .. } => Op::SuperSend,
            Self::ReturnLocal => Op::ReturnLocal,
            Self::ReturnNonLocal => Op::ReturnNonLocal,
        }
    }

    /// Literal pool index, for the opcodes that carry one.
    pub const fn literal(&self) -> Option<u16> {
        if !self.op().has_literal_operand() {
            return None;
        }
        match *self {
            Self::PushBlock { lit }
            | Self::PushConstant { lit }
            | Self::PushGlobal { lit }
            | Self::Send { lit }
            | Self::SuperSend { lit } => Some(lit),
            _ => None,
        }
    }

    /// Encoded length in bytes.
    pub const fn length(&self) -> usize {
        self.op().length()
    }

    /// Net operand stack effect, ignoring the result pushed by a send.
    ///
    /// Sends are reported as `-argc` where `argc` counts the receiver, since
    /// the selector arity is not known at this level.
    pub const fn stack_effect(&self) -> Option<isize> {
        match self {
            Self::Dup
            | Self::PushLocal { .. }
            | Self::PushArgument { .. }
            | Self::PushField { .. }
            | Self::PushBlock { .. }
            | Self::PushConstant { .. }
            | Self::PushGlobal { .. } => Some(1),
            Self::Pop
            | Self::PopLocal { .. }
            | Self::PopArgument { .. }
            | Self::PopField { .. } => Some(-1),
            Self::Halt => Some(0),
            Self::Send { .. }
            | Self::SuperSend { .. }
            | Self::ReturnLocal
            | Self::ReturnNonLocal => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.op().name();
        match self {
            Self::PushLocal { idx, level }
            | Self::PushArgument { idx, level }
            | Self::PopLocal { idx, level }
            | Self::PopArgument { idx, level } => {
                write!(f, "{name} {idx}, {level}")
            }
            Self::PushField { idx } | Self::PopField { idx } => {
                write!(f, "{name} {idx}")
            }
            Self::PushBlock { lit }
            | Self::PushConstant { lit }
            | Self::PushGlobal { lit }
            | Self::Send { lit }
            | Self::SuperSend { lit } => write!(f, "{name} #{lit}"),
            Self::Halt
            | Self::Dup
            | Self::Pop
            | Self::ReturnLocal
            | Self::ReturnNonLocal => f.write_str(name),
        }
    }
}
