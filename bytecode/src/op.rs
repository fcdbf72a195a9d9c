/// Bytecode opcodes.
///
/// Every opcode has a fixed encoded length (see [`Op::length`]). Context
/// levels and slot indices are 8-bit. Literal pool indices are always 16-bit
/// little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Stop the interpreter loop, yielding the top of stack.
    Halt = 0x00,

    /// Duplicate the top of stack.
    Dup,

    /// Push a local of the frame `level` hops up the context chain.
    /// Operands: `idx:u8`, `level:u8`
    PushLocal,

    /// Push an argument of the frame `level` hops up the context chain.
    /// Argument 0 is the receiver.
    /// Operands: `idx:u8`, `level:u8`
    PushArgument,

    /// Push a field of `self`.
    /// Operands: `idx:u8`
    PushField,

    /// Create a block from a literal method, capturing the current frame.
    /// Operands: `lit:u16`
    PushBlock,

    /// Push a literal pool entry.
    /// Operands: `lit:u16`
    PushConstant,

    /// Push the global named by a literal symbol.
    /// Operands: `lit:u16`
    PushGlobal,

    /// Discard the top of stack.
    Pop,

    /// Pop into a local.
    /// Operands: `idx:u8`, `level:u8`
    PopLocal,

    /// Pop into an argument.
    /// Operands: `idx:u8`, `level:u8`
    PopArgument,

    /// Pop into a field of `self`.
    /// Operands: `idx:u8`
    PopField,

    /// Send the message named by a literal symbol.
    /// Operands: `lit:u16`
    Send,

    /// Send starting the lookup at the holder's superclass.
    /// Operands: `lit:u16`
    SuperSend,

    /// Return the top of stack to the caller.
    ReturnLocal,

    /// Return the top of stack from the enclosing method activation.
    ReturnNonLocal,
}

impl Op {
    pub const COUNT: usize = Op::ReturnNonLocal as usize + 1;

    /// Encoded length in bytes, opcode included.
    pub const fn length(self) -> usize {
        match self {
            Op::Halt
            | Op::Dup
            | Op::Pop
            | Op::ReturnLocal
            | Op::ReturnNonLocal => 1,
            Op::PushField | Op::PopField => 2,
            Op::PushLocal
            | Op::PushArgument
            | Op::PopLocal
            | Op::PopArgument
            | Op::PushBlock
            | Op::PushConstant
            | Op::PushGlobal
            | Op::Send
            | Op::SuperSend => 3,
        }
    }

    /// Whether this opcode carries a literal pool index.
    pub const fn has_literal_operand(self) -> bool {
        matches!(
            self,
            Op::PushBlock
                | Op::PushConstant
                | Op::PushGlobal
                | Op::Send
                | Op::SuperSend
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Op::Halt => "halt",
            Op::Dup => "dup",
            Op::PushLocal => "push_local",
            Op::PushArgument => "push_argument",
            Op::PushField => "push_field",
            Op::PushBlock => "push_block",
            Op::PushConstant => "push_constant",
            Op::PushGlobal => "push_global",
            Op::Pop => "pop",
            Op::PopLocal => "pop_local",
            Op::PopArgument => "pop_argument",
            Op::PopField => "pop_field",
            Op::Send => "send",
            Op::SuperSend => "super_send",
            Op::ReturnLocal => "return_local",
            Op::ReturnNonLocal => "return_non_local",
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if byte < Self::COUNT as u8 {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(byte) })
        } else {
            Err(byte)
        }
    }
}
