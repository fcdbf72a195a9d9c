mod op;
mod instruction;
mod builder;
mod decoder;

pub use op::Op;
pub use instruction::Instruction;
pub use builder::BytecodeBuilder;
pub use decoder::{BytecodeDecoder, DecodeError, decode_at, disassemble};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        BytecodeDecoder::new(bytes)
            .map(|(_, r)| r.expect("decode"))
            .collect()
    }

    #[test]
    fn round_trip_all_ops() {
        let mut b = BytecodeBuilder::new();
        b.push_argument(0, 0);
        b.push_local(3, 2);
        b.push_field(7);
        b.push_block(1);
        b.push_constant(0x1234);
        b.push_global(9);
        b.dup();
        b.pop();
        b.pop_local(1, 1);
        b.pop_argument(2, 0);
        b.pop_field(4);
        b.send(5, 2);
        b.super_send(6, 1);
        b.return_local();
        b.return_non_local();
        b.halt();

        assert_eq!(decode_all(&b.into_bytes()), vec![
            Instruction::PushArgument { idx: 0, level: 0 },
            Instruction::PushLocal { idx: 3, level: 2 },
            Instruction::PushField { idx: 7 },
            Instruction::PushBlock { lit: 1 },
            Instruction::PushConstant { lit: 0x1234 },
            Instruction::PushGlobal { lit: 9 },
            Instruction::Dup,
            Instruction::Pop,
            Instruction::PopLocal { idx: 1, level: 1 },
            Instruction::PopArgument { idx: 2, level: 0 },
            Instruction::PopField { idx: 4 },
            Instruction::Send { lit: 5 },
            Instruction::SuperSend { lit: 6 },
            Instruction::ReturnLocal,
            Instruction::ReturnNonLocal,
            Instruction::Halt,
        ]);
    }

    #[test]
    fn literal_operands() {
        assert_eq!(Instruction::Send { lit: 4 }.literal(), Some(4));
        assert_eq!(Instruction::PushBlock { lit: 0 }.literal(), Some(0));
        assert_eq!(Instruction::PushField { idx: 4 }.literal(), None);
        assert_eq!(Instruction::Halt.literal(), None);
    }

    #[test]
    fn literal_index_is_little_endian() {
        let mut b = BytecodeBuilder::new();
        b.push_constant(0x0102);
        assert_eq!(b.as_bytes(), &[Op::PushConstant as u8, 0x02, 0x01]);
    }

    #[test]
    fn lengths_match_encoding() {
        let mut b = BytecodeBuilder::new();
        b.push_local(0, 0);
        b.push_field(0);
        b.send(0, 1);
        b.return_local();
        let bytes = b.into_bytes();

        let offsets: Vec<usize> =
            BytecodeDecoder::new(&bytes).map(|(o, _)| o).collect();
        assert_eq!(offsets, vec![0, 3, 5, 8]);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn invalid_opcode_stops_decoding() {
        let bytes = [Op::Dup as u8, 0xEE, Op::Pop as u8];
        let items: Vec<_> = BytecodeDecoder::new(&bytes).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1].1,
            Err(DecodeError::InvalidOpcode { byte: 0xEE, offset: 1 })
        );
    }

    #[test]
    fn truncated_operand_is_reported() {
        let bytes = [Op::Send as u8, 0x01];
        assert_eq!(
            decode_at(&bytes, 0),
            Err(DecodeError::Truncated { op: Op::Send, offset: 0 })
        );
        assert_eq!(
            decode_at(&bytes, 5),
            Err(DecodeError::OutOfRange { offset: 5 })
        );
    }

    #[test]
    fn op_try_from_rejects_out_of_range() {
        assert_eq!(Op::try_from(Op::COUNT as u8), Err(Op::COUNT as u8));
        assert_eq!(Op::try_from(0), Ok(Op::Halt));
        assert_eq!(Op::try_from(15), Ok(Op::ReturnNonLocal));
    }

    #[test]
    fn builder_tracks_max_stack() {
        let mut b = BytecodeBuilder::new();
        b.push_constant(0);
        b.push_constant(1);
        b.push_constant(2);
        b.send(3, 3);
        b.push_constant(4);
        b.send(5, 2);
        b.return_local();
        assert_eq!(b.max_stack(), 3);
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            Instruction::PushLocal { idx: 1, level: 2 }.to_string(),
            "push_local 1, 2"
        );
        assert_eq!(Instruction::Send { lit: 4 }.to_string(), "send #4");
        assert_eq!(Instruction::PopField { idx: 3 }.to_string(), "pop_field 3");
        assert_eq!(Instruction::ReturnNonLocal.to_string(), "return_non_local");
    }

    #[test]
    fn disassemble_lists_offsets() {
        let mut b = BytecodeBuilder::new();
        b.push_constant(0);
        b.return_local();
        assert_eq!(
            disassemble(&b.into_bytes()),
            "   0: push_constant #0\n   3: return_local\n"
        );
    }
}
