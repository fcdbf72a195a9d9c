use crate::op::Op;

/// Builds a bytecode byte sequence.
///
/// Tracks the operand stack depth while emitting so the resulting method can
/// size its frame. Sends need the selector arity, which callers pass
/// explicitly.
pub struct BytecodeBuilder {
    buf: Vec<u8>,
    depth: usize,
    max_depth: usize,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            depth: 0,
            max_depth: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    /// Deepest operand stack seen so far.
    pub fn max_stack(&self) -> usize {
        self.max_depth
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    fn grow(&mut self, n: usize) {
        self.depth += n;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn shrink(&mut self, n: usize) {
        self.depth = self.depth.saturating_sub(n);
    }

    fn emit_slot(&mut self, op: Op, idx: u8, level: u8) {
        self.emit_op(op);
        self.emit_u8(idx);
        self.emit_u8(level);
    }

    fn emit_literal(&mut self, op: Op, lit: u16) {
        self.emit_op(op);
        self.emit_u16(lit);
    }

    // ── instructions ───────────────────────────────────────────────

    /// `halt`: stop the loop with the top of stack as result.
    pub fn halt(&mut self) {
        self.emit_op(Op::Halt);
    }

    pub fn dup(&mut self) {
        self.emit_op(Op::Dup);
        self.grow(1);
    }

    /// `push_local <idx:u8> <level:u8>`.
    pub fn push_local(&mut self, idx: u8, level: u8) {
        self.emit_slot(Op::PushLocal, idx, level);
        self.grow(1);
    }

    /// `push_argument <idx:u8> <level:u8>`. Argument 0 is `self`.
    pub fn push_argument(&mut self, idx: u8, level: u8) {
        self.emit_slot(Op::PushArgument, idx, level);
        self.grow(1);
    }

    /// `push_field <idx:u8>`.
    pub fn push_field(&mut self, idx: u8) {
        self.emit_op(Op::PushField);
        self.emit_u8(idx);
        self.grow(1);
    }

    /// `push_block <lit:u16>`: the literal must be a block method.
    pub fn push_block(&mut self, lit: u16) {
        self.emit_literal(Op::PushBlock, lit);
        self.grow(1);
    }

    /// `push_constant <lit:u16>`.
    pub fn push_constant(&mut self, lit: u16) {
        self.emit_literal(Op::PushConstant, lit);
        self.grow(1);
    }

    /// `push_global <lit:u16>`: the literal must be a symbol.
    pub fn push_global(&mut self, lit: u16) {
        self.emit_literal(Op::PushGlobal, lit);
        self.grow(1);
    }

    pub fn pop(&mut self) {
        self.emit_op(Op::Pop);
        self.shrink(1);
    }

    pub fn pop_local(&mut self, idx: u8, level: u8) {
        self.emit_slot(Op::PopLocal, idx, level);
        self.shrink(1);
    }

    pub fn pop_argument(&mut self, idx: u8, level: u8) {
        self.emit_slot(Op::PopArgument, idx, level);
        self.shrink(1);
    }

    pub fn pop_field(&mut self, idx: u8) {
        self.emit_op(Op::PopField);
        self.emit_u8(idx);
        self.shrink(1);
    }

    /// `send <lit:u16>`.
    ///
    /// `arity` counts the receiver, so a unary send has arity 1.
    pub fn send(&mut self, lit: u16, arity: usize) {
        self.emit_literal(Op::Send, lit);
        self.shrink(arity);
        self.grow(1);
    }

    /// `super_send <lit:u16>`. Same stack contract as [`send`](Self::send).
    pub fn super_send(&mut self, lit: u16, arity: usize) {
        self.emit_literal(Op::SuperSend, lit);
        self.shrink(arity);
        self.grow(1);
    }

    pub fn return_local(&mut self) {
        self.emit_op(Op::ReturnLocal);
        self.shrink(1);
    }

    pub fn return_non_local(&mut self) {
        self.emit_op(Op::ReturnNonLocal);
        self.shrink(1);
    }
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
