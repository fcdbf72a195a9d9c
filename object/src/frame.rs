use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::method::Method;
use crate::value::Value;

/// Extra operand slots past the method's computed maximum.
///
/// Rerouting a failed send to `doesNotUnderstand:` or `unknownGlobal:`
/// pushes one more value than the failing instruction accounted for.
pub const STACK_HEADROOM: usize = 2;

pub type FrameRef = Rc<Frame>;

/// Out-of-range frame or object access. Always an engine bug or malformed
/// bytecode, never a language-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    SlotOutOfBounds { index: usize, len: usize },
    StackOverflow { capacity: usize },
    StackUnderflow,
    MissingContext { level: u8 },
    FieldOutOfBounds { index: usize, len: usize },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotOutOfBounds { index, len } => {
                write!(f, "frame slot {index} out of bounds (len {len})")
            }
            Self::StackOverflow { capacity } => {
                write!(f, "operand stack overflow (capacity {capacity})")
            }
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::MissingContext { level } => {
                write!(f, "no context at level {level}")
            }
            Self::FieldOutOfBounds { index, len } => {
                write!(f, "field {index} out of bounds (len {len})")
            }
        }
    }
}

impl std::error::Error for AccessError {}

/// An activation record.
///
/// Slots are laid out as `[arguments][locals][operand stack]`. `top` is the
/// number of occupied slots, so the operand stack is empty when
/// `top == num_args + num_locals`.
pub struct Frame {
    method: Rc<Method>,
    context: Option<FrameRef>,
    previous: RefCell<Option<FrameRef>>,
    slots: RefCell<Vec<Value>>,
    top: Cell<usize>,
    bytecode_index: Cell<usize>,
    instruction_index: Cell<usize>,
}

impl Frame {
    pub fn new(
        method: Rc<Method>,
        context: Option<FrameRef>,
        previous: Option<FrameRef>,
    ) -> FrameRef {
        let len = method.num_args()
            + method.num_locals()
            + method.max_stack()
            + STACK_HEADROOM;
        let frame = Rc::new(Self {
            method,
            context,
            previous: RefCell::new(previous),
            slots: RefCell::new(vec![Value::Nil; len]),
            top: Cell::new(0),
            bytecode_index: Cell::new(0),
            instruction_index: Cell::new(0),
        });
        frame.reset_stack_pointer();
        frame
    }

    pub fn method(&self) -> &Rc<Method> {
        &self.method
    }

    pub fn context(&self) -> Option<&FrameRef> {
        self.context.as_ref()
    }

    /// Whether this frame evaluates a block body.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    // ── call chain ─────────────────────────────────────────────────

    pub fn previous_frame(&self) -> Option<FrameRef> {
        self.previous.borrow().clone()
    }

    pub fn has_previous_frame(&self) -> bool {
        self.previous.borrow().is_some()
    }

    pub fn clear_previous_frame(&self) {
        self.previous.borrow_mut().take();
    }

    /// Offset of the next instruction to fetch.
    pub fn bytecode_index(&self) -> usize {
        self.bytecode_index.get()
    }

    /// Offset of the instruction being executed, or the send this frame
    /// is waiting on.
    pub fn instruction_index(&self) -> usize {
        self.instruction_index.get()
    }

    /// Start executing the `length`-byte instruction at `bci`.
    pub fn begin_instruction(&self, bci: usize, length: usize) {
        self.instruction_index.set(bci);
        self.bytecode_index.set(bci + length);
    }

    // ── operand stack ──────────────────────────────────────────────

    fn local_offset(&self) -> usize {
        self.method.num_args()
    }

    fn stack_base(&self) -> usize {
        self.method.num_args() + self.method.num_locals()
    }

    /// Number of values on the operand stack.
    pub fn stack_depth(&self) -> usize {
        self.top.get() - self.stack_base()
    }

    pub fn capacity(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Empty the operand stack and reset locals to nil. Arguments are kept.
    pub fn reset_stack_pointer(&self) {
        let mut slots = self.slots.borrow_mut();
        for slot in slots[self.local_offset()..].iter_mut() {
            *slot = Value::Nil;
        }
        self.top.set(self.stack_base());
    }

    pub fn push(&self, value: Value) -> Result<(), AccessError> {
        let mut slots = self.slots.borrow_mut();
        let top = self.top.get();
        let capacity = slots.len();
        let slot = slots
            .get_mut(top)
            .ok_or(AccessError::StackOverflow { capacity })?;
        *slot = value;
        self.top.set(top + 1);
        Ok(())
    }

    pub fn pop(&self) -> Result<Value, AccessError> {
        let top = self.top.get();
        if top <= self.stack_base() {
            return Err(AccessError::StackUnderflow);
        }
        let mut slots = self.slots.borrow_mut();
        let value = std::mem::replace(&mut slots[top - 1], Value::Nil);
        self.top.set(top - 1);
        Ok(value)
    }

    fn stack_slot(&self, i: usize) -> Result<usize, AccessError> {
        if i >= self.stack_depth() {
            return Err(AccessError::StackUnderflow);
        }
        Ok(self.top.get() - 1 - i)
    }

    /// Stack element `i` below the top; 0 is the top.
    pub fn get_stack_element(&self, i: usize) -> Result<Value, AccessError> {
        let idx = self.stack_slot(i)?;
        Ok(self.slots.borrow()[idx].clone())
    }

    pub fn set_stack_element(&self, i: usize, value: Value) -> Result<(), AccessError> {
        let idx = self.stack_slot(i)?;
        self.slots.borrow_mut()[idx] = value;
        Ok(())
    }

    /// Drop `n` values from the top of the stack.
    pub fn pop_n(&self, n: usize) -> Result<(), AccessError> {
        if n > self.stack_depth() {
            return Err(AccessError::StackUnderflow);
        }
        for _ in 0..n {
            self.pop()?;
        }
        Ok(())
    }

    // ── arguments and locals ───────────────────────────────────────

    /// The frame `level` hops up the lexical context chain.
    pub fn context_at(&self, level: u8) -> Result<&Frame, AccessError> {
        let mut frame = self;
        for _ in 0..level {
            frame = frame
                .context
                .as_deref()
                .ok_or(AccessError::MissingContext { level })?;
        }
        Ok(frame)
    }

    /// The method activation lexically enclosing this frame.
    pub fn outer_context(self: &Rc<Self>) -> FrameRef {
        let mut frame = self.clone();
        while let Some(ctx) = frame.context.clone() {
            frame = ctx;
        }
        frame
    }

    fn read_slot(&self, index: usize) -> Result<Value, AccessError> {
        let slots = self.slots.borrow();
        slots.get(index).cloned().ok_or(AccessError::SlotOutOfBounds {
            index,
            len: slots.len(),
        })
    }

    fn write_slot(&self, index: usize, value: Value) -> Result<(), AccessError> {
        let mut slots = self.slots.borrow_mut();
        let len = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(AccessError::SlotOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    fn local_slot(&self, index: usize) -> Result<usize, AccessError> {
        if index >= self.method.num_locals() {
            return Err(AccessError::SlotOutOfBounds {
                index: self.local_offset() + index,
                len: self.stack_base(),
            });
        }
        Ok(self.local_offset() + index)
    }

    fn argument_slot(&self, index: usize) -> Result<usize, AccessError> {
        if index >= self.method.num_args() {
            return Err(AccessError::SlotOutOfBounds {
                index,
                len: self.method.num_args(),
            });
        }
        Ok(index)
    }

    pub fn get_local(&self, index: usize, level: u8) -> Result<Value, AccessError> {
        let frame = self.context_at(level)?;
        frame.read_slot(frame.local_slot(index)?)
    }

    pub fn set_local(
        &self,
        index: usize,
        level: u8,
        value: Value,
    ) -> Result<(), AccessError> {
        let frame = self.context_at(level)?;
        frame.write_slot(frame.local_slot(index)?, value)
    }

    pub fn get_argument(&self, index: usize, level: u8) -> Result<Value, AccessError> {
        let frame = self.context_at(level)?;
        frame.read_slot(frame.argument_slot(index)?)
    }

    pub fn set_argument(
        &self,
        index: usize,
        level: u8,
        value: Value,
    ) -> Result<(), AccessError> {
        let frame = self.context_at(level)?;
        frame.write_slot(frame.argument_slot(index)?, value)
    }

    /// `self` of the enclosing method activation.
    pub fn receiver(self: &Rc<Self>) -> Result<Value, AccessError> {
        self.outer_context().get_argument(0, 0)
    }

    /// Copy this frame's arguments off the top of `caller`'s stack.
    ///
    /// The receiver lands in argument 0, the last argument came from the
    /// top of the caller's stack.
    pub fn copy_arguments_from(&self, caller: &Frame) -> Result<(), AccessError> {
        let n = self.method.num_args();
        for i in 0..n {
            let value = caller.get_stack_element(n - 1 - i)?;
            self.write_slot(i, value)?;
        }
        Ok(())
    }

    // ── diagnostics ────────────────────────────────────────────────

    fn describe(&self) -> String {
        let holder = self
            .method
            .holder()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "{holder}>>#{} @bi: {}",
            self.method.signature(),
            self.instruction_index()
        )
    }

    /// One line per activation, outermost caller first.
    pub fn stack_trace(self: &Rc<Self>) -> Vec<String> {
        let mut lines = Vec::new();
        let mut frame = Some(self.clone());
        while let Some(f) = frame {
            lines.push(f.describe());
            frame = f.previous_frame();
        }
        lines.reverse();
        lines
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("method", &self.method)
            .field("bci", &self.bytecode_index())
            .field("depth", &self.stack_depth())
            .field("block", &self.has_context())
            .finish()
    }
}
