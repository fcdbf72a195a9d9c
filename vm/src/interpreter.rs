use std::fmt;
use std::rc::Rc;

use bytecode::{BytecodeBuilder, DecodeError, Instruction, decode_at};
use log::{debug, error, info, log_enabled, trace, warn};
use object::{
    AccessError, Block, CacheFill, Class, Frame, FrameRef, Instance, Invokable, Method,
    Primitive, Symbol, Value,
};

use crate::VM;
use crate::primitives::PrimitiveFn;

/// Engine-level failures. These are never seen by language code; they
/// abort the current interpretation.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// Out-of-range frame or object access.
    Access(AccessError),
    /// Undecodable bytecode.
    Decode(DecodeError),
    /// A literal operand of the wrong kind, e.g. a `send` whose literal is
    /// not a symbol.
    LiteralKind {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    /// A primitive or bytecode needed one kind of value and got another.
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// The activation chain exceeded the configured limit.
    StackOverflow { depth: usize },
    /// A primitive left the caller's operand stack unbalanced.
    StackImbalance {
        selector: Symbol,
        expected: usize,
        actual: usize,
    },
    /// An object-level error reached the default handler in `Object`.
    Unhandled {
        handler: &'static str,
        receiver: String,
        argument: String,
    },
    DivisionByZero,
    MissingPrimitive { index: usize },
    NoActiveFrame,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access(e) => write!(f, "{e}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::LiteralKind {
                index,
                expected,
                got,
            } => write!(f, "literal {index} is a {got}, expected a {expected}"),
            Self::TypeMismatch { expected, got } => {
                write!(f, "expected {expected}, got {got}")
            }
            Self::StackOverflow { depth } => {
                write!(f, "stack overflow at depth {depth}")
            }
            Self::StackImbalance {
                selector,
                expected,
                actual,
            } => write!(
                f,
                "primitive #{selector} left stack depth {actual}, expected {expected}"
            ),
            Self::Unhandled {
                handler,
                receiver,
                argument,
            } => write!(f, "{receiver} {handler} {argument}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::MissingPrimitive { index } => {
                write!(f, "no primitive registered at index {index}")
            }
            Self::NoActiveFrame => write!(f, "no active frame"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Access(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AccessError> for RuntimeError {
    fn from(e: AccessError) -> Self {
        Self::Access(e)
    }
}

impl From<DecodeError> for RuntimeError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

/// A fatal error together with the activation chain at the point it
/// happened, outermost caller first.
#[derive(Debug, Clone)]
pub struct Aborted {
    pub error: RuntimeError,
    pub backtrace: Vec<String>,
}

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for line in self.backtrace.iter().rev() {
            write!(f, "\n    at {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Aborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

// ── Interpreter state ──────────────────────────────────────────────

/// The live activation chain of one interpretation.
pub struct InterpreterState {
    frame: Option<FrameRef>,
    depth: usize,
}

impl InterpreterState {
    fn new() -> Self {
        Self {
            frame: None,
            depth: 0,
        }
    }

    pub fn current(&self) -> Result<FrameRef, RuntimeError> {
        self.frame.clone().ok_or(RuntimeError::NoActiveFrame)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn is_current(&self, frame: &FrameRef) -> bool {
        self.frame.as_ref().is_some_and(|f| Rc::ptr_eq(f, frame))
    }

    /// Activate `method` on top of the current frame, taking its
    /// arguments from the top of the caller's stack.
    pub fn push_frame(
        &mut self,
        vm: &VM,
        method: Rc<Method>,
        context: Option<FrameRef>,
    ) -> Result<FrameRef, RuntimeError> {
        if self.depth >= vm.settings.max_frames {
            return Err(RuntimeError::StackOverflow { depth: self.depth });
        }
        let caller = self.frame.take();
        let frame = Frame::new(method, context, caller.clone());
        if let Some(caller) = &caller {
            let copied = frame.copy_arguments_from(caller);
            if let Err(e) = copied {
                self.frame = Some(caller.clone());
                return Err(e.into());
            }
        }
        self.frame = Some(frame.clone());
        self.depth += 1;
        Ok(frame)
    }

    /// Unlink the current frame and make its caller current.
    fn pop_frame(&mut self) -> Result<FrameRef, RuntimeError> {
        let frame = self.frame.take().ok_or(RuntimeError::NoActiveFrame)?;
        self.frame = frame.previous_frame();
        frame.clear_previous_frame();
        self.depth -= 1;
        Ok(frame)
    }

    /// Return `value` from the current frame: pop it, drop its receiver
    /// and arguments from the caller and push `value` in their place.
    fn pop_frame_and_push_result(&mut self, value: Value) -> Result<(), RuntimeError> {
        let frame = self.pop_frame()?;
        let caller = self.current()?;
        caller.pop_n(frame.method().num_args())?;
        caller.push(value)?;
        Ok(())
    }

    /// Whether `target` is on the live activation chain.
    fn is_live(&self, target: &FrameRef) -> bool {
        let mut frame = self.frame.clone();
        while let Some(f) = frame {
            if Rc::ptr_eq(&f, target) {
                return true;
            }
            frame = f.previous_frame();
        }
        false
    }

    /// Drop every frame, breaking the previous links one at a time.
    fn unwind(&mut self) {
        while let Some(frame) = self.frame.take() {
            self.frame = frame.previous_frame();
            frame.clear_previous_frame();
        }
        self.depth = 0;
    }

    fn backtrace(&self) -> Vec<String> {
        self.frame
            .as_ref()
            .map(|f| f.stack_trace())
            .unwrap_or_default()
    }
}

// ── Entry point ────────────────────────────────────────────────────

/// Send `selector` to `receiver` with `args` and run until it returns.
///
/// This is the abort boundary: any engine error unwinds the whole
/// activation chain and comes back as [`Aborted`].
pub fn interpret(
    vm: &mut VM,
    receiver: Value,
    selector: &str,
    args: &[Value],
) -> Result<Value, Aborted> {
    let mut state = InterpreterState::new();
    let result = start(vm, &mut state, receiver, selector, args)
        .and_then(|_| run(vm, &mut state));
    match result {
        Ok(value) => {
            state.unwind();
            Ok(value)
        }
        Err(err) => {
            let backtrace = state.backtrace();
            error!("aborted: {err}");
            for line in backtrace.iter().rev() {
                error!("    at {line}");
            }
            state.unwind();
            Err(Aborted {
                error: err,
                backtrace,
            })
        }
    }
}

/// Build the `send; halt` trampoline for the outermost send.
fn bootstrap_method(vm: &VM, receiver: Value, selector: &Symbol, args: &[Value]) -> Rc<Method> {
    let mut literals = Vec::with_capacity(args.len() + 2);
    let mut b = BytecodeBuilder::new();
    literals.push(receiver);
    b.push_constant(0);
    for arg in args {
        b.push_constant(literals.len() as u16);
        literals.push(arg.clone());
    }
    b.send(literals.len() as u16, args.len() + 1);
    literals.push(Value::Symbol(selector.clone()));
    b.halt();
    let max_stack = b.max_stack();
    Method::new(vm.symbol("bootstrap"), b.into_bytes(), literals, 1, 0, max_stack)
}

fn start(
    vm: &mut VM,
    state: &mut InterpreterState,
    receiver: Value,
    selector: &str,
    args: &[Value],
) -> Result<(), RuntimeError> {
    let selector = vm.symbol(selector);
    if selector.arity() != args.len() + 1 {
        return Err(RuntimeError::TypeMismatch {
            expected: "argument count matching the selector",
            got: "a different number of arguments",
        });
    }
    let method = bootstrap_method(vm, receiver, &selector, args);
    state.push_frame(vm, method, None)?;
    Ok(())
}

// ── Loop ───────────────────────────────────────────────────────────

fn run(vm: &mut VM, state: &mut InterpreterState) -> Result<Value, RuntimeError> {
    loop {
        let frame = state.current()?;
        let bci = frame.bytecode_index();
        let instr = decode_at(frame.method().bytecode(), bci)?;
        frame.begin_instruction(bci, instr.length());

        if log_enabled!(log::Level::Trace) {
            trace!("{:?} {bci:4}: {instr}", frame.method());
        }

        match instr {
            Instruction::Halt => return Ok(frame.pop()?),
            Instruction::Dup => {
                let value = frame.get_stack_element(0)?;
                frame.push(value)?;
            }
            Instruction::PushLocal { idx, level } => {
                let value = frame.get_local(idx as usize, level)?;
                frame.push(value)?;
            }
            Instruction::PushArgument { idx, level } => {
                let value = frame.get_argument(idx as usize, level)?;
                frame.push(value)?;
            }
            Instruction::PushField { idx } => {
                let value = self_instance(&frame)?.field(idx as usize)?;
                frame.push(value)?;
            }
            Instruction::PushBlock { lit } => {
                let method = literal_method(&frame, lit)?;
                let class = vm
                    .special
                    .block_class_for(method.num_args())
                    .cloned()
                    .ok_or(RuntimeError::TypeMismatch {
                        expected: "block taking at most three arguments",
                        got: "block",
                    })?;
                let block = Block::new(method, frame.clone(), class);
                frame.push(Value::Block(block))?;
            }
            Instruction::PushConstant { lit } => {
                frame.push(literal(&frame, lit)?.clone())?;
            }
            Instruction::PushGlobal { lit } => {
                let name = literal_symbol(&frame, lit)?;
                match vm.global(&name) {
                    Some(value) => frame.push(value)?,
                    None => unknown_global(vm, state, &frame, name)?,
                }
            }
            Instruction::Pop => {
                frame.pop()?;
            }
            Instruction::PopLocal { idx, level } => {
                let value = frame.pop()?;
                frame.set_local(idx as usize, level, value)?;
            }
            Instruction::PopArgument { idx, level } => {
                let value = frame.pop()?;
                frame.set_argument(idx as usize, level, value)?;
            }
            Instruction::PopField { idx } => {
                let value = frame.pop()?;
                self_instance(&frame)?.set_field(idx as usize, value)?;
            }
            Instruction::Send { lit } => {
                let selector = literal_symbol(&frame, lit)?;
                send(vm, state, &frame, bci, selector)?;
            }
            Instruction::SuperSend { lit } => {
                let selector = literal_symbol(&frame, lit)?;
                super_send(vm, state, &frame, bci, selector)?;
            }
            Instruction::ReturnLocal => {
                let value = frame.pop()?;
                state.pop_frame_and_push_result(value)?;
            }
            Instruction::ReturnNonLocal => {
                let value = frame.pop()?;
                return_non_local(vm, state, &frame, value)?;
            }
        }
    }
}

// ── Operand helpers ────────────────────────────────────────────────

fn literal(frame: &Frame, lit: u16) -> Result<&Value, RuntimeError> {
    frame.method().literal(lit as usize).ok_or(RuntimeError::Access(
        AccessError::SlotOutOfBounds {
            index: lit as usize,
            len: frame.method().literals().len(),
        },
    ))
}

fn literal_symbol(frame: &Frame, lit: u16) -> Result<Symbol, RuntimeError> {
    match literal(frame, lit)? {
        Value::Symbol(sym) => Ok(sym.clone()),
        other => Err(RuntimeError::LiteralKind {
            index: lit as usize,
            expected: "symbol",
            got: other.kind(),
        }),
    }
}

fn literal_method(frame: &Frame, lit: u16) -> Result<Rc<Method>, RuntimeError> {
    match literal(frame, lit)? {
        Value::Method(method) => Ok(method.clone()),
        other => Err(RuntimeError::LiteralKind {
            index: lit as usize,
            expected: "method",
            got: other.kind(),
        }),
    }
}

fn self_instance(frame: &FrameRef) -> Result<Rc<Instance>, RuntimeError> {
    match frame.receiver()? {
        Value::Object(obj) => Ok(obj),
        other => Err(RuntimeError::TypeMismatch {
            expected: "object with fields",
            got: other.kind(),
        }),
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

fn trace_send(vm: &VM, selector: &Symbol, class: &Class, cached: bool) {
    if vm
        .settings
        .trace_send
        .as_deref()
        .is_some_and(|name| name == selector.as_str())
    {
        info!(
            "send #{selector} to {} ({})",
            class.name(),
            if cached { "cached" } else { "lookup" }
        );
    }
}

/// Resolve `selector` for `class`, consulting and filling the inline cache
/// of the send site at `bci` in `method`.
fn resolve_cached(
    vm: &mut VM,
    method: &Method,
    bci: usize,
    class: &Rc<Class>,
    selector: &Symbol,
) -> Option<Invokable> {
    let cache = method.inline_cache();
    if let Some(target) = cache.lookup(bci, class) {
        vm.stats.cache_hits += 1;
        trace_send(vm, selector, class, true);
        return target;
    }

    vm.stats.lookups += 1;
    trace_send(vm, selector, class, false);
    let target = class.lookup(selector);
    match cache.record(bci, class, target.as_ref()) {
        CacheFill::First | CacheFill::Second => {
            debug!(
                "{method:?} @{bci}: cached #{selector} for {} ({} slots)",
                class.name(),
                cache.occupancy(bci)
            );
        }
        CacheFill::Megamorphic => {
            debug!("{method:?} @{bci}: #{selector} is megamorphic");
        }
    }
    target
}

fn send(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    bci: usize,
    selector: Symbol,
) -> Result<(), RuntimeError> {
    let receiver = frame.get_stack_element(selector.arity() - 1)?;
    let class = vm.class_of(&receiver);
    match resolve_cached(vm, frame.method(), bci, &class, &selector) {
        Some(target) => invoke(vm, state, frame, target, &selector),
        None => does_not_understand(vm, state, frame, receiver, selector),
    }
}

fn super_send(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    bci: usize,
    selector: Symbol,
) -> Result<(), RuntimeError> {
    let receiver = frame.get_stack_element(selector.arity() - 1)?;
    let holder = frame.outer_context().method().holder();
    let target = match holder.as_ref().and_then(|h| h.superclass()) {
        Some(superclass) => {
            resolve_cached(vm, frame.method(), bci, superclass, &selector)
        }
        None => None,
    };
    match target {
        Some(target) => invoke(vm, state, frame, target, &selector),
        None => does_not_understand(vm, state, frame, receiver, selector),
    }
}

/// Send `selector` with receiver and arguments already on `frame`'s stack,
/// without an inline cache. Used by primitives and error rerouting.
pub fn send_message(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    selector: Symbol,
) -> Result<(), RuntimeError> {
    let receiver = frame.get_stack_element(selector.arity() - 1)?;
    let class = vm.class_of(&receiver);
    vm.stats.lookups += 1;
    trace_send(vm, &selector, &class, false);
    match class.lookup(&selector) {
        Some(target) => invoke(vm, state, frame, target, &selector),
        None => does_not_understand(vm, state, frame, receiver, selector),
    }
}

fn invoke(
    vm: &mut VM,
    state: &mut InterpreterState,
    caller: &FrameRef,
    target: Invokable,
    selector: &Symbol,
) -> Result<(), RuntimeError> {
    match target {
        Invokable::Method(method) => {
            state.push_frame(vm, method, None)?;
            Ok(())
        }
        Invokable::Primitive(primitive) => {
            call_primitive(vm, state, caller, &primitive, selector)
        }
    }
}

fn call_primitive(
    vm: &mut VM,
    state: &mut InterpreterState,
    caller: &FrameRef,
    primitive: &Primitive,
    selector: &Symbol,
) -> Result<(), RuntimeError> {
    let index = primitive.index();
    let desc = vm
        .primitives
        .get(index)
        .copied()
        .ok_or(RuntimeError::MissingPrimitive { index })?;
    let arity = selector.arity();

    match desc.func {
        PrimitiveFn::Value(func) => {
            let receiver = caller.get_stack_element(arity - 1)?;
            let args = (1..arity)
                .rev()
                .map(|i| caller.get_stack_element(i - 1))
                .collect::<Result<Vec<_>, _>>()?;
            let result = func(vm, state, receiver, &args)?;
            caller.pop_n(arity)?;
            caller.push(result)?;
        }
        PrimitiveFn::Stack(func) => {
            let expected = caller.stack_depth() + 1 - arity;
            func(vm, state, primitive)?;
            if state.is_current(caller) && caller.stack_depth() != expected {
                return Err(RuntimeError::StackImbalance {
                    selector: selector.clone(),
                    expected,
                    actual: caller.stack_depth(),
                });
            }
        }
    }
    Ok(())
}

/// Evaluate the block `arity - 1` slots below the top of the current frame,
/// consuming it and its arguments when the block returns.
pub fn activate_block(
    vm: &VM,
    state: &mut InterpreterState,
    arity: usize,
) -> Result<(), RuntimeError> {
    let caller = state.current()?;
    let block = match caller.get_stack_element(arity - 1)? {
        Value::Block(block) => block,
        other => {
            return Err(RuntimeError::TypeMismatch {
                expected: "block",
                got: other.kind(),
            });
        }
    };
    if block.num_args() != arity {
        return Err(RuntimeError::TypeMismatch {
            expected: "block of matching arity",
            got: "block",
        });
    }
    state.push_frame(vm, block.method().clone(), Some(block.context().clone()))?;
    Ok(())
}

// ── Object-level errors ────────────────────────────────────────────

/// Replace the failed send's receiver and arguments with
/// `receiver doesNotUnderstand: #selector`.
fn does_not_understand(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    receiver: Value,
    selector: Symbol,
) -> Result<(), RuntimeError> {
    debug!(
        "{} does not understand #{selector}",
        vm.class_of(&receiver).name()
    );
    let dnu = vm.symbol("doesNotUnderstand:");
    if selector == dnu {
        return Err(RuntimeError::Unhandled {
            handler: "doesNotUnderstand:",
            receiver: format!("{receiver:?}"),
            argument: format!("#{selector}"),
        });
    }
    frame.pop_n(selector.arity())?;
    frame.push(receiver)?;
    frame.push(Value::Symbol(selector))?;
    send_message(vm, state, frame, dnu)
}

fn unknown_global(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    name: Symbol,
) -> Result<(), RuntimeError> {
    warn!("unknown global {name}");
    frame.push(frame.receiver()?)?;
    frame.push(Value::Symbol(name))?;
    let selector = vm.symbol("unknownGlobal:");
    send_message(vm, state, frame, selector)
}

// ── Returns ────────────────────────────────────────────────────────

/// Return `value` from the method activation lexically enclosing `frame`.
///
/// When that activation is still live, every frame above it is dropped
/// and it returns `value` to its own caller. Otherwise the block has
/// escaped and `escapedBlock:` is sent to the block's sender.
fn return_non_local(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
    value: Value,
) -> Result<(), RuntimeError> {
    let home = frame.outer_context();
    if !state.is_live(&home) {
        return escaped_block(vm, state, frame);
    }
    while !state.is_current(&home) {
        state.pop_frame()?;
    }
    state.pop_frame_and_push_result(value)
}

fn escaped_block(
    vm: &mut VM,
    state: &mut InterpreterState,
    frame: &FrameRef,
) -> Result<(), RuntimeError> {
    let block = frame.get_argument(0, 0)?;
    let caller = frame.previous_frame().ok_or(RuntimeError::NoActiveFrame)?;
    let sender = caller.receiver()?;
    warn!(
        "block from {:?} escaped its home context, sending escapedBlock: to {}",
        frame.outer_context().method(),
        vm.class_of(&sender).name()
    );

    let popped = state.pop_frame()?;
    caller.pop_n(popped.method().num_args())?;
    caller.push(sender)?;
    caller.push(block)?;
    let selector = vm.symbol("escapedBlock:");
    send_message(vm, state, &caller, selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Transcript, VmSettings};
    use crate::demos;
    use crate::primitives::PrimitiveDesc;
    use object::ClassBuilder;

    fn vm() -> VM {
        let mut vm = VM::new(VmSettings::default());
        vm.transcript = Transcript::capture();
        vm
    }

    /// Assemble a method from builder calls.
    fn method(
        vm: &VM,
        sig: &str,
        num_args: usize,
        num_locals: usize,
        literals: Vec<Value>,
        emit: impl FnOnce(&mut BytecodeBuilder),
    ) -> Rc<Method> {
        let mut b = BytecodeBuilder::new();
        emit(&mut b);
        let max_stack = b.max_stack();
        Method::new(vm.symbol(sig), b.into_bytes(), literals, num_args, num_locals, max_stack)
    }

    fn expect_int(value: Value) -> i64 {
        match value {
            Value::Integer(n) => n,
            other => panic!("expected integer, got {other:?}"),
        }
    }

    // ── Basics ─────────────────────────────────────────────────────

    #[test]
    fn interpret_integer_addition() {
        let mut vm = vm();
        let value = interpret(&mut vm, Value::Integer(42), "+", &[Value::Integer(8)])
            .expect("interpret error");
        assert_eq!(expect_int(value), 50);
    }

    #[test]
    fn send_replaces_receiver_and_argument_with_result() {
        let mut vm = vm();
        let plus = vm.symbol_value("+");
        // 1. 42 + 8. pop. ^top -- answers 1 only if the send left exactly
        // one value behind.
        let run = method(
            &vm,
            "run",
            1,
            0,
            vec![Value::Integer(1), Value::Integer(42), Value::Integer(8), plus],
            |b| {
                b.push_constant(0);
                b.push_constant(1);
                b.push_constant(2);
                b.send(3, 2);
                b.pop();
                b.return_local();
            },
        );
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Adder")).method(run));
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "run", &[]).expect("interpret error");
        assert_eq!(expect_int(value), 1);
    }

    #[test]
    fn halt_yields_top_of_stack() {
        let mut vm = vm();
        let value = interpret(&mut vm, Value::string("hi"), "printString", &[])
            .expect("interpret error");
        assert!(matches!(value, Value::String(s) if &*s == "hi"));
    }

    #[test]
    fn selector_arity_must_match_arguments() {
        let mut vm = vm();
        let err = interpret(&mut vm, Value::Integer(1), "+", &[]).unwrap_err();
        assert!(matches!(err.error, RuntimeError::TypeMismatch { .. }));
    }

    // ── Inline cache ───────────────────────────────────────────────

    #[test]
    fn repeated_send_hits_the_cache() {
        let mut vm = vm();
        let foo_sel = vm.symbol_value("foo");
        let foo = method(&vm, "foo", 1, 0, vec![Value::Integer(7)], |b| {
            b.push_constant(0);
            b.return_local();
        });
        let run = method(&vm, "run", 1, 0, vec![foo_sel], |b| {
            b.push_argument(0, 0);
            b.send(0, 1);
            b.return_local();
        });
        let class = vm.define_class(
            ClassBuilder::new(vm.symbol("Repeater")).method(foo).method(run.clone()),
        );
        let receiver = vm.new_instance(class);

        let before = vm.stats;
        interpret(&mut vm, receiver.clone(), "run", &[]).expect("first run");
        let first = vm.stats;
        // `run` itself plus the cold `foo` site.
        assert_eq!(first.lookups - before.lookups, 2);
        assert_eq!(first.cache_hits, before.cache_hits);
        assert_eq!(run.inline_cache().occupancy(3), 1);

        interpret(&mut vm, receiver, "run", &[]).expect("second run");
        let second = vm.stats;
        assert_eq!(second.lookups - first.lookups, 1);
        assert_eq!(second.cache_hits - first.cache_hits, 1);
    }

    #[test]
    fn third_receiver_class_goes_megamorphic() {
        let mut vm = vm();
        let program = demos::polymorphic(&mut vm);
        let site = program.site_method.clone();

        let mut receivers = Vec::new();
        for class in &program.classes {
            receivers.push(vm.new_instance(class.clone()));
        }

        for (i, receiver) in receivers.iter().enumerate() {
            let before = vm.stats;
            let value = interpret(&mut vm, program.driver.clone(), "describe:", &[receiver.clone()])
                .expect("interpret error");
            assert_eq!(expect_int(value), i as i64 + 1);
            // `describe:` at the entry site, then the shared `tag` site.
            assert_eq!(vm.stats.lookups - before.lookups, 2);
        }
        assert_eq!(site.inline_cache().occupancy(program.site_bci), 2);

        let names: Vec<String> = site
            .inline_cache()
            .cached_classes(program.site_bci)
            .into_iter()
            .flatten()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);

        let before = vm.stats;
        interpret(&mut vm, program.driver.clone(), "describe:", &[receivers[2].clone()])
            .expect("interpret error");
        assert_eq!(vm.stats.lookups - before.lookups, 2);
        assert_eq!(vm.stats.cache_hits, before.cache_hits);

        let before = vm.stats;
        interpret(&mut vm, program.driver.clone(), "describe:", &[receivers[1].clone()])
            .expect("interpret error");
        assert_eq!(vm.stats.lookups - before.lookups, 1);
        assert_eq!(vm.stats.cache_hits - before.cache_hits, 1);
    }

    #[test]
    fn flushed_cache_is_refilled() {
        let mut vm = vm();
        let program = demos::polymorphic(&mut vm);
        let a = vm.new_instance(program.classes[0].clone());
        interpret(&mut vm, program.driver.clone(), "describe:", &[a.clone()]).expect("run");
        assert_eq!(program.site_method.inline_cache().occupancy(program.site_bci), 1);

        program.site_method.flush_inline_cache();
        assert_eq!(program.site_method.inline_cache().occupancy(program.site_bci), 0);

        let before = vm.stats;
        interpret(&mut vm, program.driver.clone(), "describe:", &[a]).expect("run");
        assert_eq!(vm.stats.lookups - before.lookups, 2);
    }

    #[test]
    fn failed_lookup_is_cached_at_the_send_site() {
        let mut vm = vm();
        let frobnicate = vm.symbol_value("frobnicate");
        let handler = method(&vm, "doesNotUnderstand:", 2, 0, vec![], |b| {
            b.push_argument(1, 0);
            b.return_local();
        });
        let run = method(&vm, "run", 1, 0, vec![frobnicate], |b| {
            b.push_argument(0, 0);
            b.send(0, 1);
            b.return_local();
        });
        let builder = ClassBuilder::new(vm.symbol("Vague")).method(handler).method(run.clone());
        let class = vm.define_class(builder);
        let receiver = vm.new_instance(class);

        interpret(&mut vm, receiver.clone(), "run", &[]).expect("first run");
        assert_eq!(run.inline_cache().occupancy(3), 1);

        let before = vm.stats;
        let value = interpret(&mut vm, receiver, "run", &[]).expect("second run");
        assert!(matches!(value, Value::Symbol(s) if s.as_str() == "frobnicate"));
        // The entry send and the `doesNotUnderstand:` reroute are uncached;
        // the failing site itself is not searched again.
        assert_eq!(vm.stats.cache_hits - before.cache_hits, 1);
        assert_eq!(vm.stats.lookups - before.lookups, 2);
    }

    // ── Blocks and returns ─────────────────────────────────────────

    #[test]
    fn non_local_return_unwinds_to_home() {
        let mut vm = vm();
        let program = demos::non_local_return(&mut vm);
        let value = interpret(&mut vm, program.receiver.clone(), "run", &[])
            .expect("interpret error");
        // `find` returns 42 from inside the block; the fall-through value
        // after the block call must not be reached.
        assert_eq!(expect_int(value), 42);
        assert_eq!(vm.transcript.contents(), "");
    }

    #[test]
    fn escaped_block_sends_escaped_block_once() {
        let mut vm = vm();
        let program = demos::escaped_block(&mut vm);
        let value = interpret(&mut vm, program.receiver.clone(), "run", &[])
            .expect("interpret error");
        assert_eq!(vm.transcript.contents(), "escaped\n");
        assert!(matches!(value, Value::Symbol(s) if s.as_str() == "recovered"));
    }

    #[test]
    fn escaped_block_without_handler_aborts() {
        let mut vm = vm();
        let ret = method(&vm, "value", 1, 0, vec![Value::Integer(1)], |b| {
            b.push_constant(0);
            b.return_non_local();
        });
        let make = method(&vm, "make", 1, 0, vec![Value::Method(ret)], |b| {
            b.push_block(0);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Maker")).method(make));
        let receiver = vm.new_instance(class);
        let block = interpret(&mut vm, receiver, "make", &[]).expect("make");

        let err = interpret(&mut vm, block, "value", &[]).unwrap_err();
        assert!(matches!(
            err.error,
            RuntimeError::Unhandled { handler: "escapedBlock:", .. }
        ));
    }

    #[test]
    fn closure_writes_are_shared_with_home() {
        let mut vm = vm();
        let program = demos::counter(&mut vm);
        let value = interpret(&mut vm, program.receiver.clone(), "run", &[])
            .expect("interpret error");
        assert_eq!(expect_int(value), 3);
    }

    #[test]
    fn block_with_arguments() {
        let mut vm = vm();
        let plus = vm.symbol_value("+");
        let body = method(&vm, "value:with:", 3, 0, vec![plus], |b| {
            b.push_argument(1, 0);
            b.push_argument(2, 0);
            b.send(0, 2);
            b.return_local();
        });
        let value_with = vm.symbol_value("value:with:");
        let run = method(
            &vm,
            "run",
            1,
            0,
            vec![Value::Method(body), Value::Integer(3), Value::Integer(4), value_with],
            |b| {
                b.push_block(0);
                b.push_constant(1);
                b.push_constant(2);
                b.send(3, 3);
                b.return_local();
            },
        );
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Summer")).method(run));
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "run", &[]).expect("interpret error");
        assert_eq!(expect_int(value), 7);
    }

    /// ```text
    /// Finder>>run: relay    ^5 + (self find: relay)
    /// Finder>>report: relay  ^(5 + (self find: relay)) frobnicate
    /// Finder>>find: relay   ^(relay call: [ ^7 ]) + 100
    /// Relay>>call: aBlock   ^aBlock value + 1000
    /// ```
    fn finder_and_relay(vm: &mut VM) -> (Value, Value) {
        let plus = vm.symbol_value("+");
        let find_sel = vm.symbol_value("find:");
        let call_sel = vm.symbol_value("call:");
        let value_sel = vm.symbol_value("value");
        let frobnicate = vm.symbol_value("frobnicate");

        let call = method(
            vm,
            "call:",
            2,
            0,
            vec![value_sel, Value::Integer(1000), plus.clone()],
            |b| {
                b.push_argument(1, 0);
                b.send(0, 1);
                b.push_constant(1);
                b.send(2, 2);
                b.return_local();
            },
        );
        let body = method(vm, "value", 1, 0, vec![Value::Integer(7)], |b| {
            b.push_constant(0);
            b.return_non_local();
        });
        let find = method(
            vm,
            "find:",
            2,
            0,
            vec![Value::Method(body), call_sel, Value::Integer(100), plus.clone()],
            |b| {
                b.push_argument(1, 0);
                b.push_block(0);
                b.send(1, 2);
                b.push_constant(2);
                b.send(3, 2);
                b.return_local();
            },
        );
        let caller = |b: &mut BytecodeBuilder| {
            b.push_constant(0);
            b.push_argument(0, 0);
            b.push_argument(1, 0);
            b.send(1, 2);
            b.send(2, 2);
        };
        let run = method(
            vm,
            "run:",
            2,
            0,
            vec![Value::Integer(5), find_sel.clone(), plus.clone()],
            |b| {
                caller(b);
                b.return_local();
            },
        );
        let report = method(
            vm,
            "report:",
            2,
            0,
            vec![Value::Integer(5), find_sel, plus, frobnicate],
            |b| {
                caller(b);
                b.send(3, 1);
                b.return_local();
            },
        );

        let relay = ClassBuilder::new(vm.symbol("Relay")).method(call);
        let relay = vm.define_class(relay);
        let finder = ClassBuilder::new(vm.symbol("Finder"))
            .method(find)
            .method(run)
            .method(report);
        let finder = vm.define_class(finder);
        (vm.new_instance(finder), vm.new_instance(relay))
    }

    #[test]
    fn non_local_return_skips_intermediate_frames() {
        let mut vm = vm();
        let (finder, relay) = finder_and_relay(&mut vm);
        let value = interpret(&mut vm, finder, "run:", &[relay]).expect("interpret error");
        // 5 + 7: neither `+ 1000` in the relay nor `+ 100` in `find:` runs,
        // and the 5 waiting on `run:`'s stack survives.
        assert_eq!(expect_int(value), 12);
    }

    #[test]
    fn non_local_return_leaves_only_the_home_caller() {
        let mut vm = vm();
        let (finder, relay) = finder_and_relay(&mut vm);
        let err = interpret(&mut vm, finder, "report:", &[relay]).unwrap_err();
        assert_eq!(err.error.to_string(), "12 doesNotUnderstand: #frobnicate");
        // Only the trampoline and `report:` are left once 12 is in hand.
        assert_eq!(err.backtrace.len(), 2);
        assert!(err.backtrace[1].starts_with("Finder>>#report:"), "{:?}", err.backtrace);
    }

    #[test]
    fn escaped_block_reports_to_the_invoking_receiver() {
        let mut vm = vm();
        let make_sel = vm.symbol_value("make");
        let value_sel = vm.symbol_value("value");
        let println = vm.symbol_value("println");
        let plus = vm.symbol_value("+");

        let body = method(&vm, "value", 1, 0, vec![Value::Integer(7)], |b| {
            b.push_constant(0);
            b.return_non_local();
        });
        let make = method(&vm, "make", 1, 0, vec![Value::Method(body)], |b| {
            b.push_block(0);
            b.return_local();
        });
        let leaker_handler = method(
            &vm,
            "escapedBlock:",
            2,
            0,
            vec![Value::string("leaker"), println, Value::Integer(0)],
            |b| {
                b.push_constant(0);
                b.send(1, 1);
                b.pop();
                b.push_constant(2);
                b.return_local();
            },
        );
        let handler = method(&vm, "escapedBlock:", 2, 0, vec![Value::Integer(100)], |b| {
            b.push_constant(0);
            b.return_local();
        });
        let go = method(
            &vm,
            "go:",
            2,
            0,
            vec![Value::Integer(1), make_sel, value_sel, plus],
            |b| {
                b.push_constant(0);
                b.push_argument(1, 0);
                b.send(1, 1);
                b.send(2, 1);
                b.send(3, 2);
                b.return_local();
            },
        );

        let leaker = ClassBuilder::new(vm.symbol("Leaker")).method(make).method(leaker_handler);
        let leaker = vm.define_class(leaker);
        let bystander = ClassBuilder::new(vm.symbol("Bystander")).method(handler).method(go);
        let bystander = vm.define_class(bystander);
        let leaker = vm.new_instance(leaker);
        let bystander = vm.new_instance(bystander);

        let value = interpret(&mut vm, bystander, "go:", &[leaker]).expect("interpret error");
        // 1 + 100: the handler of the frame that evaluated the block answers,
        // and the block was taken off that frame's stack.
        assert_eq!(expect_int(value), 101);
        assert_eq!(vm.transcript.contents(), "");
    }

    #[test]
    fn block_assigns_home_argument() {
        let mut vm = vm();
        let value_sel = vm.symbol_value("value");
        let body = method(&vm, "value", 1, 0, vec![Value::Integer(99)], |b| {
            b.push_constant(0);
            b.pop_argument(1, 1);
            b.push_argument(1, 1);
            b.return_local();
        });
        // set: x  [ x := 99 ] value. ^x
        let set = method(&vm, "set:", 2, 0, vec![Value::Method(body), value_sel], |b| {
            b.push_block(0);
            b.send(1, 1);
            b.pop();
            b.push_argument(1, 0);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Setter")).method(set));
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "set:", &[Value::Integer(5)])
            .expect("interpret error");
        assert_eq!(expect_int(value), 99);
    }

    // ── Object-level errors ────────────────────────────────────────

    #[test]
    fn unknown_global_is_routed_to_self() {
        let mut vm = vm();
        let missing = vm.symbol_value("Missing");
        let handler = method(&vm, "unknownGlobal:", 2, 0, vec![], |b| {
            b.push_argument(1, 0);
            b.return_local();
        });
        let run = method(&vm, "run", 1, 0, vec![missing], |b| {
            b.push_global(0);
            b.return_local();
        });
        let class = vm.define_class(
            ClassBuilder::new(vm.symbol("Lenient")).method(handler).method(run),
        );
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "run", &[]).expect("interpret error");
        assert!(matches!(value, Value::Symbol(s) if s.as_str() == "Missing"));
    }

    #[test]
    fn known_global_is_pushed() {
        let mut vm = vm();
        let name = vm.symbol_value("Integer");
        let run = method(&vm, "run", 1, 0, vec![name], |b| {
            b.push_global(0);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Reader")).method(run));
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "run", &[]).expect("interpret error");
        assert!(matches!(value, Value::Class(c) if c.name().as_str() == "Integer"));
    }

    #[test]
    fn does_not_understand_override_receives_selector() {
        let mut vm = vm();
        let handler = method(&vm, "doesNotUnderstand:", 2, 0, vec![], |b| {
            b.push_argument(1, 0);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Forgiving")).method(handler));
        let receiver = vm.new_instance(class);
        let value = interpret(&mut vm, receiver, "frobnicate:with:", &[
            Value::Integer(1),
            Value::Integer(2),
        ])
        .expect("interpret error");
        assert!(matches!(value, Value::Symbol(s) if s.as_str() == "frobnicate:with:"));
    }

    #[test]
    fn unhandled_does_not_understand_aborts_with_backtrace() {
        let mut vm = vm();
        let err = interpret(&mut vm, Value::Integer(3), "frobnicate", &[]).unwrap_err();
        match &err.error {
            RuntimeError::Unhandled { handler, argument, .. } => {
                assert_eq!(*handler, "doesNotUnderstand:");
                assert_eq!(argument, "#frobnicate");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(err.backtrace, vec!["nil>>#bootstrap @bi: 3".to_string()]);
    }

    // ── Fatal errors ───────────────────────────────────────────────

    #[test]
    fn invalid_opcode_aborts() {
        let mut vm = vm();
        let bad = Method::new(vm.symbol("bad"), vec![0xEE], vec![], 1, 0, 1);
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Broken")).method(bad));
        let receiver = vm.new_instance(class);
        let err = interpret(&mut vm, receiver, "bad", &[]).unwrap_err();
        assert!(matches!(
            err.error,
            RuntimeError::Decode(DecodeError::InvalidOpcode { byte: 0xEE, offset: 0 })
        ));
        assert_eq!(err.backtrace.len(), 2);
        assert_eq!(err.backtrace[1], "Broken>>#bad @bi: 0");
    }

    #[test]
    fn send_literal_must_be_a_symbol() {
        let mut vm = vm();
        let run = method(&vm, "run", 1, 0, vec![Value::Integer(5)], |b| {
            b.push_argument(0, 0);
            b.send(0, 1);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Odd")).method(run));
        let receiver = vm.new_instance(class);
        let err = interpret(&mut vm, receiver, "run", &[]).unwrap_err();
        assert!(matches!(
            err.error,
            RuntimeError::LiteralKind { expected: "symbol", got: "integer", .. }
        ));
    }

    #[test]
    fn field_out_of_range_aborts() {
        let mut vm = vm();
        let peek = method(&vm, "peek", 1, 0, vec![], |b| {
            b.push_field(0);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Peeker")).method(peek));
        let receiver = vm.new_instance(class);
        let err = interpret(&mut vm, receiver, "peek", &[]).unwrap_err();
        assert!(matches!(
            err.error,
            RuntimeError::Access(AccessError::FieldOutOfBounds { index: 0, len: 0 })
        ));
    }

    #[test]
    fn deep_recursion_overflows() {
        let mut vm = VM::new(VmSettings {
            max_frames: 32,
            ..VmSettings::default()
        });
        vm.transcript = Transcript::capture();
        let recurse = vm.symbol_value("recurse");
        let run = method(&vm, "recurse", 1, 0, vec![recurse], |b| {
            b.push_argument(0, 0);
            b.send(0, 1);
            b.return_local();
        });
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Loop")).method(run));
        let receiver = vm.new_instance(class);
        let err = interpret(&mut vm, receiver, "recurse", &[]).unwrap_err();
        assert!(matches!(err.error, RuntimeError::StackOverflow { depth: 32 }));
        assert_eq!(err.backtrace.len(), 32);
    }

    #[test]
    fn unbalanced_stack_primitive_is_fatal() {
        fn leaves_extra(
            _vm: &mut VM,
            state: &mut InterpreterState,
            _primitive: &Primitive,
        ) -> Result<(), RuntimeError> {
            state.current()?.push(Value::Nil)?;
            Ok(())
        }

        let mut vm = vm();
        vm.primitives.push(PrimitiveDesc::stack("Object", "leak", leaves_extra));
        let leak = vm.primitive("leak", "Object").expect("leak");
        let class = vm.define_class(ClassBuilder::new(vm.symbol("Leaky")).primitive(leak));
        let receiver = vm.new_instance(class);
        let err = interpret(&mut vm, receiver, "leak", &[]).unwrap_err();
        assert!(matches!(
            err.error,
            RuntimeError::StackImbalance { expected: 1, actual: 2, .. }
        ));
    }

    // ── Super sends and fields ─────────────────────────────────────

    #[test]
    fn super_send_starts_at_holder_superclass() {
        let mut vm = vm();
        let program = demos::super_send(&mut vm);
        let value = interpret(&mut vm, program.receiver.clone(), "value", &[])
            .expect("interpret error");
        assert_eq!(expect_int(value), 110);
    }

    #[test]
    fn fields_round_trip_through_bytecode() {
        let mut vm = vm();
        let set = method(&vm, "x:", 2, 0, vec![], |b| {
            b.push_argument(1, 0);
            b.pop_field(0);
            b.push_argument(0, 0);
            b.return_local();
        });
        let get = method(&vm, "x", 1, 0, vec![], |b| {
            b.push_field(0);
            b.return_local();
        });
        let class = vm.define_class(
            ClassBuilder::new(vm.symbol("Cell"))
                .field(vm.symbol("x"))
                .method(set)
                .method(get),
        );
        let cell = vm.new_instance(class);
        interpret(&mut vm, cell.clone(), "x:", &[Value::Integer(9)]).expect("set");
        let value = interpret(&mut vm, cell, "x", &[]).expect("get");
        assert_eq!(expect_int(value), 9);
    }

    #[test]
    fn bytecodes_have_fixed_stack_effects() {
        /// Replace the receiver with the depth of the stack below it.
        fn operand_depth(
            _vm: &mut VM,
            state: &mut InterpreterState,
            _primitive: &Primitive,
        ) -> Result<(), RuntimeError> {
            let frame = state.current()?;
            frame.pop()?;
            let depth = frame.stack_depth() as i64;
            frame.push(Value::Integer(depth))?;
            Ok(())
        }

        let mut vm = vm();
        vm.primitives.push(PrimitiveDesc::stack("Object", "depth", operand_depth));
        let plus = vm.symbol("+");
        let filler = method(&vm, "value", 1, 0, vec![], |b| {
            b.push_argument(0, 0);
            b.return_local();
        });
        // 0: #depth  1: 3  2: #Integer  3: block  4: #+
        let literals = vec![
            vm.symbol_value("depth"),
            Value::Integer(3),
            vm.symbol_value("Integer"),
            Value::Method(filler),
            Value::Symbol(plus),
        ];

        let cases: [(&str, i64, fn(&mut BytecodeBuilder)); 9] = [
            ("push_constant", 1, |b| b.push_constant(1)),
            ("push_constant dup", 2, |b| {
                b.push_constant(1);
                b.dup();
            }),
            ("push_constant dup pop", 1, |b| {
                b.push_constant(1);
                b.dup();
                b.pop();
            }),
            ("push_field pop_field", 0, |b| {
                b.push_field(0);
                b.pop_field(0);
            }),
            ("push_global pop", 0, |b| {
                b.push_global(2);
                b.pop();
            }),
            ("push_local pop_local", 0, |b| {
                b.push_local(0, 0);
                b.pop_local(0, 0);
            }),
            ("push_argument pop_argument", 0, |b| {
                b.push_argument(0, 0);
                b.pop_argument(0, 0);
            }),
            ("push_block pop", 0, |b| {
                b.push_block(3);
                b.pop();
            }),
            ("binary send", 1, |b| {
                b.push_constant(1);
                b.push_constant(1);
                b.send(4, 2);
            }),
        ];

        for (i, (name, effect, emit)) in cases.into_iter().enumerate() {
            let measure = method(&vm, "measure", 1, 1, literals.clone(), |b| {
                b.push_argument(0, 0);
                b.send(0, 1);
                emit(b);
                b.push_argument(0, 0);
                b.send(0, 1);
                b.return_local();
            });
            let depth = vm.primitive("depth", "Object").expect("depth");
            let builder = ClassBuilder::new(vm.symbol(&format!("Gauge{i}")))
                .field(vm.symbol("x"))
                .primitive(depth)
                .method(measure);
            let class = vm.define_class(builder);
            let receiver = vm.new_instance(class);
            let value = interpret(&mut vm, receiver, "measure", &[]).expect("interpret error");
            // The first depth reading stays below the second.
            assert_eq!(expect_int(value) - 1, effect, "{name}");
        }
    }
}
