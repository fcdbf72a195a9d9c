use object::{Primitive, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError, send_message};
use crate::primitives::{arg, type_error};

fn expect_boolean(vm: &VM, value: &Value) -> Result<bool, RuntimeError> {
    vm.special
        .as_boolean(value)
        .ok_or_else(|| type_error("boolean", value))
}

/// Receiver of the send being executed, `arity - 1` slots below the top.
fn stack_receiver(state: &InterpreterState, arity: usize) -> Result<Value, RuntimeError> {
    Ok(state.current()?.get_stack_element(arity - 1)?)
}

/// Replace the send's receiver and arguments with `chosen` and send it
/// `value`. Blocks evaluate, anything else answers itself.
fn evaluate(
    vm: &mut VM,
    state: &mut InterpreterState,
    chosen: Value,
    arity: usize,
) -> Result<(), RuntimeError> {
    let frame = state.current()?;
    frame.pop_n(arity)?;
    frame.push(chosen)?;
    let value = vm.symbol("value");
    send_message(vm, state, &frame, value)
}

fn answer(state: &InterpreterState, value: Value, arity: usize) -> Result<(), RuntimeError> {
    let frame = state.current()?;
    frame.pop_n(arity)?;
    frame.push(value)?;
    Ok(())
}

/// One-armed conditional: evaluate the argument when the receiver is
/// `when`, otherwise answer nil.
fn conditional(
    vm: &mut VM,
    state: &mut InterpreterState,
    when: bool,
) -> Result<(), RuntimeError> {
    let receiver = stack_receiver(state, 2)?;
    if expect_boolean(vm, &receiver)? == when {
        let branch = state.current()?.get_stack_element(0)?;
        evaluate(vm, state, branch, 2)
    } else {
        answer(state, Value::Nil, 2)
    }
}

/// Two-armed conditional: `first` runs when the receiver is `when`.
fn choose(
    vm: &mut VM,
    state: &mut InterpreterState,
    when: bool,
) -> Result<(), RuntimeError> {
    let frame = state.current()?;
    let receiver = stack_receiver(state, 3)?;
    let branch = if expect_boolean(vm, &receiver)? == when {
        frame.get_stack_element(1)?
    } else {
        frame.get_stack_element(0)?
    };
    evaluate(vm, state, branch, 3)
}

pub fn boolean_if_true(
    vm: &mut VM,
    state: &mut InterpreterState,
    _primitive: &Primitive,
) -> Result<(), RuntimeError> {
    conditional(vm, state, true)
}

pub fn boolean_if_false(
    vm: &mut VM,
    state: &mut InterpreterState,
    _primitive: &Primitive,
) -> Result<(), RuntimeError> {
    conditional(vm, state, false)
}

pub fn boolean_if_true_if_false(
    vm: &mut VM,
    state: &mut InterpreterState,
    _primitive: &Primitive,
) -> Result<(), RuntimeError> {
    choose(vm, state, true)
}

pub fn boolean_if_false_if_true(
    vm: &mut VM,
    state: &mut InterpreterState,
    _primitive: &Primitive,
) -> Result<(), RuntimeError> {
    choose(vm, state, false)
}

pub fn boolean_not(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let b = expect_boolean(vm, &receiver)?;
    Ok(vm.boolean(!b))
}

/// Non-short-circuit and.
pub fn boolean_and(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let b = expect_boolean(vm, &receiver)?;
    Ok(if b { arg(args, 0)?.clone() } else { receiver })
}

/// Non-short-circuit or.
pub fn boolean_or(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let b = expect_boolean(vm, &receiver)?;
    Ok(if b { receiver } else { arg(args, 0)?.clone() })
}
