use object::{Primitive, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError, send_message};
use crate::primitives::{arg, expect_symbol, print_string};

pub fn object_identical(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let other = arg(args, 0)?;
    Ok(vm.boolean(receiver.identical(other)))
}

pub fn object_class(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Class(vm.class_of(&receiver)))
}

pub fn object_print_string(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::string(&print_string(vm, &receiver)))
}

pub fn object_responds_to(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let selector = expect_symbol(arg(args, 0)?)?;
    let found = vm.class_of(&receiver).lookup(&selector).is_some();
    Ok(vm.boolean(found))
}

/// Non-block objects evaluate to themselves.
pub fn object_value(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(receiver)
}

pub fn object_is_nil(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(receiver.is_nil()))
}

pub fn object_not_nil(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(vm.boolean(!receiver.is_nil()))
}

/// `perform: #selector` for unary selectors.
pub fn object_perform(
    vm: &mut VM,
    state: &mut InterpreterState,
    _primitive: &Primitive,
) -> Result<(), RuntimeError> {
    let frame = state.current()?;
    let selector = expect_symbol(&frame.get_stack_element(0)?)?;
    if selector.arity() != 1 {
        return Err(RuntimeError::TypeMismatch {
            expected: "unary selector",
            got: "keyword or binary selector",
        });
    }
    frame.pop()?;
    send_message(vm, state, &frame, selector)
}

fn unhandled(
    vm: &VM,
    handler: &'static str,
    receiver: &Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    Err(RuntimeError::Unhandled {
        handler,
        receiver: print_string(vm, receiver),
        argument: print_string(vm, arg(args, 0)?),
    })
}

pub fn object_does_not_understand(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    unhandled(vm, "doesNotUnderstand:", &receiver, args)
}

pub fn object_unknown_global(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    unhandled(vm, "unknownGlobal:", &receiver, args)
}

pub fn object_escaped_block(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    unhandled(vm, "escapedBlock:", &receiver, args)
}
