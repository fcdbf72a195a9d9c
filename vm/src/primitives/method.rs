use object::{Invokable, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::type_error;

fn expect_invokable(value: &Value) -> Result<Invokable, RuntimeError> {
    match value {
        Value::Method(m) => Ok(Invokable::Method(m.clone())),
        Value::Primitive(p) => Ok(Invokable::Primitive(p.clone())),
        other => Err(type_error("method", other)),
    }
}

pub fn invokable_signature(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let inv = expect_invokable(&receiver)?;
    Ok(Value::Symbol(inv.signature().clone()))
}

/// The class the method is installed in, or nil.
pub fn invokable_holder(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let inv = expect_invokable(&receiver)?;
    Ok(inv.holder().map(Value::Class).unwrap_or(Value::Nil))
}
