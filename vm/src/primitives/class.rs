use object::{Instance, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::{arg, expect_class, expect_symbol};

pub fn class_new(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let class = expect_class(&receiver)?;
    Ok(Value::Object(Instance::new(class)))
}

pub fn class_name(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let class = expect_class(&receiver)?;
    Ok(Value::Symbol(class.name().clone()))
}

pub fn class_superclass(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let class = expect_class(&receiver)?;
    Ok(class
        .superclass()
        .map(|s| Value::Class(s.clone()))
        .unwrap_or(Value::Nil))
}

/// `Foo >> #bar`: the method defined directly in the class, or nil.
pub fn class_method_at(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let class = expect_class(&receiver)?;
    let selector = expect_symbol(arg(args, 0)?)?;
    Ok(class
        .local_method(&selector)
        .map(|inv| Value::from(inv.clone()))
        .unwrap_or(Value::Nil))
}
