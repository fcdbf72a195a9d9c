use object::{Primitive, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError, activate_block};
use crate::primitives::type_error;

/// `value`, `value:`, `value:with:`, `value:with:with:`
///
/// Activates the block's body; the result replaces the block and its
/// arguments when the body returns.
pub fn block_value(
    vm: &mut VM,
    state: &mut InterpreterState,
    primitive: &Primitive,
) -> Result<(), RuntimeError> {
    activate_block(vm, state, primitive.signature().arity())
}

pub fn block_num_args(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    match &receiver {
        Value::Block(block) => Ok(Value::Integer(block.num_args() as i64 - 1)),
        other => Err(type_error("block", other)),
    }
}
