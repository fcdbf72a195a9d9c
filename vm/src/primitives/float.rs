use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use object::Value;

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::{arg, bignum, type_error};

/// Widen any number to a double.
pub(crate) fn to_f64(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Double(d) => Ok(*d),
        Value::Integer(n) => Ok(*n as f64),
        Value::BigInteger(n) => Ok(n.to_f64().unwrap_or(f64::NAN)),
        other => Err(type_error("number", other)),
    }
}

fn expect_double(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Double(d) => Ok(*d),
        other => Err(type_error("double", other)),
    }
}

pub(crate) fn format_double(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{d:?}")
    }
}

/// Truncate a finite double to an integer of whatever size it needs.
fn truncate(d: f64) -> Result<Value, RuntimeError> {
    let t = d.trunc();
    if !t.is_finite() {
        return Err(RuntimeError::TypeMismatch {
            expected: "finite double",
            got: "non-finite double",
        });
    }
    match BigInt::from_f64(t) {
        Some(n) => Ok(bignum::normalize(n)),
        None => Err(RuntimeError::TypeMismatch {
            expected: "finite double",
            got: "non-finite double",
        }),
    }
}

pub fn float_add(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(Value::Double(a + b))
}

pub fn float_sub(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(Value::Double(a - b))
}

pub fn float_mul(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(Value::Double(a * b))
}

/// IEEE division: dividing by zero gives an infinity or NaN.
pub fn float_div(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(Value::Double(a / b))
}

/// Remainder with the sign of the receiver.
pub fn float_mod(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(Value::Double(a % b))
}

pub fn float_eq(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let eq = to_f64(arg(args, 0)?).map(|b| a == b).unwrap_or(false);
    Ok(vm.boolean(eq))
}

pub fn float_lt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(vm.boolean(a < b))
}

pub fn float_gt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_double(&receiver)?;
    let b = to_f64(arg(args, 0)?)?;
    Ok(vm.boolean(a > b))
}

pub fn float_neg(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Double(-expect_double(&receiver)?))
}

pub fn float_sqrt(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Double(expect_double(&receiver)?.sqrt()))
}

pub fn float_sin(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Double(expect_double(&receiver)?.sin()))
}

pub fn float_cos(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Double(expect_double(&receiver)?.cos()))
}

/// Round half away from zero.
pub fn float_round(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    truncate(expect_double(&receiver)?.round())
}

pub fn float_to_integer(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    truncate(expect_double(&receiver)?)
}

pub fn float_to_string(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::string(&format_double(expect_double(&receiver)?)))
}

/// `Double class>>PositiveInfinity`
pub fn float_infinity(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    _receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::Double(f64::INFINITY))
}
