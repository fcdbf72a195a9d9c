use num_bigint::BigInt;
use object::Value;

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::{arg, bignum, expect_integer, type_error};

/// Result of an i64 operation, promoted to a big integer when it overflows.
fn checked_or_big(
    checked: Option<i64>,
    big: impl FnOnce() -> BigInt,
) -> Value {
    match checked {
        Some(n) => Value::Integer(n),
        None => Value::big(big()),
    }
}

/// Floor modulo: the result takes the sign of the divisor.
pub(crate) fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

pub fn fixnum_add(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    match arg(args, 0)? {
        Value::Integer(b) => Ok(checked_or_big(a.checked_add(*b), || {
            BigInt::from(a) + BigInt::from(*b)
        })),
        Value::BigInteger(b) => Ok(bignum::normalize(BigInt::from(a) + &**b)),
        Value::Double(b) => Ok(Value::Double(a as f64 + b)),
        other => Err(type_error("number", other)),
    }
}

pub fn fixnum_sub(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    match arg(args, 0)? {
        Value::Integer(b) => Ok(checked_or_big(a.checked_sub(*b), || {
            BigInt::from(a) - BigInt::from(*b)
        })),
        Value::BigInteger(b) => Ok(bignum::normalize(BigInt::from(a) - &**b)),
        Value::Double(b) => Ok(Value::Double(a as f64 - b)),
        other => Err(type_error("number", other)),
    }
}

pub fn fixnum_mul(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    match arg(args, 0)? {
        Value::Integer(b) => Ok(checked_or_big(a.checked_mul(*b), || {
            BigInt::from(a) * BigInt::from(*b)
        })),
        Value::BigInteger(b) => Ok(bignum::normalize(BigInt::from(a) * &**b)),
        Value::Double(b) => Ok(Value::Double(a as f64 * b)),
        other => Err(type_error("number", other)),
    }
}

/// Integer division, truncating toward zero.
pub fn fixnum_div(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    match arg(args, 0)? {
        Value::Integer(0) => Err(RuntimeError::DivisionByZero),
        Value::Integer(b) => Ok(checked_or_big(a.checked_div(*b), || {
            -BigInt::from(a)
        })),
        Value::BigInteger(b) => bignum::div(&BigInt::from(a), b),
        Value::Double(b) => Ok(Value::Double((a as f64 / b).trunc())),
        other => Err(type_error("number", other)),
    }
}

pub fn fixnum_mod(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    match arg(args, 0)? {
        Value::Integer(0) => Err(RuntimeError::DivisionByZero),
        Value::Integer(b) => Ok(Value::Integer(floor_mod(a, *b))),
        Value::BigInteger(b) => bignum::modulo(&BigInt::from(a), b),
        other => Err(type_error("integer", other)),
    }
}

fn compare(
    receiver: &Value,
    args: &[Value],
    op: fn(std::cmp::Ordering) -> bool,
) -> Result<Option<bool>, RuntimeError> {
    let a = expect_integer(receiver)?;
    let ordering = match arg(args, 0)? {
        Value::Integer(b) => Some(a.cmp(b)),
        Value::BigInteger(b) => Some(BigInt::from(a).cmp(&**b)),
        Value::Double(b) => (a as f64).partial_cmp(b),
        _ => return Ok(None),
    };
    Ok(ordering.map(op))
}

pub fn fixnum_eq(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let eq = compare(&receiver, args, |o| o.is_eq())?;
    Ok(vm.boolean(eq.unwrap_or(false)))
}

pub fn fixnum_lt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match compare(&receiver, args, |o| o.is_lt())? {
        Some(b) => Ok(vm.boolean(b)),
        None => Err(type_error("number", arg(args, 0)?)),
    }
}

pub fn fixnum_gt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match compare(&receiver, args, |o| o.is_gt())? {
        Some(b) => Ok(vm.boolean(b)),
        None => Err(type_error("number", arg(args, 0)?)),
    }
}

pub fn fixnum_le(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match compare(&receiver, args, |o| o.is_le())? {
        Some(b) => Ok(vm.boolean(b)),
        None => Err(type_error("number", arg(args, 0)?)),
    }
}

pub fn fixnum_ge(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match compare(&receiver, args, |o| o.is_ge())? {
        Some(b) => Ok(vm.boolean(b)),
        None => Err(type_error("number", arg(args, 0)?)),
    }
}

pub fn fixnum_neg(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    Ok(checked_or_big(a.checked_neg(), || -BigInt::from(a)))
}

/// Square root; an integer when exact, otherwise a double.
pub fn fixnum_sqrt(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    let root = (a as f64).sqrt();
    if root.fract() == 0.0 && (root as i64).checked_mul(root as i64) == Some(a) {
        Ok(Value::Integer(root as i64))
    } else {
        Ok(Value::Double(root))
    }
}

pub fn fixnum_to_string(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    Ok(Value::string(&a.to_string()))
}

pub fn fixnum_to_double(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_integer(&receiver)?;
    Ok(Value::Double(a as f64))
}
