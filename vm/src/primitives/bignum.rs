use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use object::Value;

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::{arg, type_error};

/// Shrink to an `Integer` when the value fits.
pub(crate) fn normalize(n: BigInt) -> Value {
    match n.to_i64() {
        Some(small) => Value::Integer(small),
        None => Value::big(n),
    }
}

pub(crate) fn to_bigint(value: &Value) -> Result<BigInt, RuntimeError> {
    match value {
        Value::Integer(n) => Ok(BigInt::from(*n)),
        Value::BigInteger(n) => Ok((**n).clone()),
        other => Err(type_error("integer", other)),
    }
}

fn expect_bignum(value: &Value) -> Result<&BigInt, RuntimeError> {
    match value {
        Value::BigInteger(n) => Ok(n),
        other => Err(type_error("big integer", other)),
    }
}

pub(crate) fn div(a: &BigInt, b: &BigInt) -> Result<Value, RuntimeError> {
    if b.is_zero() {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(normalize(a / b))
}

/// Floor modulo, matching `Integer>>%`.
pub(crate) fn modulo(a: &BigInt, b: &BigInt) -> Result<Value, RuntimeError> {
    if b.is_zero() {
        return Err(RuntimeError::DivisionByZero);
    }
    let mut r = a % b;
    if !r.is_zero() && r.is_negative() != b.is_negative() {
        r += b;
    }
    Ok(normalize(r))
}

pub fn bignum_add(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    match arg(args, 0)? {
        Value::Double(b) => Ok(Value::Double(a.to_f64().unwrap_or(f64::NAN) + b)),
        other => Ok(normalize(a + to_bigint(other)?)),
    }
}

pub fn bignum_sub(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    match arg(args, 0)? {
        Value::Double(b) => Ok(Value::Double(a.to_f64().unwrap_or(f64::NAN) - b)),
        other => Ok(normalize(a - to_bigint(other)?)),
    }
}

pub fn bignum_mul(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    match arg(args, 0)? {
        Value::Double(b) => Ok(Value::Double(a.to_f64().unwrap_or(f64::NAN) * b)),
        other => Ok(normalize(a * to_bigint(other)?)),
    }
}

pub fn bignum_div(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    div(a, &to_bigint(arg(args, 0)?)?)
}

pub fn bignum_mod(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    modulo(a, &to_bigint(arg(args, 0)?)?)
}

pub fn bignum_and(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    Ok(normalize(a & to_bigint(arg(args, 0)?)?))
}

fn compare(receiver: &Value, other: &Value) -> Result<Option<Ordering>, RuntimeError> {
    let a = expect_bignum(receiver)?;
    Ok(match other {
        Value::Integer(_) | Value::BigInteger(_) => Some(a.cmp(&to_bigint(other)?)),
        Value::Double(b) => a.to_f64().and_then(|a| a.partial_cmp(b)),
        _ => None,
    })
}

pub fn bignum_eq(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let ordering = compare(&receiver, arg(args, 0)?)?;
    Ok(vm.boolean(ordering == Some(Ordering::Equal)))
}

pub fn bignum_lt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let other = arg(args, 0)?;
    match compare(&receiver, other)? {
        Some(o) => Ok(vm.boolean(o.is_lt())),
        None => Err(type_error("number", other)),
    }
}

pub fn bignum_gt(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let other = arg(args, 0)?;
    match compare(&receiver, other)? {
        Some(o) => Ok(vm.boolean(o.is_gt())),
        None => Err(type_error("number", other)),
    }
}

pub fn bignum_neg(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    Ok(normalize(-a))
}

pub fn bignum_sqrt(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    Ok(Value::Double(a.to_f64().unwrap_or(f64::NAN).sqrt()))
}

pub fn bignum_to_string(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_bignum(&receiver)?;
    Ok(Value::string(&a.to_string()))
}
