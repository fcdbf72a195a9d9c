use object::Value;

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};
use crate::primitives::{arg, expect_symbol, expect_text};

fn write_transcript(vm: &VM, s: &str) -> Result<(), RuntimeError> {
    vm.transcript.write_str(s).map_err(|_| RuntimeError::TypeMismatch {
        expected: "writable transcript",
        got: "closed stream",
    })
}

pub fn string_print(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let s = expect_text(&receiver)?;
    write_transcript(vm, &s)?;
    Ok(receiver)
}

pub fn string_println(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let s = expect_text(&receiver)?;
    write_transcript(vm, &format!("{s}\n"))?;
    Ok(receiver)
}

/// Length in characters.
pub fn string_length(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let s = expect_text(&receiver)?;
    Ok(Value::Integer(s.chars().count() as i64))
}

pub fn string_concat(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let a = expect_text(&receiver)?;
    let b = expect_text(arg(args, 0)?)?;
    let mut out = String::with_capacity(a.len() + b.len());
    out.push_str(&a);
    out.push_str(&b);
    Ok(Value::String(out.into()))
}

/// Strings compare by content. A symbol is only equal to itself.
pub fn string_eq(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let eq = match (&receiver, arg(args, 0)?) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Symbol(a), Value::Symbol(b)) => a == b,
        _ => false,
    };
    Ok(vm.boolean(eq))
}

pub fn string_to_string(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    Ok(Value::String(expect_text(&receiver)?))
}

pub fn string_to_symbol(
    vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let s = expect_text(&receiver)?;
    Ok(vm.symbol_value(&s))
}

pub fn symbol_to_string(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let sym = expect_symbol(&receiver)?;
    Ok(Value::string(sym.as_str()))
}

/// Number of values a send of this selector consumes, receiver included.
pub fn symbol_arity(
    _vm: &mut VM,
    _state: &mut InterpreterState,
    receiver: Value,
    _args: &[Value],
) -> Result<Value, RuntimeError> {
    let sym = expect_symbol(&receiver)?;
    Ok(Value::Integer(sym.arity() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Transcript, VmSettings};
    use crate::interpreter::interpret;

    fn vm() -> VM {
        let mut vm = VM::new(VmSettings::default());
        vm.transcript = Transcript::capture();
        vm
    }

    #[test]
    fn concat_accepts_symbols() {
        let mut vm = vm();
        let sym = vm.symbol_value("bar");
        let v = interpret(&mut vm, Value::string("foo"), ",", &[sym]).expect("interpret error");
        assert!(matches!(v, Value::String(s) if &*s == "foobar"));
    }

    #[test]
    fn println_goes_to_transcript() {
        let mut vm = vm();
        interpret(&mut vm, Value::string("hello"), "println", &[]).expect("println");
        interpret(&mut vm, Value::string("a"), "print", &[]).expect("print");
        assert_eq!(vm.transcript.contents(), "hello\na");
    }

    #[test]
    fn as_symbol_interns() {
        let mut vm = vm();
        let v = interpret(&mut vm, Value::string("at:put:"), "asSymbol", &[])
            .expect("interpret error");
        let expected = vm.symbol("at:put:");
        assert!(matches!(&v, Value::Symbol(s) if *s == expected));
        let arity = interpret(&mut vm, v, "arity", &[]).expect("interpret error");
        assert!(matches!(arity, Value::Integer(3)));
    }

    #[test]
    fn string_equality_is_by_content() {
        let mut vm = vm();
        let v = interpret(&mut vm, Value::string("ab"), "=", &[Value::string("ab")])
            .expect("interpret error");
        assert!(v.identical(&vm.boolean(true)));
        let sym = vm.symbol_value("ab");
        let v = interpret(&mut vm, Value::string("ab"), "=", &[sym]).expect("interpret error");
        assert!(v.identical(&vm.boolean(false)));
    }

    #[test]
    fn length_counts_characters() {
        let mut vm = vm();
        let v = interpret(&mut vm, Value::string("héllo"), "length", &[])
            .expect("interpret error");
        assert!(matches!(v, Value::Integer(5)));
    }
}
