use std::rc::Rc;

use object::{Class, Primitive, Symbol, Value};

use crate::VM;
use crate::interpreter::{InterpreterState, RuntimeError};

pub mod bignum;
pub mod block;
pub mod boolean;
pub mod class;
pub mod fixnum;
pub mod float;
pub mod method;
pub mod objects;
pub mod string;

/// A primitive computed from the receiver and arguments alone. The
/// dispatcher replaces them on the caller's stack with the result.
pub type ValueFn = fn(
    &mut VM,
    &mut InterpreterState,
    Value,
    &[Value],
) -> Result<Value, RuntimeError>;

/// A primitive that works on the caller's stack directly, for control
/// flow that has to activate a frame. It must leave the stack one value
/// shorter than the send's arity, or activate a frame that will.
pub type StackFn =
    fn(&mut VM, &mut InterpreterState, &Primitive) -> Result<(), RuntimeError>;

#[derive(Clone, Copy)]
pub enum PrimitiveFn {
    Value(ValueFn),
    Stack(StackFn),
}

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    /// Name of the kernel class the primitive is installed in.
    pub class: &'static str,
    /// Selector it answers to.
    pub name: &'static str,
    /// Installed on the metaclass instead of the class.
    pub class_side: bool,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(class: &'static str, name: &'static str, func: ValueFn) -> Self {
        Self {
            class,
            name,
            class_side: false,
            func: PrimitiveFn::Value(func),
        }
    }

    pub const fn stack(class: &'static str, name: &'static str, func: StackFn) -> Self {
        Self {
            class,
            name,
            class_side: false,
            func: PrimitiveFn::Stack(func),
        }
    }

    pub const fn class_side(mut self) -> Self {
        self.class_side = true;
        self
    }
}

pub fn default_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("Object", "==", objects::object_identical),
        PrimitiveDesc::new("Object", "class", objects::object_class),
        PrimitiveDesc::new("Object", "printString", objects::object_print_string),
        PrimitiveDesc::new("Object", "respondsTo:", objects::object_responds_to),
        PrimitiveDesc::new("Object", "value", objects::object_value),
        PrimitiveDesc::new("Object", "isNil", objects::object_is_nil),
        PrimitiveDesc::new("Object", "notNil", objects::object_not_nil),
        PrimitiveDesc::stack("Object", "perform:", objects::object_perform),
        PrimitiveDesc::new(
            "Object",
            "doesNotUnderstand:",
            objects::object_does_not_understand,
        ),
        PrimitiveDesc::new("Object", "unknownGlobal:", objects::object_unknown_global),
        PrimitiveDesc::new("Object", "escapedBlock:", objects::object_escaped_block),
        PrimitiveDesc::new("Class", "new", class::class_new),
        PrimitiveDesc::new("Class", "name", class::class_name),
        PrimitiveDesc::new("Class", "superclass", class::class_superclass),
        PrimitiveDesc::new("Class", ">>", class::class_method_at),
        PrimitiveDesc::new("Integer", "+", fixnum::fixnum_add),
        PrimitiveDesc::new("Integer", "-", fixnum::fixnum_sub),
        PrimitiveDesc::new("Integer", "*", fixnum::fixnum_mul),
        PrimitiveDesc::new("Integer", "/", fixnum::fixnum_div),
        PrimitiveDesc::new("Integer", "%", fixnum::fixnum_mod),
        PrimitiveDesc::new("Integer", "=", fixnum::fixnum_eq),
        PrimitiveDesc::new("Integer", "<", fixnum::fixnum_lt),
        PrimitiveDesc::new("Integer", ">", fixnum::fixnum_gt),
        PrimitiveDesc::new("Integer", "<=", fixnum::fixnum_le),
        PrimitiveDesc::new("Integer", ">=", fixnum::fixnum_ge),
        PrimitiveDesc::new("Integer", "negated", fixnum::fixnum_neg),
        PrimitiveDesc::new("Integer", "sqrt", fixnum::fixnum_sqrt),
        PrimitiveDesc::new("Integer", "asString", fixnum::fixnum_to_string),
        PrimitiveDesc::new("Integer", "asDouble", fixnum::fixnum_to_double),
        PrimitiveDesc::new("BigInteger", "+", bignum::bignum_add),
        PrimitiveDesc::new("BigInteger", "-", bignum::bignum_sub),
        PrimitiveDesc::new("BigInteger", "*", bignum::bignum_mul),
        PrimitiveDesc::new("BigInteger", "/", bignum::bignum_div),
        PrimitiveDesc::new("BigInteger", "%", bignum::bignum_mod),
        PrimitiveDesc::new("BigInteger", "&", bignum::bignum_and),
        PrimitiveDesc::new("BigInteger", "=", bignum::bignum_eq),
        PrimitiveDesc::new("BigInteger", "<", bignum::bignum_lt),
        PrimitiveDesc::new("BigInteger", ">", bignum::bignum_gt),
        PrimitiveDesc::new("BigInteger", "negated", bignum::bignum_neg),
        PrimitiveDesc::new("BigInteger", "sqrt", bignum::bignum_sqrt),
        PrimitiveDesc::new("BigInteger", "asString", bignum::bignum_to_string),
        PrimitiveDesc::new("Double", "+", float::float_add),
        PrimitiveDesc::new("Double", "-", float::float_sub),
        PrimitiveDesc::new("Double", "*", float::float_mul),
        PrimitiveDesc::new("Double", "//", float::float_div),
        PrimitiveDesc::new("Double", "%", float::float_mod),
        PrimitiveDesc::new("Double", "=", float::float_eq),
        PrimitiveDesc::new("Double", "<", float::float_lt),
        PrimitiveDesc::new("Double", ">", float::float_gt),
        PrimitiveDesc::new("Double", "negated", float::float_neg),
        PrimitiveDesc::new("Double", "sqrt", float::float_sqrt),
        PrimitiveDesc::new("Double", "round", float::float_round),
        PrimitiveDesc::new("Double", "sin", float::float_sin),
        PrimitiveDesc::new("Double", "cos", float::float_cos),
        PrimitiveDesc::new("Double", "asInteger", float::float_to_integer),
        PrimitiveDesc::new("Double", "asString", float::float_to_string),
        PrimitiveDesc::new("Double", "PositiveInfinity", float::float_infinity)
            .class_side(),
        PrimitiveDesc::new("String", ",", string::string_concat),
        PrimitiveDesc::new("String", "length", string::string_length),
        PrimitiveDesc::new("String", "=", string::string_eq),
        PrimitiveDesc::new("String", "asString", string::string_to_string),
        PrimitiveDesc::new("String", "asSymbol", string::string_to_symbol),
        PrimitiveDesc::new("String", "print", string::string_print),
        PrimitiveDesc::new("String", "println", string::string_println),
        PrimitiveDesc::new("Symbol", "asString", string::symbol_to_string),
        PrimitiveDesc::new("Symbol", "arity", string::symbol_arity),
        PrimitiveDesc::new("Boolean", "not", boolean::boolean_not),
        PrimitiveDesc::new("Boolean", "&", boolean::boolean_and),
        PrimitiveDesc::new("Boolean", "|", boolean::boolean_or),
        PrimitiveDesc::stack("Boolean", "ifTrue:", boolean::boolean_if_true),
        PrimitiveDesc::stack("Boolean", "ifFalse:", boolean::boolean_if_false),
        PrimitiveDesc::stack(
            "Boolean",
            "ifTrue:ifFalse:",
            boolean::boolean_if_true_if_false,
        ),
        PrimitiveDesc::stack(
            "Boolean",
            "ifFalse:ifTrue:",
            boolean::boolean_if_false_if_true,
        ),
        PrimitiveDesc::new("Block", "numArgs", block::block_num_args),
        PrimitiveDesc::stack("Block1", "value", block::block_value),
        PrimitiveDesc::stack("Block2", "value:", block::block_value),
        PrimitiveDesc::stack("Block3", "value:with:", block::block_value),
        PrimitiveDesc::stack("Block4", "value:with:with:", block::block_value),
        PrimitiveDesc::new("Method", "signature", method::invokable_signature),
        PrimitiveDesc::new("Method", "holder", method::invokable_holder),
        PrimitiveDesc::new("Primitive", "signature", method::invokable_signature),
        PrimitiveDesc::new("Primitive", "holder", method::invokable_holder),
    ]
}

pub fn primitive_index_by_name(
    prims: &[PrimitiveDesc],
    class: &str,
    name: &str,
) -> Option<usize> {
    prims.iter().position(|p| p.class == class && p.name == name)
}

// ── Argument helpers ───────────────────────────────────────────────

pub(crate) fn type_error(expected: &'static str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        got: got.kind(),
    }
}

pub(crate) fn arg(args: &[Value], i: usize) -> Result<&Value, RuntimeError> {
    args.get(i).ok_or(RuntimeError::TypeMismatch {
        expected: "argument",
        got: "nothing",
    })
}

pub(crate) fn expect_integer(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(type_error("integer", other)),
    }
}

pub(crate) fn expect_symbol(value: &Value) -> Result<Symbol, RuntimeError> {
    match value {
        Value::Symbol(sym) => Ok(sym.clone()),
        other => Err(type_error("symbol", other)),
    }
}

pub(crate) fn expect_class(value: &Value) -> Result<Rc<Class>, RuntimeError> {
    match value {
        Value::Class(class) => Ok(class.clone()),
        other => Err(type_error("class", other)),
    }
}

/// Text of a string or symbol.
pub(crate) fn expect_text(value: &Value) -> Result<Rc<str>, RuntimeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Symbol(sym) => Ok(sym.as_str().into()),
        other => Err(type_error("string", other)),
    }
}

/// Display form used by `printString` and in diagnostics.
pub fn print_string(vm: &VM, value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Double(d) => float::format_double(*d),
        Value::BigInteger(n) => n.to_string(),
        Value::String(s) => s.to_string(),
        Value::Symbol(sym) => format!("#{sym}"),
        Value::Object(_) => match vm.special.as_boolean(value) {
            Some(b) => b.to_string(),
            None => {
                let name = vm.class_of(value).name().to_string();
                let article = match name.chars().next() {
                    Some('A' | 'E' | 'I' | 'O' | 'U') => "an",
                    _ => "a",
                };
                format!("{article} {name}")
            }
        },
        Value::Class(class) if class.is_metaclass() => format!("{} class", class.name()),
        Value::Class(class) => class.name().to_string(),
        Value::Block(block) => format!("a Block{}", block.num_args()),
        Value::Method(m) => format!("{m:?}"),
        Value::Primitive(p) => {
            let holder = p
                .holder()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "nil".to_string());
            format!("{holder}>>#{} (primitive)", p.signature())
        }
    }
}
