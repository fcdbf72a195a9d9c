use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::class::Class;
use crate::method::{Invokable, Method, Primitive};
use crate::objects::{Block, Instance};
use crate::special::SpecialObjects;
use crate::symbol::Symbol;

/// A language-level value.
///
/// The set of kinds is closed. Every kind reports its class through
/// [`Value::class`], which is all message dispatch needs.
#[derive(Clone)]
pub enum Value {
    Nil,
    Integer(i64),
    Double(f64),
    BigInteger(Rc<BigInt>),
    String(Rc<str>),
    Symbol(Symbol),
    Object(Rc<Instance>),
    Class(Rc<Class>),
    Block(Rc<Block>),
    Method(Rc<Method>),
    Primitive(Rc<Primitive>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(s.into())
    }

    pub fn big(n: BigInt) -> Self {
        Value::BigInteger(Rc::new(n))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The class used to dispatch messages sent to this value.
    pub fn class(&self, special: &SpecialObjects) -> Rc<Class> {
        match self {
            Value::Nil => special.nil_class.clone(),
            Value::Integer(_) => special.integer_class.clone(),
            Value::Double(_) => special.double_class.clone(),
            Value::BigInteger(_) => special.biginteger_class.clone(),
            Value::String(_) => special.string_class.clone(),
            Value::Symbol(_) => special.symbol_class.clone(),
            Value::Object(obj) => obj.class().clone(),
            Value::Class(class) => class
                .metaclass()
                .unwrap_or_else(|| special.metaclass_class.clone()),
            Value::Block(block) => block.class().clone(),
            Value::Method(_) => special.method_class.clone(),
            Value::Primitive(_) => special.primitive_class.clone(),
        }
    }

    /// Identity comparison, as used by `==`.
    ///
    /// Immediate numbers compare by value, everything else by reference.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::BigInteger(a), Value::BigInteger(b)) => Rc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Primitive(a), Value::Primitive(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::BigInteger(_) => "big integer",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(_) => "object",
            Value::Class(_) => "class",
            Value::Block(_) => "block",
            Value::Method(_) => "method",
            Value::Primitive(_) => "primitive",
        }
    }
}

impl From<Invokable> for Value {
    fn from(invokable: Invokable) -> Self {
        match invokable {
            Invokable::Method(m) => Value::Method(m),
            Invokable::Primitive(p) => Value::Primitive(p),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n:?}"),
            Value::BigInteger(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "a {}", obj.class().name()),
            Value::Class(class) => write!(f, "{}", class.name()),
            Value::Block(block) => write!(f, "a {}", block.class().name()),
            Value::Method(m) => write!(f, "{m:?}"),
            Value::Primitive(p) => write!(f, "{p:?}"),
        }
    }
}
