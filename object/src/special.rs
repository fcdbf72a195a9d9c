use std::rc::Rc;

use crate::class::Class;
use crate::value::Value;

/// Kernel classes and singleton objects.
///
/// Holds the classes the VM needs to dispatch on values that don't carry
/// their own class pointer (numbers, strings, nil, ...). Objects are not
/// created here; the VM bootstrap builds them and fills this struct in.
pub struct SpecialObjects {
    // ── Singletons ─────────────────────────────────────────────────
    /// The canonical `true` object.
    pub true_obj: Value,

    /// The canonical `false` object.
    pub false_obj: Value,

    // ── Kernel classes ─────────────────────────────────────────────
    pub object_class: Rc<Class>,
    pub class_class: Rc<Class>,
    pub metaclass_class: Rc<Class>,
    pub nil_class: Rc<Class>,
    pub boolean_class: Rc<Class>,
    pub true_class: Rc<Class>,
    pub false_class: Rc<Class>,
    pub integer_class: Rc<Class>,
    pub double_class: Rc<Class>,
    pub biginteger_class: Rc<Class>,
    pub string_class: Rc<Class>,
    pub symbol_class: Rc<Class>,
    pub method_class: Rc<Class>,
    pub primitive_class: Rc<Class>,
    pub block_class: Rc<Class>,

    /// `Block1` .. `Block4`, indexed by block arity minus one.
    pub block_classes: [Rc<Class>; 4],
}

impl SpecialObjects {
    /// Class for a block taking `num_args` values, the block included.
    pub fn block_class_for(&self, num_args: usize) -> Option<&Rc<Class>> {
        num_args
            .checked_sub(1)
            .and_then(|i| self.block_classes.get(i))
    }

    pub fn boolean(&self, b: bool) -> Value {
        if b {
            self.true_obj.clone()
        } else {
            self.false_obj.clone()
        }
    }

    /// `Some(b)` if `value` is one of the boolean singletons.
    pub fn as_boolean(&self, value: &Value) -> Option<bool> {
        if value.identical(&self.true_obj) {
            Some(true)
        } else if value.identical(&self.false_obj) {
            Some(false)
        } else {
            None
        }
    }
}
