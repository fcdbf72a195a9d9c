use std::cell::RefCell;
use std::rc::Rc;

use crate::class::Class;
use crate::frame::{AccessError, FrameRef};
use crate::method::Method;
use crate::value::Value;

// ── Instance ───────────────────────────────────────────────────────

/// An instance of a user or kernel class. Fields start out nil.
pub struct Instance {
    class: Rc<Class>,
    fields: RefCell<Vec<Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Rc<Self> {
        let fields = vec![Value::Nil; class.num_fields()];
        Rc::new(Self {
            class,
            fields: RefCell::new(fields),
        })
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn num_fields(&self) -> usize {
        self.fields.borrow().len()
    }

    pub fn field(&self, idx: usize) -> Result<Value, AccessError> {
        let fields = self.fields.borrow();
        fields.get(idx).cloned().ok_or(AccessError::FieldOutOfBounds {
            index: idx,
            len: fields.len(),
        })
    }

    pub fn set_field(&self, idx: usize, value: Value) -> Result<(), AccessError> {
        let mut fields = self.fields.borrow_mut();
        let len = fields.len();
        let slot = fields
            .get_mut(idx)
            .ok_or(AccessError::FieldOutOfBounds { index: idx, len })?;
        *slot = value;
        Ok(())
    }
}

// ── Block ──────────────────────────────────────────────────────────

/// A closure: a block body plus the frame it was created in.
///
/// The context is shared, so writes through one block are visible to the
/// defining activation and to every other block created in it.
pub struct Block {
    method: Rc<Method>,
    context: FrameRef,
    class: Rc<Class>,
}

impl Block {
    pub fn new(method: Rc<Method>, context: FrameRef, class: Rc<Class>) -> Rc<Self> {
        Rc::new(Self {
            method,
            context,
            class,
        })
    }

    pub fn method(&self) -> &Rc<Method> {
        &self.method
    }

    pub fn context(&self) -> &FrameRef {
        &self.context
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    /// Values consumed by evaluating this block, the block included.
    pub fn num_args(&self) -> usize {
        self.method.num_args()
    }
}

/// Selector that evaluates a block taking `num_args` values, the block
/// itself included: `value`, `value:`, `value:with:`, ...
pub fn block_evaluation_selector(num_args: usize) -> String {
    match num_args {
        0 | 1 => "value".to_string(),
        n => {
            let mut sel = "value:".to_string();
            for _ in 2..n {
                sel.push_str("with:");
            }
            sel
        }
    }
}
