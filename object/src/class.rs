use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::method::{Invokable, Method, Primitive};
use crate::symbol::Symbol;

/// A class: name, superclass, method dictionary and instance layout.
///
/// Immutable once built, except that the metaclass can be attached once
/// after construction (needed while bootstrapping the kernel classes).
pub struct Class {
    name: Symbol,
    superclass: Option<Rc<Class>>,
    methods: HashMap<Symbol, Invokable>,
    /// All instance field names, inherited fields first.
    fields: Vec<Symbol>,
    metaclass: OnceCell<Rc<Class>>,
    is_metaclass: bool,
}

impl Class {
    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Rc<Class>> {
        self.superclass.as_ref()
    }

    pub fn metaclass(&self) -> Option<Rc<Class>> {
        self.metaclass.get().cloned()
    }

    /// Attach the metaclass. Returns `false` if one was already attached.
    pub fn set_metaclass(&self, metaclass: Rc<Class>) -> bool {
        self.metaclass.set(metaclass).is_ok()
    }

    pub fn is_metaclass(&self) -> bool {
        self.is_metaclass
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> &[Symbol] {
        &self.fields
    }

    pub fn field_index(&self, name: &Symbol) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Method defined directly in this class.
    pub fn local_method(&self, selector: &Symbol) -> Option<&Invokable> {
        self.methods.get(selector)
    }

    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    /// Look `selector` up in this class and then along the superclass chain.
    pub fn lookup(&self, selector: &Symbol) -> Option<Invokable> {
        let mut class = self;
        loop {
            if let Some(found) = class.methods.get(selector) {
                return Some(found.clone());
            }
            class = class.superclass.as_deref()?;
        }
    }

    /// Whether `self` is `other` or inherits from it.
    pub fn is_kind_of(&self, other: &Class) -> bool {
        let mut class = self;
        loop {
            if std::ptr::eq(class, other) {
                return true;
            }
            match class.superclass.as_deref() {
                Some(sup) => class = sup,
                None => return false,
            }
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field("fields", &self.fields)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Builds an immutable [`Class`] together with its metaclass.
pub struct ClassBuilder {
    name: Symbol,
    superclass: Option<Rc<Class>>,
    fields: Vec<Symbol>,
    methods: Vec<Invokable>,
    class_methods: Vec<Invokable>,
}

impl ClassBuilder {
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            superclass: None,
            fields: Vec::new(),
            methods: Vec::new(),
            class_methods: Vec::new(),
        }
    }

    pub fn superclass(mut self, superclass: Rc<Class>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Use `superclass` unless one was set already.
    pub fn default_superclass(mut self, superclass: Rc<Class>) -> Self {
        if self.superclass.is_none() {
            self.superclass = Some(superclass);
        }
        self
    }

    pub fn field(mut self, name: Symbol) -> Self {
        self.fields.push(name);
        self
    }

    pub fn method(mut self, method: Rc<Method>) -> Self {
        self.methods.push(Invokable::Method(method));
        self
    }

    pub fn primitive(mut self, primitive: Rc<Primitive>) -> Self {
        self.methods.push(Invokable::Primitive(primitive));
        self
    }

    pub fn class_method(mut self, method: Rc<Method>) -> Self {
        self.class_methods.push(Invokable::Method(method));
        self
    }

    pub fn class_primitive(mut self, primitive: Rc<Primitive>) -> Self {
        self.class_methods.push(Invokable::Primitive(primitive));
        self
    }

    /// Build the class without a metaclass. Class-side methods are dropped;
    /// use [`build`](Self::build) once a metaclass root exists.
    pub fn build_bare(self) -> Rc<Class> {
        let ClassBuilder {
            name,
            superclass,
            fields,
            methods,
            ..
        } = self;
        make_class(name, superclass, fields, methods, false)
    }

    /// Build the class and its metaclass.
    ///
    /// The metaclass inherits from the superclass's metaclass, or from
    /// `meta_root` (normally `Class`) for a root class.
    pub fn build(mut self, meta_root: &Rc<Class>) -> Rc<Class> {
        let meta_super = self
            .superclass
            .as_ref()
            .and_then(|s| s.metaclass())
            .unwrap_or_else(|| meta_root.clone());
        let meta_name = self.name.clone();
        let class_methods = std::mem::take(&mut self.class_methods);
        let metaclass =
            make_class(meta_name, Some(meta_super), Vec::new(), class_methods, true);

        let class = self.build_bare();
        class.set_metaclass(metaclass);
        class
    }
}

/// Build a metaclass for an already built class and attach it.
pub fn attach_metaclass(
    class: &Rc<Class>,
    meta_super: Rc<Class>,
    class_methods: Vec<Invokable>,
) -> Rc<Class> {
    let meta = make_class(
        class.name.clone(),
        Some(meta_super),
        Vec::new(),
        class_methods,
        true,
    );
    class.set_metaclass(meta.clone());
    meta
}

fn make_class(
    name: Symbol,
    superclass: Option<Rc<Class>>,
    own_fields: Vec<Symbol>,
    methods: Vec<Invokable>,
    is_metaclass: bool,
) -> Rc<Class> {
    let mut fields: Vec<Symbol> = superclass
        .as_ref()
        .map(|s| s.fields.clone())
        .unwrap_or_default();
    fields.extend(own_fields);

    let methods: HashMap<Symbol, Invokable> = methods
        .into_iter()
        .map(|inv| (inv.signature().clone(), inv))
        .collect();

    let class = Rc::new(Class {
        name,
        superclass,
        methods,
        fields,
        metaclass: OnceCell::new(),
        is_metaclass,
    });
    for inv in class.methods.values() {
        inv.set_holder(&class);
    }
    class
}
