pub mod demos;
pub mod interpreter;
pub mod primitives;
pub mod special;

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

use object::{
    Class, ClassBuilder, Instance, Primitive, SpecialObjects, Symbol, SymbolTable,
    Value,
};
use parking_lot::Mutex;

/// Interpreter limits and tracing switches.
#[derive(Debug, Clone)]
pub struct VmSettings {
    /// Maximum depth of the activation chain.
    pub max_frames: usize,
    /// Log every send of this selector at info level.
    pub trace_send: Option<String>,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            trace_send: None,
        }
    }
}

/// Counters for send-site behaviour, cumulative over the VM's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Full method lookups along a superclass chain.
    pub lookups: u64,
    /// Sends served from an inline cache slot.
    pub cache_hits: u64,
}

enum Sink {
    Stdout,
    Buffer(Vec<u8>),
}

/// Where `print`/`println` output goes. Clones share the sink.
#[derive(Clone)]
pub struct Transcript(Arc<Mutex<Sink>>);

impl Transcript {
    pub fn stdout() -> Self {
        Self(Arc::new(Mutex::new(Sink::Stdout)))
    }

    /// A transcript that keeps everything written to it.
    pub fn capture() -> Self {
        Self(Arc::new(Mutex::new(Sink::Buffer(Vec::new()))))
    }

    pub fn write_str(&self, s: &str) -> io::Result<()> {
        match &mut *self.0.lock() {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(s.as_bytes())?;
                out.flush()
            }
            Sink::Buffer(buf) => {
                buf.extend_from_slice(s.as_bytes());
                Ok(())
            }
        }
    }

    /// Captured output so far; empty for stdout transcripts.
    pub fn contents(&self) -> String {
        match &*self.0.lock() {
            Sink::Stdout => String::new(),
            Sink::Buffer(buf) => String::from_utf8_lossy(buf).into_owned(),
        }
    }
}

/// The VM owns the kernel classes, the global table and the primitive
/// table.
pub struct VM {
    pub special: SpecialObjects,
    pub symbols: SymbolTable,
    /// Global name → value. Holds `nil`, `true`, `false` and every class.
    pub globals: HashMap<Symbol, Value>,
    /// Registered primitive descriptors.
    pub primitives: Vec<primitives::PrimitiveDesc>,
    pub settings: VmSettings,
    pub stats: DispatchStats,
    pub transcript: Transcript,
}

impl VM {
    pub fn new(settings: VmSettings) -> Self {
        special::bootstrap(settings)
    }

    pub fn symbol(&self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn symbol_value(&self, name: &str) -> Value {
        Value::Symbol(self.symbols.intern(name))
    }

    pub fn global(&self, name: &Symbol) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn set_global(&mut self, name: Symbol, value: Value) {
        self.globals.insert(name, value);
    }

    /// Look up a global class by name.
    pub fn class_named(&self, name: &str) -> Option<Rc<Class>> {
        match self.global(&self.symbols.get(name)?)? {
            Value::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn class_of(&self, value: &Value) -> Rc<Class> {
        value.class(&self.special)
    }

    pub fn new_instance(&self, class: Rc<Class>) -> Value {
        Value::Object(Instance::new(class))
    }

    pub fn boolean(&self, b: bool) -> Value {
        self.special.boolean(b)
    }

    /// A primitive method bound to the named entry of the primitive table.
    pub fn primitive(&self, selector: &str, class: &str) -> Option<Rc<Primitive>> {
        let index = primitives::primitive_index_by_name(&self.primitives, class, selector)?;
        Some(Primitive::new(self.symbol(selector), index))
    }

    /// Build a class with `Object` as default superclass and register it
    /// as a global.
    pub fn define_class(&mut self, builder: ClassBuilder) -> Rc<Class> {
        let class = builder
            .default_superclass(self.special.object_class.clone())
            .build(&self.special.class_class);
        self.set_global(class.name().clone(), Value::Class(class.clone()));
        class
    }
}
