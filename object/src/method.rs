use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::class::Class;
use crate::symbol::Symbol;
use crate::value::Value;

/// Cache slots per send site.
pub const CACHE_SLOTS: usize = 2;

// ── Method ─────────────────────────────────────────────────────────

/// A compiled method or block body.
///
/// `num_args` counts the receiver (or the block itself, for block bodies).
/// Everything except the inline cache and the holder link is fixed at
/// construction.
pub struct Method {
    signature: Symbol,
    holder: OnceCell<Weak<Class>>,
    bytecode: Box<[u8]>,
    literals: Box<[Value]>,
    num_args: usize,
    num_locals: usize,
    max_stack: usize,
    cache: InlineCache,
}

impl Method {
    pub fn new(
        signature: Symbol,
        bytecode: Vec<u8>,
        literals: Vec<Value>,
        num_args: usize,
        num_locals: usize,
        max_stack: usize,
    ) -> Rc<Self> {
        let cache = InlineCache::new(bytecode.len());
        Rc::new(Self {
            signature,
            holder: OnceCell::new(),
            bytecode: bytecode.into_boxed_slice(),
            literals: literals.into_boxed_slice(),
            num_args,
            num_locals,
            max_stack,
            cache,
        })
    }

    pub fn signature(&self) -> &Symbol {
        &self.signature
    }

    pub fn holder(&self) -> Option<Rc<Class>> {
        self.holder.get().and_then(Weak::upgrade)
    }

    /// Record the class this method is installed in. The first call wins.
    pub fn set_holder(&self, holder: &Rc<Class>) -> bool {
        self.holder.set(Rc::downgrade(holder)).is_ok()
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn literal(&self, idx: usize) -> Option<&Value> {
        self.literals.get(idx)
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    pub fn num_args(&self) -> usize {
        self.num_args
    }

    pub fn num_locals(&self) -> usize {
        self.num_locals
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn inline_cache(&self) -> &InlineCache {
        &self.cache
    }

    /// Drop every cached dispatch target in this method.
    pub fn flush_inline_cache(&self) {
        self.cache.flush();
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.holder() {
            Some(holder) => write!(f, "{}>>#{}", holder.name(), self.signature),
            None => write!(f, "nil>>#{}", self.signature),
        }
    }
}

// ── Primitive ──────────────────────────────────────────────────────

/// A natively implemented method. `index` refers to the VM's primitive
/// table.
pub struct Primitive {
    signature: Symbol,
    holder: OnceCell<Weak<Class>>,
    index: usize,
}

impl Primitive {
    pub fn new(signature: Symbol, index: usize) -> Rc<Self> {
        Rc::new(Self {
            signature,
            holder: OnceCell::new(),
            index,
        })
    }

    pub fn signature(&self) -> &Symbol {
        &self.signature
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn holder(&self) -> Option<Rc<Class>> {
        self.holder.get().and_then(Weak::upgrade)
    }

    pub fn set_holder(&self, holder: &Rc<Class>) -> bool {
        self.holder.set(Rc::downgrade(holder)).is_ok()
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.holder() {
            Some(holder) => {
                write!(f, "{}>>#{} (primitive)", holder.name(), self.signature)
            }
            None => write!(f, "nil>>#{} (primitive)", self.signature),
        }
    }
}

// ── Invokable ──────────────────────────────────────────────────────

/// Anything a selector can resolve to.
#[derive(Clone)]
pub enum Invokable {
    Method(Rc<Method>),
    Primitive(Rc<Primitive>),
}

impl Invokable {
    pub fn signature(&self) -> &Symbol {
        match self {
            Invokable::Method(m) => m.signature(),
            Invokable::Primitive(p) => p.signature(),
        }
    }

    pub fn holder(&self) -> Option<Rc<Class>> {
        match self {
            Invokable::Method(m) => m.holder(),
            Invokable::Primitive(p) => p.holder(),
        }
    }

    pub fn set_holder(&self, holder: &Rc<Class>) -> bool {
        match self {
            Invokable::Method(m) => m.set_holder(holder),
            Invokable::Primitive(p) => p.set_holder(holder),
        }
    }

    pub fn ptr_eq(&self, other: &Invokable) -> bool {
        match (self, other) {
            (Invokable::Method(a), Invokable::Method(b)) => Rc::ptr_eq(a, b),
            (Invokable::Primitive(a), Invokable::Primitive(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Invokable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invokable::Method(m) => m.fmt(f),
            Invokable::Primitive(p) => p.fmt(f),
        }
    }
}

// ── Inline cache ───────────────────────────────────────────────────

/// One observed receiver class and the target it resolved to.
///
/// The class is held weakly. A weak reference keeps the allocation's
/// address reserved, so identity comparison stays sound after the class
/// is dropped.
/// A `None` target records a failed lookup, so a site that keeps falling
/// back to `doesNotUnderstand:` stops searching the class chain.
#[derive(Clone)]
struct CacheEntry {
    class: Weak<Class>,
    target: Option<Invokable>,
}

impl CacheEntry {
    fn matches(&self, class: &Rc<Class>) -> bool {
        std::ptr::eq(self.class.as_ptr(), Rc::as_ptr(class))
    }
}

/// What [`InlineCache::record`] did with a freshly resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFill {
    First,
    Second,
    /// Both slots were taken; nothing was stored.
    Megamorphic,
}

type Site = [Option<CacheEntry>; CACHE_SLOTS];

/// Per-method side table of send-site caches, indexed by bytecode offset.
pub struct InlineCache {
    sites: RefCell<Box<[Site]>>,
}

impl InlineCache {
    fn new(len: usize) -> Self {
        Self {
            sites: RefCell::new(vec![[None, None]; len].into_boxed_slice()),
        }
    }

    /// Cached resolution for `class` at the send site at `bci`.
    ///
    /// `Some(None)` is a cached miss: `class` does not understand the
    /// selector sent there.
    pub fn lookup(&self, bci: usize, class: &Rc<Class>) -> Option<Option<Invokable>> {
        let sites = self.sites.borrow();
        sites
            .get(bci)?
            .iter()
            .flatten()
            .find(|entry| entry.matches(class))
            .map(|entry| entry.target.clone())
    }

    /// Store a lookup result in the first free slot of the site.
    pub fn record(
        &self,
        bci: usize,
        class: &Rc<Class>,
        target: Option<&Invokable>,
    ) -> CacheFill {
        let mut sites = self.sites.borrow_mut();
        let Some(site) = sites.get_mut(bci) else {
            return CacheFill::Megamorphic;
        };
        let entry = CacheEntry {
            class: Rc::downgrade(class),
            target: target.cloned(),
        };
        match site {
            [slot @ None, _] => {
                *slot = Some(entry);
                CacheFill::First
            }
            [_, slot @ None] => {
                *slot = Some(entry);
                CacheFill::Second
            }
            _ => CacheFill::Megamorphic,
        }
    }

    /// Number of populated slots at `bci`.
    pub fn occupancy(&self, bci: usize) -> usize {
        self.sites
            .borrow()
            .get(bci)
            .map_or(0, |site| site.iter().flatten().count())
    }

    /// Names of the classes cached at `bci`, slot order.
    pub fn cached_classes(&self, bci: usize) -> Vec<Option<Symbol>> {
        self.sites
            .borrow()
            .get(bci)
            .map(|site| {
                site.iter()
                    .flatten()
                    .map(|e| e.class.upgrade().map(|c| c.name().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn flush(&self) {
        for site in self.sites.borrow_mut().iter_mut() {
            *site = [None, None];
        }
    }
}
