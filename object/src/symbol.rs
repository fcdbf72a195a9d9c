use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

/// Characters that make up binary operator selectors.
const BINARY_CHARS: &str = "~&|*/@+-=><,%\\";

struct SymbolData {
    name: Box<str>,
    arity: usize,
}

/// An interned selector or name.
///
/// Symbols compare and hash by identity; two symbols with the same spelling
/// are only guaranteed to be equal if they came from the same
/// [`SymbolTable`].
#[derive(Clone)]
pub struct Symbol(Arc<SymbolData>);

impl Symbol {
    fn new(name: &str) -> Self {
        Self(Arc::new(SymbolData {
            name: name.into(),
            arity: signature_arity(name),
        }))
    }

    pub fn as_str(&self) -> &str {
        &self.0.name
    }

    /// Number of stack values a send of this selector consumes, receiver
    /// included.
    pub fn arity(&self) -> usize {
        self.0.arity
    }

    pub fn is_binary(&self) -> bool {
        is_binary_selector(&self.0.name)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0.name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

fn is_binary_selector(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| BINARY_CHARS.contains(c))
}

/// Arity of a selector spelling, receiver included.
///
/// Binary selectors take 2, keyword selectors one more than their colon
/// count, unary selectors 1.
pub fn signature_arity(name: &str) -> usize {
    if is_binary_selector(name) {
        2
    } else {
        name.chars().filter(|&c| c == ':').count() + 1
    }
}

/// Interning table. Cloning shares the underlying table.
#[derive(Clone, Default)]
pub struct SymbolTable(Arc<RwLock<HashMap<Box<str>, Symbol>>>);

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(sym) = self.0.read().get(name) {
            return sym.clone();
        }
        let mut table = self.0.write();
        table
            .entry(name.into())
            .or_insert_with(|| Symbol::new(name))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.0.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}
