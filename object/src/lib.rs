mod symbol;
mod value;
mod class;
mod method;
mod objects;
mod frame;
mod special;

pub use symbol::{Symbol, SymbolTable, signature_arity};
pub use value::Value;
pub use class::{Class, ClassBuilder, attach_metaclass};
pub use method::{
    CACHE_SLOTS, CacheFill, InlineCache, Invokable, Method, Primitive,
};
pub use objects::{Block, Instance, block_evaluation_selector};
pub use frame::{AccessError, Frame, FrameRef, STACK_HEADROOM};
pub use special::SpecialObjects;
