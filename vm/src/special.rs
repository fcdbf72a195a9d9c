use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use object::{
    Class, ClassBuilder, Instance, Invokable, Primitive, SpecialObjects, SymbolTable, Value,
    attach_metaclass,
};

use crate::primitives::{PrimitiveDesc, default_primitives};
use crate::{DispatchStats, Transcript, VM, VmSettings};

/// Primitive methods waiting to be installed, keyed by kernel class name.
#[derive(Default)]
struct PendingPrimitives {
    by_class: HashMap<&'static str, (Vec<Rc<Primitive>>, Vec<Rc<Primitive>>)>,
}

impl PendingPrimitives {
    fn new(symbols: &SymbolTable, descs: &[PrimitiveDesc]) -> Self {
        let mut pending = Self::default();
        for (index, desc) in descs.iter().enumerate() {
            let primitive = Primitive::new(symbols.intern(desc.name), index);
            let (instance_side, class_side) = pending.by_class.entry(desc.class).or_default();
            if desc.class_side {
                class_side.push(primitive);
            } else {
                instance_side.push(primitive);
            }
        }
        pending
    }

    fn take(&mut self, class: &str) -> (Vec<Rc<Primitive>>, Vec<Rc<Primitive>>) {
        self.by_class.remove(class).unwrap_or_default()
    }

    /// Add the primitives for `name` to `builder`.
    fn install(&mut self, name: &str, mut builder: ClassBuilder) -> ClassBuilder {
        let (instance_side, class_side) = self.take(name);
        for p in instance_side {
            builder = builder.primitive(p);
        }
        for p in class_side {
            builder = builder.class_primitive(p);
        }
        builder
    }
}

/// Build the kernel classes, install their primitives and return a
/// ready [`VM`].
///
/// `Object`, `Class` and `Metaclass` refer to each other, so they are
/// built without metaclasses first and patched afterwards:
///
/// ```text
/// Object class     superclass: Class
/// Class class      superclass: Object class
/// Metaclass class  superclass: Class class
/// ```
///
/// Every other kernel class gets its metaclass the regular way.
pub fn bootstrap(settings: VmSettings) -> VM {
    let symbols = SymbolTable::new();
    let primitives = default_primitives();
    let mut pending = PendingPrimitives::new(&symbols, &primitives);

    let object_class = pending
        .install("Object", ClassBuilder::new(symbols.intern("Object")))
        .build_bare();
    let class_class = pending
        .install("Class", ClassBuilder::new(symbols.intern("Class")))
        .superclass(object_class.clone())
        .build_bare();
    let metaclass_class = pending
        .install("Metaclass", ClassBuilder::new(symbols.intern("Metaclass")))
        .superclass(class_class.clone())
        .build_bare();

    let class_side = |pending: &mut PendingPrimitives, name: &str| -> Vec<Invokable> {
        pending.take(name).1.into_iter().map(Invokable::Primitive).collect()
    };
    let object_meta = attach_metaclass(
        &object_class,
        class_class.clone(),
        class_side(&mut pending, "Object"),
    );
    let class_meta = attach_metaclass(
        &class_class,
        object_meta,
        class_side(&mut pending, "Class"),
    );
    attach_metaclass(
        &metaclass_class,
        class_meta,
        class_side(&mut pending, "Metaclass"),
    );

    let mut kernel = |name: &str, superclass: &Rc<Class>| -> Rc<Class> {
        pending
            .install(name, ClassBuilder::new(symbols.intern(name)))
            .superclass(superclass.clone())
            .build(&class_class)
    };

    let nil_class = kernel("Nil", &object_class);
    let boolean_class = kernel("Boolean", &object_class);
    let true_class = kernel("True", &boolean_class);
    let false_class = kernel("False", &boolean_class);
    let integer_class = kernel("Integer", &object_class);
    let biginteger_class = kernel("BigInteger", &object_class);
    let double_class = kernel("Double", &object_class);
    let string_class = kernel("String", &object_class);
    let symbol_class = kernel("Symbol", &string_class);
    let method_class = kernel("Method", &object_class);
    let primitive_class = kernel("Primitive", &object_class);
    let block_class = kernel("Block", &object_class);
    let block_classes = [
        kernel("Block1", &block_class),
        kernel("Block2", &block_class),
        kernel("Block3", &block_class),
        kernel("Block4", &block_class),
    ];

    let true_obj = Value::Object(Instance::new(true_class.clone()));
    let false_obj = Value::Object(Instance::new(false_class.clone()));

    let special = SpecialObjects {
        true_obj,
        false_obj,
        object_class,
        class_class,
        metaclass_class,
        nil_class,
        boolean_class,
        true_class,
        false_class,
        integer_class,
        double_class,
        biginteger_class,
        string_class,
        symbol_class,
        method_class,
        primitive_class,
        block_class,
        block_classes,
    };

    let mut globals = HashMap::new();
    globals.insert(symbols.intern("nil"), Value::Nil);
    globals.insert(symbols.intern("true"), special.true_obj.clone());
    globals.insert(symbols.intern("false"), special.false_obj.clone());
    let classes = [
        &special.object_class,
        &special.class_class,
        &special.metaclass_class,
        &special.nil_class,
        &special.boolean_class,
        &special.true_class,
        &special.false_class,
        &special.integer_class,
        &special.biginteger_class,
        &special.double_class,
        &special.string_class,
        &special.symbol_class,
        &special.method_class,
        &special.primitive_class,
        &special.block_class,
    ];
    for class in classes.into_iter().chain(special.block_classes.iter()) {
        globals.insert(class.name().clone(), Value::Class(class.clone()));
    }

    debug!(
        "bootstrapped {} kernel classes with {} primitives",
        globals.len() - 3,
        primitives.len()
    );

    VM {
        special,
        symbols,
        globals,
        primitives,
        settings,
        stats: DispatchStats::default(),
        transcript: Transcript::stdout(),
    }
}
