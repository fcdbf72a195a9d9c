//! Small hand-assembled programs exercising the interpreter.

use std::rc::Rc;

use bytecode::BytecodeBuilder;
use object::{Class, ClassBuilder, Method, Value};

use crate::VM;

/// A send to run: `receiver selector args...`.
pub struct Program {
    pub receiver: Value,
    pub selector: &'static str,
    pub args: Vec<Value>,
}

pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn(&mut VM) -> Program,
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "arithmetic",
        description: "(3 + 4) * 6",
        build: arithmetic,
    },
    Demo {
        name: "factorial",
        description: "recursive 25 factorial, overflowing into BigInteger",
        build: factorial,
    },
    Demo {
        name: "counter",
        description: "a block incrementing a local of its home method",
        build: counter,
    },
    Demo {
        name: "non-local-return",
        description: "^ from inside a block returns from the enclosing method",
        build: non_local_return,
    },
    Demo {
        name: "escaped-block",
        description: "^ from a block whose home method already returned",
        build: escaped_block,
    },
    Demo {
        name: "polymorphic",
        description: "one send site seeing three receiver classes",
        build: polymorphic_demo,
    },
    Demo {
        name: "super-send",
        description: "super send starting lookup above the method's holder",
        build: super_send,
    },
    Demo {
        name: "dnu",
        description: "doesNotUnderstand: overridden to report the selector",
        build: does_not_understand,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|d| d.name == name)
}

/// Bytecode plus the literal frame it refers to.
struct Assembler<'a> {
    vm: &'a VM,
    code: BytecodeBuilder,
    literals: Vec<Value>,
}

impl<'a> Assembler<'a> {
    fn new(vm: &'a VM) -> Self {
        Self {
            vm,
            code: BytecodeBuilder::new(),
            literals: Vec::new(),
        }
    }

    fn literal(&mut self, value: Value) -> u16 {
        self.literals.push(value);
        (self.literals.len() - 1) as u16
    }

    fn offset(&self) -> usize {
        self.code.current_offset()
    }

    fn constant(&mut self, value: Value) -> &mut Self {
        let lit = self.literal(value);
        self.code.push_constant(lit);
        self
    }

    fn global(&mut self, name: &str) -> &mut Self {
        let sym = self.vm.symbol_value(name);
        let lit = self.literal(sym);
        self.code.push_global(lit);
        self
    }

    fn block(&mut self, body: Rc<Method>) -> &mut Self {
        let lit = self.literal(Value::Method(body));
        self.code.push_block(lit);
        self
    }

    fn send(&mut self, selector: &str) -> &mut Self {
        let sym = self.vm.symbol(selector);
        let arity = sym.arity();
        let lit = self.literal(Value::Symbol(sym));
        self.code.send(lit, arity);
        self
    }

    fn super_send(&mut self, selector: &str) -> &mut Self {
        let sym = self.vm.symbol(selector);
        let arity = sym.arity();
        let lit = self.literal(Value::Symbol(sym));
        self.code.super_send(lit, arity);
        self
    }

    fn argument(&mut self, idx: u8, level: u8) -> &mut Self {
        self.code.push_argument(idx, level);
        self
    }

    fn local(&mut self, idx: u8, level: u8) -> &mut Self {
        self.code.push_local(idx, level);
        self
    }

    fn store_local(&mut self, idx: u8, level: u8) -> &mut Self {
        self.code.pop_local(idx, level);
        self
    }

    fn dup(&mut self) -> &mut Self {
        self.code.dup();
        self
    }

    fn pop(&mut self) -> &mut Self {
        self.code.pop();
        self
    }

    fn ret(&mut self) -> &mut Self {
        self.code.return_local();
        self
    }

    fn ret_non_local(&mut self) -> &mut Self {
        self.code.return_non_local();
        self
    }

    fn finish(self, signature: &str, num_locals: usize) -> Rc<Method> {
        let sig = self.vm.symbol(signature);
        let num_args = sig.arity();
        let max_stack = self.code.max_stack();
        Method::new(sig, self.code.into_bytes(), self.literals, num_args, num_locals, max_stack)
    }

    /// Blocks are named after the selector that evaluates them.
    fn finish_block(self, num_args: usize, num_locals: usize) -> Rc<Method> {
        let selector = object::block_evaluation_selector(num_args);
        self.finish(&selector, num_locals)
    }
}

/// Define a class holding `methods` and make one instance of it.
fn instance_of(vm: &mut VM, name: &str, methods: Vec<Rc<Method>>) -> Value {
    let mut builder = ClassBuilder::new(vm.symbol(name));
    for method in methods {
        builder = builder.method(method);
    }
    let class = vm.define_class(builder);
    vm.new_instance(class)
}

fn program(receiver: Value, selector: &'static str) -> Program {
    Program {
        receiver,
        selector,
        args: Vec::new(),
    }
}

// ── Programs ───────────────────────────────────────────────────────

/// `Arith>>run  ^(3 + 4) * 6`
pub fn arithmetic(vm: &mut VM) -> Program {
    let mut a = Assembler::new(vm);
    a.constant(Value::Integer(3))
        .constant(Value::Integer(4))
        .send("+")
        .constant(Value::Integer(6))
        .send("*")
        .ret();
    let run = a.finish("run", 0);
    let receiver = instance_of(vm, "Arith", vec![run]);
    program(receiver, "run")
}

/// ```text
/// Math>>fact: n
///     ^n <= 1
///         ifTrue: [ 1 ]
///         ifFalse: [ n * (self fact: n - 1) ]
/// ```
pub fn factorial(vm: &mut VM) -> Program {
    let mut t = Assembler::new(vm);
    t.constant(Value::Integer(1)).ret();
    let base = t.finish_block(1, 0);

    let mut f = Assembler::new(vm);
    f.argument(1, 1)
        .argument(0, 1)
        .argument(1, 1)
        .constant(Value::Integer(1))
        .send("-")
        .send("fact:")
        .send("*")
        .ret();
    let step = f.finish_block(1, 0);

    let mut m = Assembler::new(vm);
    m.argument(1, 0)
        .constant(Value::Integer(1))
        .send("<=")
        .block(base)
        .block(step)
        .send("ifTrue:ifFalse:")
        .ret();
    let fact = m.finish("fact:", 0);

    let receiver = instance_of(vm, "Math", vec![fact]);
    Program {
        receiver,
        selector: "fact:",
        args: vec![Value::Integer(25)],
    }
}

/// ```text
/// Counter>>run
///     | count inc |
///     count := 0.
///     inc := [ count := count + 1 ].
///     inc value. inc value. inc value.
///     ^count
/// ```
pub fn counter(vm: &mut VM) -> Program {
    let mut b = Assembler::new(vm);
    b.local(0, 1)
        .constant(Value::Integer(1))
        .send("+")
        .dup()
        .store_local(0, 1)
        .ret();
    let inc = b.finish_block(1, 0);

    let mut m = Assembler::new(vm);
    m.constant(Value::Integer(0)).store_local(0, 0);
    m.block(inc).store_local(1, 0);
    for _ in 0..3 {
        m.local(1, 0).send("value").pop();
    }
    m.local(0, 0).ret();
    let run = m.finish("run", 2);

    let receiver = instance_of(vm, "Counter", vec![run]);
    program(receiver, "run")
}

/// ```text
/// Finder>>find
///     [ ^42 ] value.
///     'unreachable' println.
///     ^0
/// Finder>>run
///     ^self find
/// ```
pub fn non_local_return(vm: &mut VM) -> Program {
    let mut b = Assembler::new(vm);
    b.constant(Value::Integer(42)).ret_non_local();
    let body = b.finish_block(1, 0);

    let mut find = Assembler::new(vm);
    find.block(body)
        .send("value")
        .pop()
        .constant(Value::string("unreachable"))
        .send("println")
        .pop()
        .constant(Value::Integer(0))
        .ret();
    let find = find.finish("find", 0);

    let mut run = Assembler::new(vm);
    run.argument(0, 0).send("find").ret();
    let run = run.finish("run", 0);

    let receiver = instance_of(vm, "Finder", vec![find, run]);
    program(receiver, "run")
}

/// ```text
/// Leaker>>make
///     ^[ ^#gone ]
/// Leaker>>escapedBlock: aBlock
///     'escaped' println.
///     ^#recovered
/// Leaker>>run
///     ^self make value
/// ```
pub fn escaped_block(vm: &mut VM) -> Program {
    let mut b = Assembler::new(vm);
    b.constant(vm.symbol_value("gone")).ret_non_local();
    let body = b.finish_block(1, 0);

    let mut make = Assembler::new(vm);
    make.block(body).ret();
    let make = make.finish("make", 0);

    let mut handler = Assembler::new(vm);
    handler
        .constant(Value::string("escaped"))
        .send("println")
        .pop()
        .constant(vm.symbol_value("recovered"))
        .ret();
    let handler = handler.finish("escapedBlock:", 0);

    let mut run = Assembler::new(vm);
    run.argument(0, 0).send("make").send("value").ret();
    let run = run.finish("run", 0);

    let receiver = instance_of(vm, "Leaker", vec![make, handler, run]);
    program(receiver, "run")
}

/// Three classes answering `tag` and a driver with one shared send site.
pub struct Polymorphic {
    pub driver: Value,
    pub classes: Vec<Rc<Class>>,
    /// `Driver>>describe:`, holding the `tag` send site.
    pub site_method: Rc<Method>,
    pub site_bci: usize,
}

/// ```text
/// A>>tag ^1    B>>tag ^2    C>>tag ^3
/// Driver>>describe: x
///     ^x tag
/// ```
pub fn polymorphic(vm: &mut VM) -> Polymorphic {
    let mut classes = Vec::new();
    for (name, tag) in [("A", 1), ("B", 2), ("C", 3)] {
        let mut m = Assembler::new(vm);
        m.constant(Value::Integer(tag)).ret();
        let method = m.finish("tag", 0);
        classes.push(vm.define_class(ClassBuilder::new(vm.symbol(name)).method(method)));
    }

    let mut d = Assembler::new(vm);
    d.argument(1, 0);
    let site_bci = d.offset();
    d.send("tag").ret();
    let site_method = d.finish("describe:", 0);

    let mut r = Assembler::new(vm);
    for name in ["A", "B", "C", "A", "B"] {
        r.argument(0, 0).global(name).send("new").send("describe:").pop();
    }
    r.argument(0, 0).ret();
    let run = r.finish("run", 0);

    let driver = instance_of(vm, "Driver", vec![site_method.clone(), run]);
    Polymorphic {
        driver,
        classes,
        site_method,
        site_bci,
    }
}

fn polymorphic_demo(vm: &mut VM) -> Program {
    let p = polymorphic(vm);
    program(p.driver, "run")
}

/// ```text
/// Base>>value ^10
/// Derived>>value ^super value + 100
/// ```
pub fn super_send(vm: &mut VM) -> Program {
    let mut b = Assembler::new(vm);
    b.constant(Value::Integer(10)).ret();
    let base_value = b.finish("value", 0);
    let base = vm.define_class(ClassBuilder::new(vm.symbol("Base")).method(base_value));

    let mut d = Assembler::new(vm);
    d.argument(0, 0)
        .super_send("value")
        .constant(Value::Integer(100))
        .send("+")
        .ret();
    let derived_value = d.finish("value", 0);

    let derived = ClassBuilder::new(vm.symbol("Derived"))
        .superclass(base)
        .method(derived_value);
    let derived = vm.define_class(derived);
    program(vm.new_instance(derived), "value")
}

/// ```text
/// Ghost>>doesNotUnderstand: selector
///     selector asString println.
///     ^selector
/// Ghost>>run
///     ^self frobnicate
/// ```
pub fn does_not_understand(vm: &mut VM) -> Program {
    let mut h = Assembler::new(vm);
    h.argument(1, 0).send("asString").send("println").pop().argument(1, 0).ret();
    let handler = h.finish("doesNotUnderstand:", 0);

    let mut r = Assembler::new(vm);
    r.argument(0, 0).send("frobnicate").ret();
    let run = r.finish("run", 0);

    let receiver = instance_of(vm, "Ghost", vec![handler, run]);
    program(receiver, "run")
}
