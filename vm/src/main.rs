use clap::Parser as ClapParser;
use std::process;

use bytecode::BytecodeDecoder;
use object::{Invokable, Method, Value};

use vm::demos::{self, DEMOS};
use vm::interpreter;
use vm::primitives::print_string;
use vm::{VM, VmSettings};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Demo program to run
    #[arg(long, help = "Name of the demo to run (see --list)")]
    demo: Option<String>,

    /// List the bundled demos
    #[arg(long, help = "List available demos and exit")]
    list: bool,

    /// Print bytecode instead of executing
    #[arg(long, help = "Disassemble the demo's entry method and its blocks")]
    dump_bytecode: bool,

    /// Activation chain limit
    #[arg(long, default_value_t = 1024, help = "Maximum call depth")]
    max_frames: usize,

    /// Trace sends for a specific selector
    #[arg(long, help = "Log every send of this selector")]
    trace_send: Option<String>,

    /// -v for debug, -vv for per-bytecode tracing
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(cli: &Cli) {
    let level = match cli.verbose {
        0 if cli.trace_send.is_some() => "info",
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.list {
        for demo in DEMOS {
            println!("{:<18} {}", demo.name, demo.description);
        }
        return;
    }

    let Some(name) = cli.demo.as_deref() else {
        eprintln!("No demo given; use --demo <name> or --list");
        process::exit(1);
    };
    let Some(demo) = demos::find(name) else {
        eprintln!("Unknown demo '{name}'; use --list to see the available ones");
        process::exit(1);
    };

    let mut vm = VM::new(VmSettings {
        max_frames: cli.max_frames,
        trace_send: cli.trace_send.clone(),
    });
    let program = (demo.build)(&mut vm);

    if cli.dump_bytecode {
        let selector = vm.symbol(program.selector);
        match vm.class_of(&program.receiver).lookup(&selector) {
            Some(Invokable::Method(method)) => dump_method(&vm, &method, 0),
            Some(Invokable::Primitive(p)) => println!("{p:?} is a primitive"),
            None => {
                eprintln!("Entry method #{selector} not found");
                process::exit(1);
            }
        }
        return;
    }

    match interpreter::interpret(&mut vm, program.receiver, program.selector, &program.args) {
        Ok(value) => {
            println!("=> {}", print_string(&vm, &value));
            println!(
                "lookups: {}, cache hits: {}",
                vm.stats.lookups, vm.stats.cache_hits
            );
        }
        Err(err) => {
            eprintln!("Error running {name}: {err}");
            process::exit(1);
        }
    }
}

fn dump_method(vm: &VM, method: &Method, indent: usize) {
    let pad = " ".repeat(indent);
    println!(
        "{pad}{method:?} (args {}, locals {}, max stack {})",
        method.num_args(),
        method.num_locals(),
        method.max_stack()
    );
    for (offset, instr) in BytecodeDecoder::new(method.bytecode()) {
        match instr {
            Ok(instr) => {
                let note = instr
                    .literal()
                    .and_then(|lit| method.literal(lit as usize))
                    .map(|v| format!("    ; {}", print_string(vm, v)))
                    .unwrap_or_default();
                println!("{pad}{offset:4}: {instr}{note}");
            }
            Err(err) => {
                println!("{pad}{offset:4}: <{err}>");
                break;
            }
        }
    }
    for literal in method.literals() {
        if let Value::Method(block) = literal {
            dump_method(vm, block, indent + 4);
        }
    }
}
