//! Shared helpers for the runtime scenario tests
//!
//! Programs are assembled in memory with `DexBuilder` and run on a VM whose
//! output and error reports are captured.

#![allow(dead_code)]

use dexvm_bytecode::dex::{ACC_PUBLIC, ACC_STATIC};
use dexvm_bytecode::{Asm, ClassBuilder, Code, DexBuilder, Opcode};
use dexvm_core::{SharedBuffer, Vm, VmOptions, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

/// Descriptor of the class every scenario starts in
pub const MAIN: &str = "Lapp/Main;";

/// Descriptor of `main`
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// Captured result of a run
pub struct Outcome {
    /// What `run` returned
    pub result: VmResult<()>,
    /// Everything written to `System.out`
    pub out: String,
    /// Reports handed to the error hook
    pub errors: Vec<String>,
}

impl Outcome {
    /// `System.out` split into lines
    pub fn lines(&self) -> Vec<&str> {
        self.out.lines().collect()
    }
}

/// A VM wired to in-memory sinks
///
/// `RUST_LOG=dexvm_core=trace` shows the dispatch trace of a failing test.
pub fn capturing_vm(options: VmOptions) -> (Vm, SharedBuffer, Rc<RefCell<Vec<String>>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let out = SharedBuffer::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::with_options(options)
        .with_output(out.clone())
        .with_error_output(SharedBuffer::new());
    let sink = Rc::clone(&errors);
    vm.set_error_hook(move |message| sink.borrow_mut().push(message.to_string()));
    (vm, out, errors)
}

/// Build `dex`, load it and run `app.Main`
pub fn run(dex: &DexBuilder) -> Outcome {
    run_with(dex, VmOptions::default())
}

/// Build `dex`, load it and run `app.Main` with `options`
pub fn run_with(dex: &DexBuilder, options: VmOptions) -> Outcome {
    let (mut vm, out, errors) = capturing_vm(options);
    let bytes = dex.build().expect("module builds");
    vm.load(&bytes).expect("module loads");
    let result = vm.run("app.Main", &[]);
    let errors = errors.borrow().clone();
    Outcome {
        result,
        out: out.contents(),
        errors,
    }
}

/// Method body with `registers` registers of which `ins` are parameters
pub fn body(registers: u16, ins: u16, asm: Asm) -> Code {
    Code::new(registers, ins, 5, asm.finish().expect("assembles"))
}

/// Add `app.Main` with a `main` made of `asm`
pub fn main_class(dex: &mut DexBuilder, registers: u16, asm: Asm) {
    main_class_with(dex, registers, asm, |class| class);
}

/// Add `app.Main` with `main`, letting `extra` add further members
pub fn main_class_with(
    dex: &mut DexBuilder,
    registers: u16,
    asm: Asm,
    extra: impl FnOnce(ClassBuilder) -> ClassBuilder,
) {
    let class = ClassBuilder::new(MAIN).direct_method(
        "main",
        MAIN_DESCRIPTOR,
        ACC_PUBLIC | ACC_STATIC,
        Some(body(registers, 1, asm)),
    );
    dex.add_class(extra(class));
}

/// `sget-object vA, System.out`
pub fn system_out(dex: &mut DexBuilder, asm: &mut Asm, a: u8) {
    let out = dex.field("Ljava/lang/System;", "out", "Ljava/io/PrintStream;");
    asm.op21c(Opcode::SgetObject, a, out);
}

/// `System.out.println(vValue)` for a one-word argument of `type_desc`
///
/// Clobbers `scratch`.
pub fn println(dex: &mut DexBuilder, asm: &mut Asm, scratch: u8, value: u8, type_desc: &str) {
    system_out(dex, asm, scratch);
    let method = dex.method("Ljava/io/PrintStream;", "println", &format!("({})V", type_desc));
    asm.invoke(Opcode::InvokeVirtual, method, &[scratch, value]);
}

/// `System.out.println(vValue, vValue+1)` for a wide argument of `type_desc`
pub fn println_wide(dex: &mut DexBuilder, asm: &mut Asm, scratch: u8, value: u8, type_desc: &str) {
    system_out(dex, asm, scratch);
    let method = dex.method("Ljava/io/PrintStream;", "println", &format!("({})V", type_desc));
    asm.invoke(Opcode::InvokeVirtual, method, &[scratch, value, value + 1]);
}

/// `System.out.println("text")`
pub fn println_text(dex: &mut DexBuilder, asm: &mut Asm, scratch: u8, text_reg: u8, text: &str) {
    let string = dex.string(text);
    asm.op21c(Opcode::ConstString, text_reg, string);
    println(dex, asm, scratch, text_reg, "Ljava/lang/String;");
}

/// Initialise `a` with `new Thread(vRunnable)`
pub fn new_thread(dex: &mut DexBuilder, asm: &mut Asm, a: u8, runnable: u8) {
    let thread = dex.type_id("Ljava/lang/Thread;");
    let init = dex.method("Ljava/lang/Thread;", "<init>", "(Ljava/lang/Runnable;)V");
    asm.op21c(Opcode::NewInstance, a, thread);
    asm.invoke(Opcode::InvokeDirect, init, &[a, runnable]);
}

/// `vThread.start()`
pub fn start(dex: &mut DexBuilder, asm: &mut Asm, thread: u8) {
    let method = dex.method("Ljava/lang/Thread;", "start", "()V");
    asm.invoke(Opcode::InvokeVirtual, method, &[thread]);
}

/// `vThread.join()`
pub fn join(dex: &mut DexBuilder, asm: &mut Asm, thread: u8) {
    let method = dex.method("Ljava/lang/Thread;", "join", "()V");
    asm.invoke(Opcode::InvokeVirtual, method, &[thread]);
}

/// `new vA = Class()` for a module class with a trivial constructor
pub fn new_object(dex: &mut DexBuilder, asm: &mut Asm, a: u8, class: &str) {
    let type_id = dex.type_id(class);
    let init = dex.method(class, "<init>", "()V");
    asm.op21c(Opcode::NewInstance, a, type_id);
    asm.invoke(Opcode::InvokeDirect, init, &[a]);
}

/// `<init>()V` that calls `super_class.<init>()V`
pub fn trivial_constructor(dex: &mut DexBuilder, super_class: &str) -> Code {
    let super_init = dex.method(super_class, "<init>", "()V");
    let mut asm = Asm::new();
    asm.invoke(Opcode::InvokeDirect, super_init, &[0]);
    asm.op10x(Opcode::ReturnVoid);
    body(1, 1, asm)
}
