//! `dexvm run` - load a module and run a class's `main`

use anyhow::{anyhow, Context};
use dexvm_core::{Vm, VmOptions};
use std::path::PathBuf;

/// Arguments of `dexvm run`
pub struct RunArgs {
    /// DEX module to load
    pub file: PathBuf,
    /// Dotted or slashed name of the class holding `main`
    pub main_class: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Options after config file and flag overrides
    pub options: VmOptions,
}

/// Run on a VM writing to the process streams
pub fn execute(args: &RunArgs) -> anyhow::Result<()> {
    let mut vm = Vm::with_options(args.options.clone());
    run_on(&mut vm, args)
}

/// Load `args.file` into `vm` and run its main class
///
/// Uncaught module exceptions are reported through the VM's error hook and
/// do not fail the command.
pub fn run_on(vm: &mut Vm, args: &RunArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    // VmError can carry a module object, which is not Send
    let classes = vm
        .load(&bytes)
        .map_err(|e| anyhow!("failed to load {}: {}", args.file.display(), e))?;
    log::debug!("{}: {} classes", args.file.display(), classes);
    vm.run(&args.main_class, &args.args)
        .map_err(|e| anyhow!("{} terminated: {}", args.main_class, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexvm_bytecode::dex::{ACC_PUBLIC, ACC_STATIC};
    use dexvm_bytecode::{Asm, ClassBuilder, Code, DexBuilder, Opcode};
    use dexvm_core::SharedBuffer;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    /// `main` prints each argument, then evaluates `tail`
    fn module(tail: impl FnOnce(&mut DexBuilder, &mut Asm)) -> Vec<u8> {
        let mut dex = DexBuilder::new();
        let out = dex.field("Ljava/lang/System;", "out", "Ljava/io/PrintStream;");
        let println = dex.method("Ljava/io/PrintStream;", "println", "(Ljava/lang/String;)V");

        let mut asm = Asm::new();
        let top = asm.new_label();
        let done = asm.new_label();
        asm.const_int(0, 0);
        asm.bind(top);
        asm.op12x(Opcode::ArrayLength, 1, 4);
        asm.op22t(Opcode::IfGe, 0, 1, done);
        asm.op23x(Opcode::AgetObject, 2, 4, 0);
        asm.op21c(Opcode::SgetObject, 3, out);
        asm.invoke(Opcode::InvokeVirtual, println, &[3, 2]);
        asm.op22b(Opcode::AddIntLit8, 0, 0, 1);
        asm.op20t(Opcode::Goto16, top);
        asm.bind(done);
        tail(&mut dex, &mut asm);
        asm.op10x(Opcode::ReturnVoid);

        let code = Code::new(5, 1, 2, asm.finish().unwrap());
        dex.add_class(ClassBuilder::new("Lcom/example/Main;").direct_method(
            "main",
            "([Ljava/lang/String;)V",
            ACC_PUBLIC | ACC_STATIC,
            Some(code),
        ));
        dex.build().unwrap()
    }

    fn write_module(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("classes.dex");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn capturing(options: VmOptions) -> (Vm, SharedBuffer, Rc<RefCell<Vec<String>>>) {
        let out = SharedBuffer::new();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let mut vm = Vm::with_options(options).with_output(out.clone());
        let sink = Rc::clone(&errors);
        vm.set_error_hook(move |message| sink.borrow_mut().push(message.to_string()));
        (vm, out, errors)
    }

    #[test]
    fn test_run_passes_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_module(dir.path(), &module(|_, _| {}));
        let (mut vm, out, errors) = capturing(VmOptions::default());
        let args = RunArgs {
            file,
            main_class: "com.example.Main".to_string(),
            args: vec!["one".to_string(), "two".to_string()],
            options: VmOptions::default(),
        };
        run_on(&mut vm, &args).unwrap();
        assert_eq!(out.contents(), "one\ntwo\n");
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            file: dir.path().join("absent.dex"),
            main_class: "Main".to_string(),
            args: Vec::new(),
            options: VmOptions::default(),
        };
        let err = execute(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read"));
    }

    #[test]
    fn test_bad_module() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_module(dir.path(), b"not a dex file");
        let args = RunArgs {
            file,
            main_class: "Main".to_string(),
            args: Vec::new(),
            options: VmOptions::default(),
        };
        let err = execute(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load"));
    }

    #[test]
    fn test_unknown_main_class() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_module(dir.path(), &module(|_, _| {}));
        let (mut vm, _out, _errors) = capturing(VmOptions::default());
        let args = RunArgs {
            file,
            main_class: "com.example.Other".to_string(),
            args: Vec::new(),
            options: VmOptions::default(),
        };
        let err = run_on(&mut vm, &args).unwrap_err();
        assert!(format!("{:#}", err).contains("no such class"));
    }

    #[test]
    fn test_not_implemented_fails_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = module(|dex, asm| {
            let runtime = dex.method("Ljava/lang/Runtime;", "getRuntime", "()Ljava/lang/Runtime;");
            asm.invoke(Opcode::InvokeStatic, runtime, &[]);
        });
        let file = write_module(dir.path(), &bytes);
        let (mut vm, _out, _errors) = capturing(VmOptions::default());
        let args = RunArgs {
            file,
            main_class: "com.example.Main".to_string(),
            args: Vec::new(),
            options: VmOptions::default(),
        };
        let err = run_on(&mut vm, &args).unwrap_err();
        assert!(format!("{:#}", err).contains("not implemented class method"));
    }
}
