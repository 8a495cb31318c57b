//! Green threads: monitors, interrupts, joins and stopping

mod common;

use common::*;
use dexvm_bytecode::dex::{ACC_PUBLIC, ACC_STATIC};
use dexvm_bytecode::{Asm, ClassBuilder, DexBuilder, Opcode};
use dexvm_core::{VmError, VmOptions};
use std::time::Duration;

/// Add a `Runnable` module class whose `run()` is `run_body`
fn runnable(dex: &mut DexBuilder, descriptor: &str, registers: u16, run_body: Asm) {
    let constructor = trivial_constructor(dex, "Ljava/lang/Object;");
    dex.add_class(
        ClassBuilder::new(descriptor)
            .interface("Ljava/lang/Runnable;")
            .direct_method("<init>", "()V", ACC_PUBLIC, Some(constructor))
            .virtual_method("run", "()V", ACC_PUBLIC, Some(body(registers, 1, run_body))),
    );
}

/// `vA = new Object()` stored in `Main.lock`
fn new_lock(dex: &mut DexBuilder, asm: &mut Asm, a: u8) {
    let object = dex.type_id("Ljava/lang/Object;");
    let init = dex.method("Ljava/lang/Object;", "<init>", "()V");
    let lock = dex.field(MAIN, "lock", "Ljava/lang/Object;");
    asm.op21c(Opcode::NewInstance, a, object);
    asm.invoke(Opcode::InvokeDirect, init, &[a]);
    asm.op21c(Opcode::SputObject, a, lock);
}

fn with_lock(class: ClassBuilder) -> ClassBuilder {
    class.static_field("lock", "Ljava/lang/Object;", None)
}

#[test]
fn test_monitor_excludes_other_threads() {
    let worker = "Lapp/Worker;";
    let mut dex = DexBuilder::new();
    let lock = dex.field(MAIN, "lock", "Ljava/lang/Object;");
    let count = dex.field(MAIN, "count", "I");
    let yield_now = dex.method("Ljava/lang/Thread;", "yield", "()V");

    // five times: synchronized (lock) { c = count; yield; count = c + 1 }
    let mut run_body = Asm::new();
    let top = run_body.new_label();
    let done = run_body.new_label();
    run_body.const_int(0, 0);
    run_body.bind(top);
    run_body.const_int(1, 5);
    run_body.op22t(Opcode::IfGe, 0, 1, done);
    run_body.op21c(Opcode::SgetObject, 2, lock);
    run_body.op11x(Opcode::MonitorEnter, 2);
    run_body.op21c(Opcode::Sget, 3, count);
    run_body.invoke(Opcode::InvokeStatic, yield_now, &[]);
    run_body.op22b(Opcode::AddIntLit8, 3, 3, 1);
    run_body.op21c(Opcode::Sput, 3, count);
    run_body.op11x(Opcode::MonitorExit, 2);
    run_body.op22b(Opcode::AddIntLit8, 0, 0, 1);
    run_body.op20t(Opcode::Goto16, top);
    run_body.bind(done);
    run_body.op10x(Opcode::ReturnVoid);
    runnable(&mut dex, worker, 5, run_body);

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 1);
    new_object(&mut dex, &mut asm, 1, worker);
    new_thread(&mut dex, &mut asm, 2, 1);
    new_object(&mut dex, &mut asm, 1, worker);
    new_thread(&mut dex, &mut asm, 3, 1);
    start(&mut dex, &mut asm, 2);
    start(&mut dex, &mut asm, 3);
    join(&mut dex, &mut asm, 2);
    join(&mut dex, &mut asm, 3);
    asm.op21c(Opcode::Sget, 1, count);
    println(&mut dex, &mut asm, 0, 1, "I");
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 5, asm, |class| with_lock(class).static_field("count", "I", None));

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["10"]);
}

#[test]
fn test_interrupt_wakes_sleeper() {
    let sleeper = "Lapp/Sleeper;";
    let mut dex = DexBuilder::new();
    let sleep = dex.method("Ljava/lang/Thread;", "sleep", "(J)V");
    let yield_now = dex.method("Ljava/lang/Thread;", "yield", "()V");
    let interrupt = dex.method("Ljava/lang/Thread;", "interrupt", "()V");

    let mut run_body = Asm::new();
    let start_pc = run_body.pos();
    run_body.const_wide(0, 10_000);
    run_body.invoke(Opcode::InvokeStatic, sleep, &[0, 1]);
    let end_pc = run_body.pos();
    println_text(&mut dex, &mut run_body, 0, 1, "slept");
    run_body.op10x(Opcode::ReturnVoid);
    let handler = run_body.pos();
    run_body.op11x(Opcode::MoveException, 2);
    println_text(&mut dex, &mut run_body, 0, 1, "interrupted");
    run_body.op10x(Opcode::ReturnVoid);
    let code = body(4, 1, run_body).catch(
        start_pc,
        end_pc,
        &[("Ljava/lang/InterruptedException;", handler)],
        None,
    );
    let constructor = trivial_constructor(&mut dex, "Ljava/lang/Object;");
    dex.add_class(
        ClassBuilder::new(sleeper)
            .interface("Ljava/lang/Runnable;")
            .direct_method("<init>", "()V", ACC_PUBLIC, Some(constructor))
            .virtual_method("run", "()V", ACC_PUBLIC, Some(code)),
    );

    let mut asm = Asm::new();
    new_object(&mut dex, &mut asm, 1, sleeper);
    new_thread(&mut dex, &mut asm, 2, 1);
    start(&mut dex, &mut asm, 2);
    asm.invoke(Opcode::InvokeStatic, yield_now, &[]);
    asm.invoke(Opcode::InvokeVirtual, interrupt, &[2]);
    join(&mut dex, &mut asm, 2);
    println_text(&mut dex, &mut asm, 0, 1, "joined");
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 4, asm);

    let started = std::time::Instant::now();
    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["interrupted", "joined"]);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_interrupt_wakes_waiter() {
    let waiter = "Lapp/Waiter;";
    let mut dex = DexBuilder::new();
    let lock = dex.field(MAIN, "lock", "Ljava/lang/Object;");
    let wait = dex.method("Ljava/lang/Object;", "wait", "()V");
    let yield_now = dex.method("Ljava/lang/Thread;", "yield", "()V");
    let interrupt = dex.method("Ljava/lang/Thread;", "interrupt", "()V");

    let mut run_body = Asm::new();
    run_body.op21c(Opcode::SgetObject, 2, lock);
    run_body.op11x(Opcode::MonitorEnter, 2);
    let start_pc = run_body.pos();
    run_body.invoke(Opcode::InvokeVirtual, wait, &[2]);
    let end_pc = run_body.pos();
    println_text(&mut dex, &mut run_body, 0, 1, "notified");
    run_body.op11x(Opcode::MonitorExit, 2);
    run_body.op10x(Opcode::ReturnVoid);
    let handler = run_body.pos();
    run_body.op11x(Opcode::MoveException, 3);
    println_text(&mut dex, &mut run_body, 0, 1, "wait interrupted");
    run_body.op11x(Opcode::MonitorExit, 2);
    run_body.op10x(Opcode::ReturnVoid);
    let code = body(5, 1, run_body).catch(
        start_pc,
        end_pc,
        &[("Ljava/lang/InterruptedException;", handler)],
        None,
    );
    let constructor = trivial_constructor(&mut dex, "Ljava/lang/Object;");
    dex.add_class(
        ClassBuilder::new(waiter)
            .interface("Ljava/lang/Runnable;")
            .direct_method("<init>", "()V", ACC_PUBLIC, Some(constructor))
            .virtual_method("run", "()V", ACC_PUBLIC, Some(code)),
    );

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 1);
    new_object(&mut dex, &mut asm, 1, waiter);
    new_thread(&mut dex, &mut asm, 2, 1);
    start(&mut dex, &mut asm, 2);
    // the waiter reaches wait() within its first turn
    asm.invoke(Opcode::InvokeStatic, yield_now, &[]);
    asm.invoke(Opcode::InvokeVirtual, interrupt, &[2]);
    join(&mut dex, &mut asm, 2);
    println_text(&mut dex, &mut asm, 0, 1, "joined");
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 6, asm, with_lock);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["wait interrupted", "joined"]);
}

#[test]
fn test_timed_wait_returns_without_notify() {
    let mut dex = DexBuilder::new();
    let wait = dex.method("Ljava/lang/Object;", "wait", "(J)V");

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 2);
    asm.op11x(Opcode::MonitorEnter, 2);
    asm.const_wide(3, 5);
    asm.invoke(Opcode::InvokeVirtual, wait, &[2, 3, 4]);
    println_text(&mut dex, &mut asm, 0, 1, "woke");
    asm.op11x(Opcode::MonitorExit, 2);
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 6, asm, with_lock);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["woke"]);
}

#[test]
fn test_notify_without_owning_monitor() {
    let mut dex = DexBuilder::new();
    let notify = dex.method("Ljava/lang/Object;", "notify", "()V");

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 2);
    let start_pc = asm.pos();
    asm.invoke(Opcode::InvokeVirtual, notify, &[2]);
    let end_pc = asm.pos();
    asm.op10x(Opcode::ReturnVoid);
    let handler = asm.pos();
    asm.op11x(Opcode::MoveException, 3);
    println(&mut dex, &mut asm, 0, 3, "Ljava/lang/Object;");
    asm.op10x(Opcode::ReturnVoid);
    let code = body(5, 1, asm).catch(
        start_pc,
        end_pc,
        &[("Ljava/lang/IllegalMonitorStateException;", handler)],
        None,
    );
    dex.add_class(with_lock(ClassBuilder::new(MAIN)).direct_method(
        "main",
        MAIN_DESCRIPTOR,
        ACC_PUBLIC | ACC_STATIC,
        Some(code),
    ));

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines().len(), 1);
    assert!(outcome.lines()[0].starts_with("java.lang.IllegalMonitorStateException"));
}

#[test]
fn test_join_finished_thread_returns() {
    let worker = "Lapp/Worker;";
    let mut dex = DexBuilder::new();
    let sleep = dex.method("Ljava/lang/Thread;", "sleep", "(J)V");

    let mut run_body = Asm::new();
    println_text(&mut dex, &mut run_body, 0, 1, "worker");
    run_body.op10x(Opcode::ReturnVoid);
    runnable(&mut dex, worker, 3, run_body);

    let mut asm = Asm::new();
    new_object(&mut dex, &mut asm, 1, worker);
    new_thread(&mut dex, &mut asm, 2, 1);
    start(&mut dex, &mut asm, 2);
    asm.const_wide(3, 20);
    asm.invoke(Opcode::InvokeStatic, sleep, &[3, 4]);
    join(&mut dex, &mut asm, 2);
    println_text(&mut dex, &mut asm, 0, 1, "after");
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 6, asm);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["worker", "after"]);
}

#[test]
fn test_uncaught_exception_ends_only_its_thread() {
    let thrower = "Lapp/Thrower;";
    let mut dex = DexBuilder::new();
    let exception = "Ljava/lang/IllegalStateException;";
    let type_id = dex.type_id(exception);
    let init = dex.method(exception, "<init>", "(Ljava/lang/String;)V");
    let boom = dex.string("boom");

    let mut run_body = Asm::new();
    run_body.op21c(Opcode::NewInstance, 0, type_id);
    run_body.op21c(Opcode::ConstString, 1, boom);
    run_body.invoke(Opcode::InvokeDirect, init, &[0, 1]);
    run_body.op11x(Opcode::Throw, 0);
    runnable(&mut dex, thrower, 3, run_body);

    let mut asm = Asm::new();
    new_object(&mut dex, &mut asm, 1, thrower);
    new_thread(&mut dex, &mut asm, 2, 1);
    start(&mut dex, &mut asm, 2);
    join(&mut dex, &mut asm, 2);
    println_text(&mut dex, &mut asm, 0, 1, "main still running");
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 4, asm);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["main still running"]);
    assert_eq!(outcome.errors, vec!["java.lang.IllegalStateException:boom"]);
}

#[test]
fn test_thread_name_and_priority() {
    let mut dex = DexBuilder::new();
    let current = dex.method("Ljava/lang/Thread;", "currentThread", "()Ljava/lang/Thread;");
    let get_name = dex.method("Ljava/lang/Thread;", "getName", "()Ljava/lang/String;");
    let set_priority = dex.method("Ljava/lang/Thread;", "setPriority", "(I)V");
    let get_priority = dex.method("Ljava/lang/Thread;", "getPriority", "()I");

    let mut asm = Asm::new();
    asm.invoke(Opcode::InvokeStatic, current, &[]);
    asm.op11x(Opcode::MoveResultObject, 2);
    asm.invoke(Opcode::InvokeVirtual, get_name, &[2]);
    asm.op11x(Opcode::MoveResultObject, 1);
    println(&mut dex, &mut asm, 0, 1, "Ljava/lang/String;");
    asm.invoke(Opcode::InvokeVirtual, get_priority, &[2]);
    asm.op11x(Opcode::MoveResult, 1);
    println(&mut dex, &mut asm, 0, 1, "I");
    asm.const_int(1, 10);
    asm.invoke(Opcode::InvokeVirtual, set_priority, &[2, 1]);
    asm.invoke(Opcode::InvokeVirtual, get_priority, &[2]);
    asm.op11x(Opcode::MoveResult, 1);
    println(&mut dex, &mut asm, 0, 1, "I");
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 4, asm);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["main", "5", "10"]);
}

#[test]
fn test_deadlock_is_reported() {
    let mut dex = DexBuilder::new();
    let wait = dex.method("Ljava/lang/Object;", "wait", "()V");

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 1);
    asm.op11x(Opcode::MonitorEnter, 1);
    asm.invoke(Opcode::InvokeVirtual, wait, &[1]);
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 3, asm, with_lock);

    let outcome = run(&dex);
    assert!(matches!(outcome.result, Err(VmError::Deadlock(_))), "{:?}", outcome.result);
}

#[test]
fn test_stop_handle_from_another_thread() {
    let mut dex = DexBuilder::new();
    let mut asm = Asm::new();
    let spin = asm.new_label();
    asm.bind(spin);
    asm.op10x(Opcode::Nop);
    asm.op10t(Opcode::Goto, spin);
    main_class(&mut dex, 1, asm);

    let (mut vm, _out, _errors) = capturing_vm(VmOptions::default());
    vm.load(&dex.build().unwrap()).unwrap();
    let handle = vm.stop_handle();
    let stopper = std::thread::spawn(move || {
        while !handle.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(20));
        handle.stop();
        handle.is_running()
    });

    let result = vm.run("app.Main", &[]);
    assert!(result.is_ok(), "{:?}", result);
    assert!(vm.is_end());
    assert!(!stopper.join().unwrap());
}

/// Add a module class with a trivial constructor and `toString()` made of `to_string`
fn printable(dex: &mut DexBuilder, descriptor: &str, registers: u16, to_string: Asm) {
    let constructor = trivial_constructor(dex, "Ljava/lang/Object;");
    dex.add_class(
        ClassBuilder::new(descriptor)
            .direct_method("<init>", "()V", ACC_PUBLIC, Some(constructor))
            .virtual_method(
                "toString",
                "()Ljava/lang/String;",
                ACC_PUBLIC,
                Some(body(registers, 1, to_string)),
            ),
    );
}

#[test]
fn test_to_string_may_sleep_under_println() {
    let foo = "Lapp/Foo;";
    let mut dex = DexBuilder::new();
    let sleep = dex.method("Ljava/lang/Thread;", "sleep", "(J)V");
    let text = dex.string("foo!");

    let mut to_string = Asm::new();
    to_string.const_wide(0, 1);
    to_string.invoke(Opcode::InvokeStatic, sleep, &[0, 1]);
    to_string.op21c(Opcode::ConstString, 0, text);
    to_string.op11x(Opcode::ReturnObject, 0);
    printable(&mut dex, foo, 3, to_string);

    let mut asm = Asm::new();
    new_object(&mut dex, &mut asm, 2, foo);
    println(&mut dex, &mut asm, 0, 2, "Ljava/lang/Object;");
    println_text(&mut dex, &mut asm, 0, 1, "after");
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 4, asm);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["foo!", "after"]);
}

#[test]
fn test_to_string_waits_for_monitor_held_by_other_thread() {
    let holder = "Lapp/Holder;";
    let foo = "Lapp/Foo;";
    let mut dex = DexBuilder::new();
    let lock = dex.field(MAIN, "lock", "Ljava/lang/Object;");
    let sleep = dex.method("Ljava/lang/Thread;", "sleep", "(J)V");
    let yield_now = dex.method("Ljava/lang/Thread;", "yield", "()V");
    let text = dex.string("foo!");

    // synchronized (lock) { Thread.sleep(20); println("released") }
    let mut run_body = Asm::new();
    run_body.op21c(Opcode::SgetObject, 0, lock);
    run_body.op11x(Opcode::MonitorEnter, 0);
    run_body.const_wide(1, 20);
    run_body.invoke(Opcode::InvokeStatic, sleep, &[1, 2]);
    println_text(&mut dex, &mut run_body, 1, 2, "released");
    run_body.op11x(Opcode::MonitorExit, 0);
    run_body.op10x(Opcode::ReturnVoid);
    runnable(&mut dex, holder, 4, run_body);

    // synchronized (lock) { return "foo!" }
    let mut to_string = Asm::new();
    to_string.op21c(Opcode::SgetObject, 0, lock);
    to_string.op11x(Opcode::MonitorEnter, 0);
    to_string.op21c(Opcode::ConstString, 1, text);
    to_string.op11x(Opcode::MonitorExit, 0);
    to_string.op11x(Opcode::ReturnObject, 1);
    printable(&mut dex, foo, 3, to_string);

    let mut asm = Asm::new();
    new_lock(&mut dex, &mut asm, 1);
    new_object(&mut dex, &mut asm, 1, holder);
    new_thread(&mut dex, &mut asm, 2, 1);
    start(&mut dex, &mut asm, 2);
    asm.invoke(Opcode::InvokeStatic, yield_now, &[]);
    new_object(&mut dex, &mut asm, 3, foo);
    println(&mut dex, &mut asm, 0, 3, "Ljava/lang/Object;");
    join(&mut dex, &mut asm, 2);
    println_text(&mut dex, &mut asm, 0, 1, "done");
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 5, asm, with_lock);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["released", "foo!", "done"]);
}

#[test]
fn test_exception_from_sleeping_to_string_reaches_caller() {
    let foo = "Lapp/Foo;";
    let mut dex = DexBuilder::new();
    let sleep = dex.method("Ljava/lang/Thread;", "sleep", "(J)V");
    let exception = "Ljava/lang/IllegalStateException;";
    let type_id = dex.type_id(exception);
    let init = dex.method(exception, "<init>", "()V");

    let mut to_string = Asm::new();
    to_string.const_wide(0, 1);
    to_string.invoke(Opcode::InvokeStatic, sleep, &[0, 1]);
    to_string.op21c(Opcode::NewInstance, 0, type_id);
    to_string.invoke(Opcode::InvokeDirect, init, &[0]);
    to_string.op11x(Opcode::Throw, 0);
    printable(&mut dex, foo, 3, to_string);

    let mut asm = Asm::new();
    new_object(&mut dex, &mut asm, 2, foo);
    let start_pc = asm.pos();
    println(&mut dex, &mut asm, 0, 2, "Ljava/lang/Object;");
    let end_pc = asm.pos();
    asm.op10x(Opcode::ReturnVoid);
    let handler = asm.pos();
    asm.op11x(Opcode::MoveException, 3);
    println(&mut dex, &mut asm, 0, 3, "Ljava/lang/Object;");
    asm.op10x(Opcode::ReturnVoid);
    let code = body(5, 1, asm).catch(start_pc, end_pc, &[(exception, handler)], None);
    dex.add_class(ClassBuilder::new(MAIN).direct_method(
        "main",
        MAIN_DESCRIPTOR,
        ACC_PUBLIC | ACC_STATIC,
        Some(code),
    ));

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["java.lang.IllegalStateException"]);
    assert!(outcome.errors.is_empty());
}
