//! End-to-end programs covering arithmetic, overloads, wait/notify and finally

mod common;

use common::*;
use dexvm_bytecode::dex::{ACC_PUBLIC, ACC_STATIC};
use dexvm_bytecode::{Asm, ClassBuilder, Code, DexBuilder, Opcode};

/// Print `<NUM VAL=vValue>` through a `StringBuilder`
///
/// Uses v0, v1 and v5.
fn print_num(dex: &mut DexBuilder, asm: &mut Asm, value: u8) {
    let builder = "Ljava/lang/StringBuilder;";
    let type_id = dex.type_id(builder);
    let init = dex.method(builder, "<init>", "()V");
    let append_text = dex.method(builder, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;");
    let append_int = dex.method(builder, "append", "(I)Ljava/lang/StringBuilder;");
    let to_string = dex.method(builder, "toString", "()Ljava/lang/String;");
    let open = dex.string("<NUM VAL=");
    let close = dex.string(">");

    asm.op21c(Opcode::NewInstance, 5, type_id);
    asm.invoke(Opcode::InvokeDirect, init, &[5]);
    asm.op21c(Opcode::ConstString, 1, open);
    asm.invoke(Opcode::InvokeVirtual, append_text, &[5, 1]);
    asm.invoke(Opcode::InvokeVirtual, append_int, &[5, value]);
    asm.op21c(Opcode::ConstString, 1, close);
    asm.invoke(Opcode::InvokeVirtual, append_text, &[5, 1]);
    asm.invoke(Opcode::InvokeVirtual, to_string, &[5]);
    asm.op11x(Opcode::MoveResultObject, 1);
    println(dex, asm, 0, 1, "Ljava/lang/String;");
}

#[test]
fn test_integer_arithmetic() {
    let mut dex = DexBuilder::new();
    let mut asm = Asm::new();
    asm.const_int(2, 8);
    asm.const_int(3, 2);
    for op in [
        Opcode::AddInt,
        Opcode::SubInt,
        Opcode::MulInt,
        Opcode::DivInt,
        Opcode::RemInt,
    ] {
        asm.op23x(op, 4, 2, 3);
        print_num(&mut dex, &mut asm, 4);
    }
    asm.op12x(Opcode::NegInt, 4, 2);
    print_num(&mut dex, &mut asm, 4);
    for op in [
        Opcode::ShlInt,
        Opcode::ShrInt,
        Opcode::UshrInt,
        Opcode::AndInt,
        Opcode::OrInt,
        Opcode::XorInt,
    ] {
        asm.op23x(op, 4, 2, 3);
        print_num(&mut dex, &mut asm, 4);
    }
    asm.op22b(Opcode::AddIntLit8, 2, 2, 1);
    print_num(&mut dex, &mut asm, 2);
    asm.op10x(Opcode::ReturnVoid);
    main_class(&mut dex, 7, asm);

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    let expected: Vec<String> = [10, 6, 16, 4, 0, -8, 32, 2, 2, 0, 10, 10, 9]
        .iter()
        .map(|n| format!("<NUM VAL={}>", n))
        .collect();
    assert_eq!(outcome.lines(), expected);
}

#[test]
fn test_division_by_zero_throws() {
    let mut dex = DexBuilder::new();
    let mut asm = Asm::new();
    let start = asm.pos();
    asm.const_int(2, 1);
    asm.const_int(3, 0);
    asm.op23x(Opcode::DivInt, 4, 2, 3);
    let end = asm.pos();
    asm.op10x(Opcode::ReturnVoid);
    let handler = asm.pos();
    asm.op11x(Opcode::MoveException, 4);
    println(&mut dex, &mut asm, 0, 4, "Ljava/lang/Object;");
    asm.op10x(Opcode::ReturnVoid);
    let code = body(5, 1, asm).catch(start, end, &[("Ljava/lang/ArithmeticException;", handler)], None);
    dex.add_class(ClassBuilder::new(MAIN).direct_method(
        "main",
        MAIN_DESCRIPTOR,
        ACC_PUBLIC | ACC_STATIC,
        Some(code),
    ));

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["java.lang.ArithmeticException: / by zero"]);
}

/// `show(T)V` printing its argument before and after `bump`
fn show(
    dex: &mut DexBuilder,
    type_desc: &str,
    print_as: &str,
    bump: impl FnOnce(&mut DexBuilder, &mut Asm),
) -> (String, Code) {
    let mut asm = Asm::new();
    println(dex, &mut asm, 0, 2, print_as);
    bump(dex, &mut asm);
    println(dex, &mut asm, 0, 2, print_as);
    asm.op10x(Opcode::ReturnVoid);
    (format!("({})V", type_desc), body(3, 1, asm))
}

#[test]
fn test_overload_resolution() {
    let mut dex = DexBuilder::new();
    let hello = dex.string("hello");

    let mut methods = vec![
        show(&mut dex, "Z", "Z", |_, asm| asm.op22b(Opcode::XorIntLit8, 2, 2, 1)),
        show(&mut dex, "C", "C", |_, asm| {
            asm.op22b(Opcode::AddIntLit8, 2, 2, 1);
            asm.op12x(Opcode::IntToChar, 2, 2);
        }),
        show(&mut dex, "B", "I", |_, asm| {
            asm.op22b(Opcode::AddIntLit8, 2, 2, 1);
            asm.op12x(Opcode::IntToByte, 2, 2);
        }),
        show(&mut dex, "S", "I", |_, asm| {
            asm.op22b(Opcode::AddIntLit8, 2, 2, 1);
            asm.op12x(Opcode::IntToShort, 2, 2);
        }),
        show(&mut dex, "I", "I", |_, asm| asm.op22b(Opcode::AddIntLit8, 2, 2, 1)),
        show(&mut dex, "Ljava/lang/String;", "Ljava/lang/String;", |dex, asm| {
            let concat = dex.method("Ljava/lang/String;", "concat", "(Ljava/lang/String;)Ljava/lang/String;");
            asm.invoke(Opcode::InvokeVirtual, concat, &[2, 2]);
            asm.op11x(Opcode::MoveResultObject, 2);
        }),
    ];

    let mut long = Asm::new();
    println_wide(&mut dex, &mut long, 0, 3, "J");
    long.const_wide(1, 1);
    long.op12x(Opcode::AddLong2Addr, 3, 1);
    println_wide(&mut dex, &mut long, 0, 3, "J");
    long.op10x(Opcode::ReturnVoid);
    methods.push(("(J)V".to_string(), body(5, 2, long)));

    let mut none = Asm::new();
    none.op21c(Opcode::ConstString, 1, hello);
    println(&mut dex, &mut none, 0, 1, "Ljava/lang/String;");
    none.op10x(Opcode::ReturnVoid);
    methods.push(("()V".to_string(), body(2, 0, none)));

    let mut asm = Asm::new();
    let call = |dex: &mut DexBuilder, asm: &mut Asm, descriptor: &str, regs: &[u8]| {
        let method = dex.method(MAIN, "show", descriptor);
        asm.invoke(Opcode::InvokeStatic, method, regs);
    };
    call(&mut dex, &mut asm, "()V", &[]);
    asm.const_int(1, 0);
    call(&mut dex, &mut asm, "(Z)V", &[1]);
    asm.const_int(1, 1);
    call(&mut dex, &mut asm, "(Z)V", &[1]);
    asm.const_int(1, 'a' as i32);
    call(&mut dex, &mut asm, "(C)V", &[1]);
    asm.const_int(1, 1);
    call(&mut dex, &mut asm, "(B)V", &[1]);
    asm.const_int(1, 2);
    call(&mut dex, &mut asm, "(S)V", &[1]);
    asm.const_int(1, 3);
    call(&mut dex, &mut asm, "(I)V", &[1]);
    asm.const_wide(2, 4);
    call(&mut dex, &mut asm, "(J)V", &[2, 3]);
    let ab = dex.string("ab");
    asm.op21c(Opcode::ConstString, 1, ab);
    call(&mut dex, &mut asm, "(Ljava/lang/String;)V", &[1]);
    asm.op10x(Opcode::ReturnVoid);

    main_class_with(&mut dex, 5, asm, |mut class| {
        for (descriptor, code) in methods {
            class = class.direct_method("show", &descriptor, ACC_PUBLIC | ACC_STATIC, Some(code));
        }
        class
    });

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        outcome.lines(),
        vec![
            "hello", "false", "true", "true", "false", "a", "b", "1", "2", "2", "3", "3", "4", "4", "5", "ab", "abab"
        ]
    );
}

#[test]
fn test_wait_notify_order() {
    let waiter = "Lapp/Waiter;";
    let mut dex = DexBuilder::new();
    let lock = dex.field(MAIN, "lock", "Ljava/lang/Object;");
    let object = dex.type_id("Ljava/lang/Object;");
    let object_init = dex.method("Ljava/lang/Object;", "<init>", "()V");
    let wait = dex.method("Ljava/lang/Object;", "wait", "()V");
    let notify = dex.method("Ljava/lang/Object;", "notify", "()V");
    let ready = dex.field(MAIN, "ready", "I");
    let yield_now = dex.method("Ljava/lang/Thread;", "yield", "()V");

    // Waiter.run: synchronized (lock) { print; ready = 1; lock.wait(); print }
    let mut run_body = Asm::new();
    run_body.op21c(Opcode::SgetObject, 2, lock);
    run_body.op11x(Opcode::MonitorEnter, 2);
    println_text(&mut dex, &mut run_body, 0, 1, "waiting");
    run_body.const_int(0, 1);
    run_body.op21c(Opcode::Sput, 0, ready);
    run_body.invoke(Opcode::InvokeVirtual, wait, &[2]);
    println_text(&mut dex, &mut run_body, 0, 1, "notified");
    run_body.op11x(Opcode::MonitorExit, 2);
    run_body.op10x(Opcode::ReturnVoid);
    let constructor = trivial_constructor(&mut dex, "Ljava/lang/Object;");
    dex.add_class(
        ClassBuilder::new(waiter)
            .interface("Ljava/lang/Runnable;")
            .direct_method("<init>", "()V", ACC_PUBLIC, Some(constructor))
            .virtual_method("run", "()V", ACC_PUBLIC, Some(body(4, 1, run_body))),
    );

    let mut asm = Asm::new();
    asm.op21c(Opcode::NewInstance, 2, object);
    asm.invoke(Opcode::InvokeDirect, object_init, &[2]);
    asm.op21c(Opcode::SputObject, 2, lock);
    new_object(&mut dex, &mut asm, 1, waiter);
    new_thread(&mut dex, &mut asm, 3, 1);
    start(&mut dex, &mut asm, 3);
    // while (ready == 0) Thread.yield(); the waiter only leaves the
    // monitor by waiting, so main gets it once the waiter is in the wait-set
    let spin = asm.new_label();
    let go = asm.new_label();
    asm.bind(spin);
    asm.op21c(Opcode::Sget, 4, ready);
    asm.op21t(Opcode::IfNez, 4, go);
    asm.invoke(Opcode::InvokeStatic, yield_now, &[]);
    asm.op20t(Opcode::Goto16, spin);
    asm.bind(go);
    asm.op11x(Opcode::MonitorEnter, 2);
    println_text(&mut dex, &mut asm, 0, 1, "notifying");
    asm.invoke(Opcode::InvokeVirtual, notify, &[2]);
    println_text(&mut dex, &mut asm, 0, 1, "notify done");
    asm.op11x(Opcode::MonitorExit, 2);
    join(&mut dex, &mut asm, 3);
    println_text(&mut dex, &mut asm, 0, 1, "end");
    asm.op10x(Opcode::ReturnVoid);
    main_class_with(&mut dex, 7, asm, |class| {
        class
            .static_field("lock", "Ljava/lang/Object;", None)
            .static_field("ready", "I", None)
    });

    let outcome = run(&dex);
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(
        outcome.lines(),
        vec!["waiting", "notifying", "notify done", "notified", "end"]
    );
}

/// `fail()V`: throws `RuntimeException("boom")` two frames down
fn failing_methods(dex: &mut DexBuilder) -> Vec<(&'static str, Code)> {
    let exception = "Ljava/lang/RuntimeException;";
    let type_id = dex.type_id(exception);
    let init = dex.method(exception, "<init>", "(Ljava/lang/String;)V");
    let boom = dex.string("boom");
    let deeper = dex.method(MAIN, "deeper", "()V");

    let mut deepest = Asm::new();
    deepest.op21c(Opcode::NewInstance, 0, type_id);
    deepest.op21c(Opcode::ConstString, 1, boom);
    deepest.invoke(Opcode::InvokeDirect, init, &[0, 1]);
    deepest.op11x(Opcode::Throw, 0);

    let mut fail = Asm::new();
    fail.invoke(Opcode::InvokeStatic, deeper, &[]);
    fail.op10x(Opcode::ReturnVoid);

    vec![("deeper", body(2, 0, deepest)), ("fail", body(1, 0, fail))]
}

/// `try { fail() } catch (RuntimeException e) { print; rethrow? } finally { print }`
///
/// The guarded method is `guarded()V`; `main` calls it inside its own
/// catch-all that prints "outer".
fn finally_program(rethrow: bool) -> DexBuilder {
    let mut dex = DexBuilder::new();
    let fail = dex.method(MAIN, "fail", "()V");
    let guarded = dex.method(MAIN, "guarded", "()V");
    let mut methods = failing_methods(&mut dex);

    let mut asm = Asm::new();
    let try_start = asm.pos();
    asm.invoke(Opcode::InvokeStatic, fail, &[]);
    let try_end = asm.pos();
    println_text(&mut dex, &mut asm, 0, 1, "finally");
    asm.op10x(Opcode::ReturnVoid);

    let catch_start = asm.pos();
    asm.op11x(Opcode::MoveException, 2);
    println_text(&mut dex, &mut asm, 0, 1, "caught");
    if rethrow {
        asm.op11x(Opcode::Throw, 2);
    }
    let catch_end = asm.pos();
    println_text(&mut dex, &mut asm, 0, 1, "finally");
    asm.op10x(Opcode::ReturnVoid);

    let finally_start = asm.pos();
    asm.op11x(Opcode::MoveException, 2);
    println_text(&mut dex, &mut asm, 0, 1, "finally");
    asm.op11x(Opcode::Throw, 2);

    let code = body(3, 0, asm)
        .catch(
            try_start,
            try_end,
            &[("Ljava/lang/RuntimeException;", catch_start)],
            Some(finally_start),
        )
        .catch(catch_start, catch_end, &[], Some(finally_start));
    methods.push(("guarded", code));

    let mut main = Asm::new();
    let start = main.pos();
    main.invoke(Opcode::InvokeStatic, guarded, &[]);
    let end = main.pos();
    println_text(&mut dex, &mut main, 0, 1, "done");
    main.op10x(Opcode::ReturnVoid);
    let handler = main.pos();
    main.op11x(Opcode::MoveException, 2);
    println_text(&mut dex, &mut main, 0, 1, "outer");
    main.op10x(Opcode::ReturnVoid);
    let main_code = body(4, 1, main).catch(start, end, &[], Some(handler));

    let mut class = ClassBuilder::new(MAIN).direct_method(
        "main",
        MAIN_DESCRIPTOR,
        ACC_PUBLIC | ACC_STATIC,
        Some(main_code),
    );
    for (name, code) in methods {
        class = class.direct_method(name, "()V", ACC_PUBLIC | ACC_STATIC, Some(code));
    }
    dex.add_class(class);
    dex
}

#[test]
fn test_finally_runs_once_after_catch() {
    let outcome = run(&finally_program(false));
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["caught", "finally", "done"]);
}

#[test]
fn test_finally_runs_once_on_rethrow() {
    let outcome = run(&finally_program(true));
    assert!(outcome.result.is_ok(), "{:?}", outcome.result);
    assert_eq!(outcome.lines(), vec!["caught", "finally", "outer"]);
    assert!(outcome.errors.is_empty());
}
