//! Module loader tests over modules written by `DexBuilder`

use dexvm_bytecode::dex::{ACC_ABSTRACT, ACC_PUBLIC, ACC_STATIC, ACC_SYNCHRONIZED};
use dexvm_bytecode::{
    Asm, CatchHandler, ClassBuilder, Code, DexBuilder, DexFile, EncodedValue, LoadError, Opcode,
};

fn sample_module() -> (DexBuilder, Vec<u8>) {
    let mut dex = DexBuilder::new();
    // make the sample's field and method indices non contiguous
    dex.field("Lcom/example/Other;", "unrelated", "I");
    dex.method("Lcom/example/Other;", "unrelated", "()V");

    let mut asm = Asm::new();
    let outer_start = asm.pos();
    asm.const_int(0, 1);
    let inner_start = asm.pos();
    asm.op11x(Opcode::Throw, 0);
    let inner_end = asm.pos();
    asm.op10x(Opcode::Nop);
    let outer_end = asm.pos();
    let handler = asm.pos();
    asm.op11x(Opcode::MoveException, 0);
    let catch_all = asm.pos();
    asm.op10x(Opcode::ReturnVoid);
    let code = Code::new(2, 1, 0, asm.finish().unwrap())
        .catch(outer_start, outer_end, &[], Some(catch_all))
        .catch(
            inner_start,
            inner_end,
            &[("Ljava/lang/RuntimeException;", handler), ("Ljava/lang/Exception;", handler)],
            None,
        );

    dex.add_class(
        ClassBuilder::new("Lcom/example/Sample;")
            .superclass("Lcom/example/Base;")
            .interface("Ljava/lang/Runnable;")
            .static_field("b", "B", Some(EncodedValue::Byte(-3)))
            .static_field("s", "S", Some(EncodedValue::Short(-2)))
            .static_field("c", "C", Some(EncodedValue::Char(0xFFFF)))
            .static_field("unset", "I", None)
            .static_field("i", "I", Some(EncodedValue::Int(-70000)))
            .static_field("j", "J", Some(EncodedValue::Long(-1)))
            .static_field("big", "J", Some(EncodedValue::Long(0x1234_5678_9ABC)))
            .static_field("f", "F", Some(EncodedValue::Float(1.5)))
            .static_field("d", "D", Some(EncodedValue::Double(-2.0)))
            .static_field("z", "Z", Some(EncodedValue::Boolean(true)))
            .static_field("nothing", "Ljava/lang/Object;", Some(EncodedValue::Null))
            .static_string("text", "Ljava/lang/StringBuilder; stays a buffer")
            .instance_field("count", "I")
            .instance_field("next", "Lcom/example/Sample;")
            .direct_method("<init>", "()V", ACC_PUBLIC | 0x10000, None)
            .direct_method("helper", "(IJLjava/lang/String;)V", ACC_STATIC, Some(code))
            .virtual_method("run", "()V", ACC_PUBLIC | ACC_SYNCHRONIZED, None),
    );
    dex.add_class(
        ClassBuilder::new("Lcom/example/Base;")
            .access(ACC_PUBLIC | ACC_ABSTRACT)
            .no_superclass(),
    );

    let bytes = dex.build().unwrap();
    (dex, bytes)
}

#[test]
fn test_class_metadata() {
    let (_, bytes) = sample_module();
    let parsed = DexFile::parse(&bytes).unwrap();

    assert_eq!(parsed.header.file_size as usize, bytes.len());
    assert!(!parsed.map.is_empty());

    let sample = parsed.find_class("com/example/Sample").unwrap();
    assert_eq!(sample.superclass, "com/example/Base");
    assert_eq!(sample.interfaces, vec!["java/lang/Runnable".to_string()]);
    assert!(!sample.is_interface);

    let base = parsed.find_class("com/example/Base").unwrap();
    assert_eq!(base.superclass, "java/lang/Object");
    assert!(base.is_interface);
    assert!(base.static_fields.is_empty());
}

#[test]
fn test_delta_encoded_members() {
    let (mut dex, bytes) = sample_module();
    let parsed = DexFile::parse(&bytes).unwrap();
    let sample = parsed.find_class("com/example/Sample").unwrap();

    let count = dex.field("Lcom/example/Sample;", "count", "I");
    let next = dex.field("Lcom/example/Sample;", "next", "Lcom/example/Sample;");
    let indices: Vec<u32> = sample.instance_fields.iter().map(|f| f.field_index).collect();
    assert_eq!(indices, vec![count, next]);
    assert_eq!(sample.instance_fields[1].type_desc, "Lcom/example/Sample;");

    let helper = dex.method("Lcom/example/Sample;", "helper", "(IJLjava/lang/String;)V");
    let method = sample
        .direct_methods
        .iter()
        .find(|m| m.name == "helper")
        .unwrap();
    assert_eq!(method.method_index, helper);
    assert_eq!(method.descriptor, "(IJLjava/lang/String;)V");
    assert!(!method.is_instance());

    let run = &sample.virtual_methods[0];
    assert_eq!(run.name, "run");
    assert!(run.is_instance());
    assert!(run.is_synchronized());
    assert!(run.code.is_none());
}

#[test]
fn test_static_values() {
    let (_, bytes) = sample_module();
    let parsed = DexFile::parse(&bytes).unwrap();
    let sample = parsed.find_class("com/example/Sample").unwrap();

    let value_of = |name: &str| {
        let position = sample
            .static_fields
            .iter()
            .position(|f| f.name == name)
            .unwrap();
        sample.static_values[position].clone()
    };

    assert_eq!(value_of("b"), EncodedValue::Byte(-3));
    assert_eq!(value_of("s"), EncodedValue::Short(-2));
    assert_eq!(value_of("c"), EncodedValue::Char(0xFFFF));
    assert_eq!(value_of("unset"), EncodedValue::Int(0));
    assert_eq!(value_of("i"), EncodedValue::Int(-70000));
    assert_eq!(value_of("j"), EncodedValue::Long(-1));
    assert_eq!(value_of("big"), EncodedValue::Long(0x1234_5678_9ABC));
    assert_eq!(value_of("f"), EncodedValue::Float(1.5));
    assert_eq!(value_of("d"), EncodedValue::Double(-2.0));
    assert_eq!(value_of("z"), EncodedValue::Boolean(true));
    assert_eq!(value_of("nothing"), EncodedValue::Null);

    match value_of("text") {
        EncodedValue::String(index) => assert_eq!(
            parsed.strings[index as usize],
            "Ljava/lang/StringBuffer; stays a buffer"
        ),
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_builder_class_rewritten_everywhere() {
    let mut dex = DexBuilder::new();
    dex.method("Ljava/lang/StringBuilder;", "append", "(I)Ljava/lang/StringBuilder;");
    let parsed = DexFile::parse(&dex.build().unwrap()).unwrap();

    assert!(parsed.strings.iter().all(|s| !s.contains("StringBuilder")));
    assert_eq!(parsed.method_ids[0].class_name, "java/lang/StringBuffer");
    assert_eq!(parsed.method_ids[0].descriptor, "(I)Ljava/lang/StringBuffer;");
}

#[test]
fn test_code_and_exception_tables() {
    let (_, bytes) = sample_module();
    let parsed = DexFile::parse(&bytes).unwrap();
    let sample = parsed.find_class("com/example/Sample").unwrap();
    let helper = sample
        .direct_methods
        .iter()
        .find(|m| m.name == "helper")
        .unwrap();
    let code = helper.code.as_ref().unwrap();

    assert_eq!(code.registers_size, 2);
    assert_eq!(code.ins_size, 1);
    // const/4, throw, nop, move-exception, return-void
    assert_eq!(code.insns.len(), 5);
    assert_eq!(code.insns[0] & 0xFF, Opcode::Const4 as u16);

    assert_eq!(code.tries.len(), 2);
    let outer = code.tries[0];
    let inner = code.tries[1];
    assert_eq!((outer.start, outer.end), (0, 3));
    assert_eq!((inner.start, inner.end), (1, 2));

    let outer_group = &code.handlers[outer.handler];
    assert_eq!(
        outer_group.catches,
        vec![CatchHandler {
            type_name: None,
            address: 4
        }]
    );

    let inner_group = &code.handlers[inner.handler];
    let names: Vec<_> = inner_group
        .catches
        .iter()
        .map(|c| (c.type_name.as_deref(), c.address))
        .collect();
    assert_eq!(
        names,
        vec![
            (Some("java/lang/RuntimeException"), 3),
            (Some("java/lang/Exception"), 3)
        ]
    );
}

#[test]
fn test_header_checks() {
    let (_, bytes) = sample_module();

    let mut corrupt = bytes.clone();
    corrupt[40..44].copy_from_slice(&0x7856_3412u32.to_le_bytes());
    assert!(matches!(
        DexFile::parse(&corrupt),
        Err(LoadError::IllegalHeader { field: "endian", .. })
    ));

    let mut corrupt = bytes.clone();
    corrupt[36..40].copy_from_slice(&0x78u32.to_le_bytes());
    assert!(matches!(
        DexFile::parse(&corrupt),
        Err(LoadError::IllegalHeader { field: "header size", .. })
    ));

    let mut corrupt = bytes.clone();
    corrupt[44..48].copy_from_slice(&4u32.to_le_bytes());
    assert!(matches!(
        DexFile::parse(&corrupt),
        Err(LoadError::IllegalHeader { field: "link size", .. })
    ));

    let mut corrupt = bytes.clone();
    corrupt.push(0);
    assert!(matches!(
        DexFile::parse(&corrupt),
        Err(LoadError::IllegalHeader { field: "file size", .. })
    ));

    // checksum and signature are not verified
    let mut tampered = bytes;
    tampered[8] ^= 0xFF;
    tampered[20] ^= 0xFF;
    assert!(DexFile::parse(&tampered).is_ok());
}

#[test]
fn test_unsupported_value_type() {
    let mut dex = DexBuilder::new();
    dex.add_class(
        ClassBuilder::new("Lcom/example/Constants;")
            .static_field("value", "I", Some(EncodedValue::Int(7))),
    );
    let mut bytes = dex.build().unwrap();

    let read_u32 = |bytes: &[u8], at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let class_defs_off = read_u32(&bytes, 100) as usize;
    let static_values_off = read_u32(&bytes, class_defs_off + 28) as usize;
    // the first value header follows the one-byte array size; 0x18 is VALUE_TYPE
    bytes[static_values_off + 1] = 0x18;

    let err = DexFile::parse(&bytes).unwrap_err();
    assert_eq!(err, LoadError::UnsupportedValueType(0x18));
    assert_eq!(err.to_string(), "not supported value type: 0x18");
}
