//! `dexvm inspect` - print the structure of a module

use anyhow::Context;
use dexvm_bytecode::DexFile;
use std::io::Write;
use std::path::Path;

/// Parse `path` and describe it on `out`
pub fn execute(path: &Path, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let dex = DexFile::parse(&bytes).with_context(|| format!("failed to parse {}", path.display()))?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &dex).context("failed to serialize module")?;
        writeln!(out)?;
    } else {
        write_summary(&dex, out)?;
    }
    Ok(())
}

fn write_summary(dex: &DexFile, out: &mut impl Write) -> anyhow::Result<()> {
    let header = &dex.header;
    writeln!(out, "file size:  {} bytes", header.file_size)?;
    writeln!(out, "checksum:   {:#010x}", header.checksum)?;
    writeln!(out, "map:        {} sections at {:#x}", dex.map.len(), header.map_off)?;
    writeln!(
        out,
        "tables:     {} strings, {} types, {} protos, {} fields, {} methods",
        dex.strings.len(),
        dex.types.len(),
        dex.protos.len(),
        dex.field_ids.len(),
        dex.method_ids.len()
    )?;
    writeln!(out, "classes:    {}", dex.class_defs.len())?;

    for class in &dex.class_defs {
        writeln!(out)?;
        let kind = if class.is_interface { "interface" } else { "class" };
        write!(out, "{} {} extends {}", kind, class.name, class.superclass)?;
        if !class.interfaces.is_empty() {
            write!(out, " implements {}", class.interfaces.join(", "))?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "  fields:  {} static, {} instance",
            class.static_fields.len(),
            class.instance_fields.len()
        )?;
        writeln!(
            out,
            "  methods: {} direct, {} virtual",
            class.direct_methods.len(),
            class.virtual_methods.len()
        )?;
        for method in class.direct_methods.iter().chain(&class.virtual_methods) {
            let size = method.code.as_ref().map_or(0, |code| code.insns.len());
            writeln!(out, "    {}{} ({} code units)", method.name, method.descriptor, size)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexvm_bytecode::dex::{ACC_ABSTRACT, ACC_PUBLIC, ACC_STATIC};
    use dexvm_bytecode::{Asm, ClassBuilder, Code, DexBuilder, Opcode};

    fn sample(dir: &Path) -> std::path::PathBuf {
        let mut dex = DexBuilder::new();
        let mut asm = Asm::new();
        asm.op10x(Opcode::ReturnVoid);
        let code = Code::new(1, 1, 0, asm.finish().unwrap());
        dex.add_class(
            ClassBuilder::new("Lapp/Main;")
                .interface("Ljava/lang/Runnable;")
                .static_field("count", "I", None)
                .instance_field("name", "Ljava/lang/String;")
                .direct_method("main", "([Ljava/lang/String;)V", ACC_PUBLIC | ACC_STATIC, Some(code))
                .virtual_method("run", "()V", ACC_PUBLIC | ACC_ABSTRACT, None),
        );
        let path = dir.join("sample.dex");
        std::fs::write(&path, dex.build().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(dir.path());
        let mut out = Vec::new();
        execute(&path, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("classes:    1"));
        assert!(text.contains("class app/Main extends java/lang/Object implements java/lang/Runnable"));
        assert!(text.contains("fields:  1 static, 1 instance"));
        assert!(text.contains("methods: 1 direct, 1 virtual"));
        assert!(text.contains("main([Ljava/lang/String;)V (1 code units)"));
    }

    #[test]
    fn test_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(dir.path());
        let mut out = Vec::new();
        execute(&path, true, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["class_defs"][0]["name"], "app/Main");
        assert_eq!(value["class_defs"][0]["interfaces"][0], "java/lang/Runnable");
        assert!(value["strings"].as_array().unwrap().len() > 0);
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.dex");
        std::fs::write(&path, b"dex\n035\0").unwrap();
        let err = execute(&path, false, &mut Vec::<u8>::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse"));
    }
}
