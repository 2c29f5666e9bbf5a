//! End-to-end precompile -> compile-perms -> link tests over a real
//! work/output directory pair.

extern crate permjs;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use permjs::cfg::ModuleDef;
use permjs::compile::{self, JjsOptions};
use permjs::error::Error;
use permjs::link;

const MODULE: &str = r#"
name = "showcase"
sources = ["showcase.js"]
public = ["index.html"]

[[property]]
name = "a"
values = ["true", "false"]

[[property]]
name = "b"
values = ["x", "y"]
"#;

const SOURCE: &str = r#"
function main() {
    if ($getProperty("a") === "true") {
        return "A:" + $getProperty("b");
    }
    return "B:" + $getProperty("b");
}
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    module: ModuleDef,
    work: PathBuf,
    out: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("showcase.js"), SOURCE).unwrap();
    fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
    let module = ModuleDef::parse(MODULE, dir.path()).unwrap();
    let work = dir.path().join("work");
    let out = dir.path().join("out");
    Fixture {
        module,
        work,
        out,
        _dir: dir,
    }
}

fn build(f: &Fixture) {
    compile::precompile(&f.module, JjsOptions::default(), &f.work).unwrap();
    compile::compile_perms(&f.work, "showcase", &[]).unwrap();
    link::link(&f.module, &f.work, &f.out).unwrap();
}

#[test]
fn four_distinct_payloads_and_one_selection_script() {
    let f = fixture();
    build(&f);

    let public = f.out.join("showcase");
    let mut payloads = BTreeSet::new();
    for i in 0..4 {
        let payload = fs::read_to_string(public.join(format!("{}.cache.js", i))).unwrap();
        payloads.insert(payload);
    }
    assert_eq!(payloads.len(), 4, "payloads must differ per permutation");

    let script = fs::read_to_string(public.join("showcase.nocache.js")).unwrap();
    for i in 0..4 {
        assert!(script.contains(&format!("[{},{{", i)), "missing entry {}", i);
    }
    assert!(script.contains("window[\"permjs:properties\"]"));
}

#[test]
fn public_resources_and_aux_map_are_emitted() {
    let f = fixture();
    build(&f);

    assert_eq!(
        fs::read_to_string(f.out.join("showcase").join("index.html")).unwrap(),
        "<html></html>"
    );
    let map = fs::read_to_string(f.out.join("showcase-aux").join("permutation-map.txt")).unwrap();
    assert_eq!(map.lines().count(), 4);
    assert!(map.starts_with("0 a=true,b=x\n"));
}

#[test]
fn recompile_is_byte_identical() {
    let f = fixture();
    build(&f);
    let public = f.out.join("showcase");
    let first: Vec<String> = (0..4)
        .map(|i| fs::read_to_string(public.join(format!("{}.cache.js", i))).unwrap())
        .collect();

    compile::compile_perms(&f.work, "showcase", &[]).unwrap();
    link::link(&f.module, &f.work, &f.out).unwrap();
    for (i, payload) in first.iter().enumerate() {
        let again = fs::read_to_string(public.join(format!("{}.cache.js", i))).unwrap();
        assert_eq!(&again, payload, "permutation {} changed on recompile", i);
    }
}

#[test]
fn missing_permutation_file_fails_link_with_no_output() {
    let f = fixture();
    compile::precompile(&f.module, JjsOptions::default(), &f.work).unwrap();
    compile::compile_perms(&f.work, "showcase", &[]).unwrap();
    fs::remove_file(f.work.join("showcase").join("permutation-2.js")).unwrap();

    let err = link::link(&f.module, &f.work, &f.out).unwrap_err();
    assert!(matches!(err, Error::MissingPermutationFile(_)));
    // No output tree that looks complete: no selection script anywhere.
    assert!(!f.out.join("showcase").join("showcase.nocache.js").exists());
}

#[test]
fn link_replaces_stale_output() {
    let f = fixture();
    let stale = f.out.join("showcase").join("stale.js");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();
    build(&f);
    assert!(!stale.exists());
    assert!(f.out.join("showcase").join("showcase.nocache.js").is_file());
}

#[test]
fn compile_without_precompilation_names_the_fix() {
    let dir = tempfile::tempdir().unwrap();
    let err = compile::compile_perms(dir.path(), "showcase", &[]).unwrap_err();
    assert!(err.to_string().contains("please run precompile first"));
    assert!(matches!(err, Error::MissingPrecompilation(_)));
}

#[test]
fn stack_emulation_is_driven_by_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let module_text = format!(
        "{}\n[configuration]\n\"compiler.emulatedStack\" = \"true\"\n",
        MODULE.replace("public = [\"index.html\"]\n", "")
    );
    let source = format!(
        "function $caught(e) {{ return e; }}\n{}",
        SOURCE
    );
    fs::write(dir.path().join("showcase.js"), source).unwrap();
    let module = ModuleDef::parse(&module_text, dir.path()).unwrap();
    let work = dir.path().join("work");
    compile::precompile(&module, JjsOptions::default(), &work).unwrap();
    compile::compile_perms(&work, "showcase", &[0]).unwrap();

    let js = fs::read_to_string(work.join("showcase").join("permutation-0.js")).unwrap();
    assert!(js.contains("$stack[$stackIndex=++$stackDepth]"), "{}", js);
    assert!(js.starts_with("var $stack=[],$stackDepth=-1,$location=[];"), "{}", js);
}

#[test]
fn pretty_output_style_is_honored() {
    let f = fixture();
    let options = JjsOptions {
        optimize: true,
        output: permjs::js::writer::JsOutputStyle::Pretty,
    };
    compile::precompile(&f.module, options, &f.work).unwrap();
    compile::compile_perms(&f.work, "showcase", &[0]).unwrap();
    let js = fs::read_to_string(f.work.join("showcase").join("permutation-0.js")).unwrap();
    assert!(js.contains('\n'));
    assert!(js.contains("function main() {"));
}
