//! Source-level tests for the emulated-stack instrumentation pass.

extern crate permjs;

use permjs::js::stack_emulator;
use permjs::js::writer::{generate, JsOutputStyle};
use permjs::parser;

const SUPPORT: &str = "function $caught(e){return e;}";

fn instrument(src: &str, record_file_names: bool, record_line_numbers: bool) -> String {
    let mut program =
        parser::parse_program(&[("Foo.js".to_string(), src.to_string())]).unwrap();
    stack_emulator::exec(&mut program, record_file_names, record_line_numbers);
    generate(&program, JsOutputStyle::Compact)
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn pass_skips_itself_without_support_function() {
    let src = "function foo(){bar();}";
    let out = instrument(src, false, false);
    assert_eq!(out, "function foo(){bar();}");
    assert!(!out.contains("$stack"));
}

#[test]
fn globals_are_declared_once_up_front() {
    let out = instrument(&format!("{}function foo(){{bar();}}", SUPPORT), false, false);
    assert!(out.starts_with("var $stack=[],$stackDepth=-1,$location=[];"));
    assert_eq!(count(&out, "var $stack=[]"), 1);
}

#[test]
fn every_nonempty_function_pushes_once() {
    let out = instrument(
        &format!(
            "{}function foo(){{bar();}}var anon=function(){{baz();}};function empty(){{}}",
            SUPPORT
        ),
        false,
        false,
    );
    // $caught, foo and the anonymous function are instrumented; the empty
    // body is not.
    assert_eq!(count(&out, "=++$stackDepth]"), 3);
    assert!(out.contains("$stack[$stackIndex=++$stackDepth]=foo;"));
    assert!(out.contains("$stack[$stackIndex=++$stackDepth]=null;"));
    assert!(out.contains("function empty(){}"));
}

#[test]
fn plain_return_pops_before_leaving() {
    let out = instrument(&format!("{}function foo(){{return x;}}", SUPPORT), false, false);
    assert!(out.contains("$stackDepth=$stackIndex-1;return x;"));
}

#[test]
fn side_effecting_return_value_is_saved_first() {
    let out = instrument(
        &format!("{}function foo(){{return bar();}}", SUPPORT),
        false,
        false,
    );
    assert!(out.contains("$returnTemp=bar();$stackDepth=$stackIndex-1;return $returnTemp;"));
}

#[test]
fn try_finally_pops_exactly_once_per_path() {
    let out = instrument(
        &format!(
            "{}function foo(){{try{{return g();}}finally{{h();}}}}",
            SUPPORT
        ),
        false,
        false,
    );
    let foo = &out[out.find("function foo").unwrap()..];
    // The early return sets the flag instead of popping directly.
    assert!(foo.contains("return $exitingEarly0=true,g();"), "{}", foo);
    assert!(!foo.contains("$stackDepth=$stackIndex-1;return"), "{}", foo);
    // The finally pops only on the early-exit path; fall-through pops after
    // the whole try statement. One pop per dynamic path, two pop sites.
    assert!(foo.contains("$exitingEarly0&&($stackDepth=$stackIndex-1);"), "{}", foo);
    assert_eq!(count(foo, "$stackDepth=$stackIndex-1"), 2, "{}", foo);
    // The exception path gets a synthetic catch that resets the depth.
    assert!(
        foo.contains("catch(e){e=$caught(e);$stackDepth=$stackIndex;throw e;}"),
        "{}",
        foo
    );
}

#[test]
fn user_catch_blocks_reset_the_depth() {
    let out = instrument(
        &format!(
            "{}function foo(){{try{{g();}}catch(e){{e=$caught(e);log(e);}}}}",
            SUPPORT
        ),
        false,
        false,
    );
    assert!(out.contains("catch(e){e=$caught(e);$stackDepth=$stackIndex;log(e);}"));
}

#[test]
fn line_numbers_are_recorded_and_deduplicated() {
    let out = instrument(
        &format!("{}function foo(){{\nbar();baz();\nqux();\n}}", SUPPORT),
        false,
        true,
    );
    // bar() and baz() share line 2; only the first records it.
    assert!(out.contains("$location[$stackIndex]=\"2\",bar();"), "{}", out);
    assert!(out.contains("bar();baz();"), "{}", out);
    assert!(out.contains("$location[$stackIndex]=\"3\",qux();"), "{}", out);
}

#[test]
fn file_names_force_line_numbers() {
    let out = instrument(
        &format!("{}function foo(){{bar();}}", SUPPORT),
        true,
        false,
    );
    assert!(out.contains("$location[$stackIndex]=\"Foo.js:"), "{}", out);
}
