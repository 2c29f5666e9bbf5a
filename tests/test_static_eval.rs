//! Behavior tests for the static-evaluation optimizer.

extern crate permjs;

use permjs::js::static_eval;
use permjs::js::writer::{generate, JsOutputStyle};
use permjs::parser;

fn optimized(src: &str) -> String {
    let mut program = parser::parse_program(&[("test.js".to_string(), src.to_string())]).unwrap();
    static_eval::optimize(&mut program);
    generate(&program, JsOutputStyle::Compact)
}

#[test]
fn taken_branch_replaces_constant_if() {
    assert_eq!(optimized("if(true)a();else b();"), "a();");
    assert_eq!(optimized("if(false)a();else b();"), "b();");
    assert_eq!(optimized("if(false)a();"), "");
}

#[test]
fn dropped_branch_keeps_its_declarations() {
    // Dead code never runs, but var bindings it introduces still exist.
    assert_eq!(
        optimized("if(true)a();else{var b=expensive();c();}"),
        "var b;a();"
    );
}

#[test]
fn do_while_false_runs_body_once() {
    assert_eq!(optimized("do{f();}while(false);"), "f();");
    // A loop-level break must keep the loop.
    assert_eq!(
        optimized("do{if(x)break;f();}while(false);"),
        "do{if(x)break;f();}while(false);"
    );
}

#[test]
fn while_false_is_dropped_entirely() {
    assert_eq!(optimized("while(false){f();}g();"), "g();");
    assert_eq!(optimized("while(false){var a=f();}g();"), "var a;g();");
}

#[test]
fn short_circuit_constants_fold() {
    assert_eq!(optimized("x=true&&f();"), "x=f();");
    assert_eq!(optimized("x=false&&f();"), "x=false;");
    assert_eq!(optimized("x=false||f();"), "x=f();");
    assert_eq!(optimized("x=true||f();"), "x=true;");
}

#[test]
fn pure_comma_left_operand_is_dropped() {
    assert_eq!(optimized("x=(1,f());"), "x=f();");
    // A side-effecting left operand survives.
    assert_eq!(optimized("x=(g(),f());"), "x=(g(),f());");
}

#[test]
fn unreachable_statements_after_return_are_pruned() {
    assert_eq!(
        optimized("function f(){return 1;g();var y;}"),
        "function f(){return 1;var y;}"
    );
}

#[test]
fn double_negation_collapses_in_boolean_context() {
    assert_eq!(optimized("if(!!x)f();"), "x&&f();");
}

#[test]
fn named_function_expressions_hoist_to_scope_top() {
    assert_eq!(
        optimized("var f=function g(){};"),
        "function g(){}var f=g;"
    );
}

#[test]
fn pass_is_idempotent() {
    let sources = [
        "if(true)a();else{var b;c();}",
        "do{f();}while(false);",
        "x=true&&f();",
        "function f(){return 1;g();}",
    ];
    for src in &sources {
        let once = optimized(src);
        assert_eq!(optimized(&once), once, "not a fixed point for {:?}", src);
    }
}
