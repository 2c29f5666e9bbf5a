use super::api::{parse_to_ast, JsParser, Rule};
use super::parse_program;
use crate::js::ast::{JsBinaryOp, JsExpression, JsLiteral, JsStatement};
use crate::js::writer::{generate, JsOutputStyle};

use pest::consumes_to;
use pest::parses_to;

/// Parses a snippet and prints it back compacted; most of the grammar is
/// easiest to pin down this way.
fn compact(src: &str) -> String {
    let program = parse_program(&[("test.js".to_string(), src.to_string())]).unwrap();
    generate(&program, JsOutputStyle::Compact)
}

#[test]
fn test_decimal_number() {
    parses_to! {
        parser: JsParser,
        input: "10.25",
        rule: Rule::numeric_literal,
        tokens: [
            numeric_literal(0, 5)
        ]
    };
}

#[test]
fn test_hex_number() {
    parses_to! {
        parser: JsParser,
        input: "0x1F",
        rule: Rule::numeric_literal,
        tokens: [
            numeric_literal(0, 4)
        ]
    };
}

#[test]
fn test_string_with_escapes() {
    parses_to! {
        parser: JsParser,
        input: r#""a\"b""#,
        rule: Rule::string_literal,
        tokens: [
            string_literal(0, 6)
        ]
    };
}

#[test]
fn test_var_statement_tokens() {
    parses_to! {
        parser: JsParser,
        input: "var a;",
        rule: Rule::var_statement,
        tokens: [
            var_statement(0, 6, [
                kw_var(0, 3),
                var_declaration(4, 5, [
                    identifier(4, 5)
                ])
            ])
        ]
    };
}

#[test]
fn test_keyword_is_not_an_identifier() {
    assert!(parse_to_ast("var var;", 0).is_err());
    assert!(parse_to_ast("return;", 0).is_ok());
    // A keyword prefix is still a valid name.
    assert_eq!(compact("var variable=1;"), "var variable=1;");
}

#[test]
fn test_literals() {
    let stmts = parse_to_ast("1;1.5;0xff;\"a\\tb\";'c';true;null;", 0).unwrap();
    let values: Vec<JsLiteral> = stmts
        .into_iter()
        .map(|s| match s {
            JsStatement::Expr(JsExpression::Literal { value, .. }) => value,
            other => panic!("expected literal, got {:?}", other),
        })
        .collect();
    assert_eq!(
        values,
        vec![
            JsLiteral::Integer(1),
            JsLiteral::Float(1.5),
            JsLiteral::Integer(255),
            JsLiteral::String("a\tb".to_string()),
            JsLiteral::String("c".to_string()),
            JsLiteral::Bool(true),
            JsLiteral::Null,
        ]
    );
}

#[test]
fn test_binary_precedence() {
    assert_eq!(compact("a+b*c;"), "a+b*c;");
    assert_eq!(compact("(a+b)*c;"), "(a+b)*c;");
    assert_eq!(compact("a<<2|b&c;"), "a<<2|b&c;");
    assert_eq!(compact("a===b||c!=d&&e;"), "a===b||c!=d&&e;");
}

#[test]
fn test_assignment_is_right_associative() {
    let stmts = parse_to_ast("a=b=c;", 0).unwrap();
    match &stmts[0] {
        JsStatement::Expr(JsExpression::Binary { op, right, .. }) => {
            assert_eq!(*op, JsBinaryOp::Asg);
            assert!(matches!(
                **right,
                JsExpression::Binary {
                    op: JsBinaryOp::Asg,
                    ..
                }
            ));
        }
        other => panic!("expected assignment, got {:?}", other),
    }
    assert_eq!(compact("a+=b-=1;"), "a+=b-=1;");
}

#[test]
fn test_unary_operators() {
    assert_eq!(compact("!!x;"), "!!x;");
    assert_eq!(compact("a - -b;"), "a- -b;");
    assert_eq!(compact("typeof x==='string';"), "typeof x===\"string\";");
    assert_eq!(compact("delete o.p;"), "delete o.p;");
    assert_eq!(compact("++a;b++;"), "++a;b++;");
}

#[test]
fn test_call_and_member_chains() {
    assert_eq!(compact("foo.bar(1)[x].baz();"), "foo.bar(1)[x].baz();");
    assert_eq!(compact("new Foo(1).bar;"), "new Foo(1).bar;");
    assert_eq!(compact("f()();"), "f()();");
}

#[test]
fn test_comma_and_conditional() {
    assert_eq!(compact("a?b:c?d:e;"), "a?b:c?d:e;");
    assert_eq!(compact("x=(a,b);"), "x=(a,b);");
    assert_eq!(compact("f(a,b);"), "f(a,b);");
}

#[test]
fn test_object_and_array_literals() {
    assert_eq!(
        compact("var o={a:1,\"b c\":2},l=[1,2,[3]];"),
        "var o={a:1,\"b c\":2},l=[1,2,[3]];"
    );
}

#[test]
fn test_control_statements() {
    assert_eq!(
        compact("if(a)b();else{c();}"),
        "if(a)b();else{c();}"
    );
    assert_eq!(
        compact("for(var i=0;i<n;i++)f(i);"),
        "for(var i=0;i<n;i++)f(i);"
    );
    assert_eq!(compact("for(;;)break;"), "for(;;)break;");
    assert_eq!(compact("while(x)y();"), "while(x)y();");
    assert_eq!(compact("do f();while(x);"), "do f();while(x);");
    assert_eq!(
        compact("try{f();}catch(e){g(e);}finally{h();}"),
        "try{f();}catch(e){g(e);}finally{h();}"
    );
}

#[test]
fn test_functions() {
    assert_eq!(
        compact("function f(a,b){return a+b;}"),
        "function f(a,b){return a+b;}"
    );
    assert_eq!(
        compact("var f=function(){};"),
        "var f=function(){};"
    );
    assert_eq!(compact("(function(){f();})();"), "(function(){f();})();");
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        compact("// line\nvar a=1;/* block\nspanning */var b=2;"),
        "var a=1;var b=2;"
    );
}

#[test]
fn test_line_numbers() {
    let stmts = parse_to_ast("f();\n\ng();\n", 0).unwrap();
    let lines: Vec<u32> = stmts
        .iter()
        .map(|s| match s {
            JsStatement::Expr(e) => e.meta().line,
            other => panic!("expected expression, got {:?}", other),
        })
        .collect();
    assert_eq!(lines, vec![1, 3]);
}

#[test]
fn test_parse_error_names_the_file() {
    let err = parse_program(&[("broken.js".to_string(), "var = 1;".to_string())]).unwrap_err();
    assert!(err.to_string().contains("broken.js"));
}

#[test]
fn test_program_merges_files() {
    let program = parse_program(&[
        ("a.js".to_string(), "var a=1;".to_string()),
        ("b.js".to_string(), "var b=2;".to_string()),
    ])
    .unwrap();
    assert_eq!(program.files, vec!["a.js", "b.js"]);
    assert_eq!(generate(&program, JsOutputStyle::Compact), "var a=1;var b=2;");
}
