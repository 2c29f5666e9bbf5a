//! JS source generation from the AST.
//!
//! Precedence-aware so no pass has to think about parentheses; supports the
//! two output styles carried by the compile options. `Compact` is what ships
//! in permutation payloads, `Pretty` is for humans and for tests that match
//! structure.

use super::ast::*;

const TAB_WIDTH: usize = 2;

/// How generated JavaScript is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JsOutputStyle {
    Pretty,
    Compact,
}

/// Renders a whole program as JavaScript source.
pub fn generate(program: &JsProgram, style: JsOutputStyle) -> String {
    let mut w = JsWriter::new(style);
    for stmt in &program.globals.stmts {
        w.statement(stmt);
        w.newline();
    }
    w.finish()
}

/// Renders a single statement; used by tests and the selection script.
pub fn generate_statement(stmt: &JsStatement, style: JsOutputStyle) -> String {
    let mut w = JsWriter::new(style);
    w.statement(stmt);
    w.finish()
}

struct JsWriter {
    out: String,
    style: JsOutputStyle,
    indent: usize,
}

impl JsWriter {
    fn new(style: JsOutputStyle) -> JsWriter {
        JsWriter {
            out: String::new(),
            style,
            indent: 0,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn pretty(&self) -> bool {
        self.style == JsOutputStyle::Pretty
    }

    /// Emits a token, inserting a space where gluing would change meaning
    /// (`a - -b` must not become `a--b`, `return x` must not become
    /// `returnx`).
    fn token(&mut self, s: &str) {
        if let (Some(last), Some(first)) = (self.out.chars().last(), s.chars().next()) {
            let ident_last = last.is_alphanumeric() || last == '_' || last == '$';
            let ident_first = first.is_alphanumeric() || first == '_' || first == '$';
            let hazard = (last == '-' && first == '-')
                || (last == '+' && first == '+')
                || (ident_last && ident_first);
            if hazard {
                self.out.push(' ');
            }
        }
        self.out.push_str(s);
    }

    fn space(&mut self) {
        if self.pretty() {
            self.out.push(' ');
        }
    }

    fn newline(&mut self) {
        if self.pretty() {
            self.out.push('\n');
            for _ in 0..self.indent * TAB_WIDTH {
                self.out.push(' ');
            }
        }
    }

    fn statement(&mut self, stmt: &JsStatement) {
        match stmt {
            JsStatement::Empty => self.token(";"),
            JsStatement::Block(block) => self.block(block),
            JsStatement::Expr(expr) => {
                // A named function at statement level is a declaration and
                // takes no semicolon.
                if let JsExpression::Function(f) = expr {
                    if f.name.is_some() {
                        self.function(f);
                        return;
                    }
                }
                let parens = matches!(
                    expr,
                    JsExpression::Object { .. } | JsExpression::Function(_)
                );
                if parens {
                    self.token("(");
                }
                self.expression(expr, 1);
                if parens {
                    self.token(")");
                }
                self.token(";");
            }
            JsStatement::Vars(vars) => {
                self.var_list(vars);
                self.token(";");
            }
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => {
                self.token("if");
                self.space();
                self.token("(");
                self.expression(test, 1);
                self.token(")");
                self.nested(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.space();
                    self.token("else");
                    self.nested(else_stmt);
                }
            }
            JsStatement::While { test, body } => {
                self.token("while");
                self.space();
                self.token("(");
                self.expression(test, 1);
                self.token(")");
                self.nested(body);
            }
            JsStatement::DoWhile { body, test } => {
                self.token("do");
                self.nested(body);
                self.space();
                self.token("while");
                self.space();
                self.token("(");
                self.expression(test, 1);
                self.token(")");
                self.token(";");
            }
            JsStatement::For {
                init,
                test,
                update,
                body,
            } => {
                self.token("for");
                self.space();
                self.token("(");
                match init {
                    Some(JsForInit::Vars(vars)) => self.var_list(vars),
                    Some(JsForInit::Expr(expr)) => self.expression(expr, 1),
                    None => {}
                }
                self.token(";");
                if let Some(test) = test {
                    self.space();
                    self.expression(test, 1);
                }
                self.token(";");
                if let Some(update) = update {
                    self.space();
                    self.expression(update, 1);
                }
                self.token(")");
                self.nested(body);
            }
            JsStatement::Return(expr) => {
                self.token("return");
                if let Some(expr) = expr {
                    self.space();
                    self.expression(expr, 1);
                }
                self.token(";");
            }
            JsStatement::Break => {
                self.token("break");
                self.token(";");
            }
            JsStatement::Continue => {
                self.token("continue");
                self.token(";");
            }
            JsStatement::Throw(expr) => {
                self.token("throw");
                self.space();
                self.expression(expr, 1);
                self.token(";");
            }
            JsStatement::Try {
                block,
                catches,
                finally,
            } => {
                self.token("try");
                self.space();
                self.block(block);
                for c in catches {
                    self.space();
                    self.token("catch");
                    self.space();
                    self.token("(");
                    self.token(&c.param);
                    self.token(")");
                    self.space();
                    self.block(&c.body);
                }
                if let Some(finally) = finally {
                    self.space();
                    self.token("finally");
                    self.space();
                    self.block(finally);
                }
            }
        }
    }

    /// Loop/conditional bodies: blocks hug the header, other statements are
    /// emitted inline after a space.
    fn nested(&mut self, stmt: &JsStatement) {
        self.space();
        self.statement(stmt);
    }

    fn block(&mut self, block: &JsBlock) {
        self.token("{");
        self.indent += 1;
        for stmt in &block.stmts {
            self.newline();
            self.statement(stmt);
        }
        self.indent -= 1;
        self.newline();
        self.token("}");
    }

    fn var_list(&mut self, vars: &[JsVar]) {
        self.token("var");
        self.out.push(' ');
        for (i, var) in vars.iter().enumerate() {
            if i > 0 {
                self.token(",");
                self.space();
            }
            self.token(&var.name);
            if let Some(init) = &var.init {
                self.space();
                self.token("=");
                self.space();
                // Initializer sits at assignment precedence; comma needs parens.
                self.expression(init, 2);
            }
        }
    }

    fn function(&mut self, f: &JsFunction) {
        self.token("function");
        if let Some(name) = &f.name {
            self.out.push(' ');
            self.token(name);
        }
        self.token("(");
        for (i, p) in f.params.iter().enumerate() {
            if i > 0 {
                self.token(",");
                self.space();
            }
            self.token(p);
        }
        self.token(")");
        self.space();
        self.block(&f.body);
    }

    /// Emits `expr`, parenthesizing when its precedence is below what the
    /// surrounding context requires.
    fn expression(&mut self, expr: &JsExpression, required: u8) {
        let prec = precedence_of(expr);
        let parens = prec < required;
        if parens {
            self.token("(");
        }
        match expr {
            JsExpression::Literal { value, .. } => self.literal(value),
            JsExpression::NameRef { name, .. } => self.token(name),
            JsExpression::This { .. } => self.token("this"),
            JsExpression::Array { elements, .. } => {
                self.token("[");
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        self.token(",");
                        self.space();
                    }
                    self.expression(e, 2);
                }
                self.token("]");
            }
            JsExpression::Object { properties, .. } => {
                self.token("{");
                for (i, p) in properties.iter().enumerate() {
                    if i > 0 {
                        self.token(",");
                        self.space();
                    }
                    if is_identifier_key(&p.key) {
                        self.token(&p.key);
                    } else {
                        let quoted = escape_string(&p.key);
                        self.token(&quoted);
                    }
                    self.token(":");
                    self.space();
                    self.expression(&p.value, 2);
                }
                self.token("}");
            }
            JsExpression::Function(f) => self.function(f),
            JsExpression::Prefix { op, arg, .. } => {
                self.token(op.symbol());
                if op.is_keyword() {
                    self.out.push(' ');
                }
                self.expression(arg, 14);
            }
            JsExpression::Postfix { op, arg, .. } => {
                self.expression(arg, 15);
                self.token(op.symbol());
            }
            JsExpression::Binary {
                op, left, right, ..
            } => {
                let p = op.precedence();
                // Assignment is right-associative, everything else left.
                let (lp, rp) = if op.is_assignment() { (p + 1, p) } else { (p, p + 1) };
                self.expression(left, lp);
                if *op == JsBinaryOp::Comma {
                    self.token(",");
                    self.space();
                } else {
                    if op.is_keyword() {
                        self.out.push(' ');
                    } else {
                        self.space();
                    }
                    self.token(op.symbol());
                    if op.is_keyword() {
                        self.out.push(' ');
                    } else {
                        self.space();
                    }
                }
                self.expression(right, rp);
            }
            JsExpression::Conditional {
                test,
                then_expr,
                else_expr,
                ..
            } => {
                self.expression(test, 4);
                self.space();
                self.token("?");
                self.space();
                self.expression(then_expr, 3);
                self.space();
                self.token(":");
                self.space();
                self.expression(else_expr, 3);
            }
            JsExpression::Invocation { callee, args, .. } => {
                let wrap = matches!(&**callee, JsExpression::Function(_));
                if wrap {
                    self.token("(");
                }
                self.expression(callee, 16);
                if wrap {
                    self.token(")");
                }
                self.arg_list(args);
            }
            JsExpression::New { callee, args, .. } => {
                self.token("new");
                self.out.push(' ');
                self.expression(callee, 17);
                self.arg_list(args);
            }
            JsExpression::ArrayAccess { array, index, .. } => {
                self.expression(array, 16);
                self.token("[");
                self.expression(index, 1);
                self.token("]");
            }
            JsExpression::Member { object, member, .. } => {
                self.expression(object, 16);
                self.token(".");
                self.token(member);
            }
        }
        if parens {
            self.token(")");
        }
    }

    fn arg_list(&mut self, args: &[JsExpression]) {
        self.token("(");
        for (i, a) in args.iter().enumerate() {
            if i > 0 {
                self.token(",");
                self.space();
            }
            self.expression(a, 2);
        }
        self.token(")");
    }

    fn literal(&mut self, lit: &JsLiteral) {
        match lit {
            JsLiteral::Null => self.token("null"),
            JsLiteral::Bool(true) => self.token("true"),
            JsLiteral::Bool(false) => self.token("false"),
            JsLiteral::Integer(n) => {
                if *n < 0 {
                    // Negative literals only arise from constant folding;
                    // parenthesize so gluing stays safe.
                    self.token("(");
                    self.token(&n.to_string());
                    self.token(")");
                } else {
                    self.token(&n.to_string());
                }
            }
            JsLiteral::Float(f) => self.token(&format_float(*f)),
            JsLiteral::String(s) => {
                let escaped = escape_string(s);
                self.token(&escaped);
            }
        }
    }
}

fn precedence_of(expr: &JsExpression) -> u8 {
    match expr {
        JsExpression::Binary { op, .. } => op.precedence(),
        JsExpression::Conditional { .. } => 3,
        JsExpression::Prefix { .. } => 14,
        JsExpression::Postfix { .. } => 15,
        JsExpression::Invocation { .. }
        | JsExpression::New { .. }
        | JsExpression::ArrayAccess { .. }
        | JsExpression::Member { .. } => 16,
        _ => 18,
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Keys that can be printed bare; anything else gets string-literal quoting.
fn is_identifier_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(stmt: &JsStatement) -> String {
        generate_statement(stmt, JsOutputStyle::Compact)
    }

    #[test]
    fn test_var_list() {
        let stmt = JsStatement::Vars(vec![
            JsVar {
                meta: Meta::SYNTHETIC,
                name: "a".into(),
                init: Some(JsExpression::int_lit(1)),
            },
            JsVar::uninitialized("b"),
        ]);
        assert_eq!(compact(&stmt), "var a=1,b;");
    }

    #[test]
    fn test_precedence_parens() {
        // (a + b) * c
        let expr = JsExpression::binary(
            JsBinaryOp::Mul,
            JsExpression::binary(
                JsBinaryOp::Add,
                JsExpression::name_ref("a"),
                JsExpression::name_ref("b"),
            ),
            JsExpression::name_ref("c"),
        );
        assert_eq!(compact(&expr.make_stmt()), "(a+b)*c;");
    }

    #[test]
    fn test_minus_minus_not_glued() {
        // a - -b must not print as a--b
        let expr = JsExpression::binary(
            JsBinaryOp::Sub,
            JsExpression::name_ref("a"),
            JsExpression::Prefix {
                meta: Meta::SYNTHETIC,
                op: JsUnaryOp::Neg,
                arg: Box::new(JsExpression::name_ref("b")),
            },
        );
        assert_eq!(compact(&expr.make_stmt()), "a- -b;");
    }

    #[test]
    fn test_object_keys_quoted_when_not_identifiers() {
        let expr = JsExpression::Object {
            meta: Meta::SYNTHETIC,
            properties: vec![
                JsObjectProperty {
                    key: "a".into(),
                    value: JsExpression::int_lit(1),
                },
                JsObjectProperty {
                    key: "b c".into(),
                    value: JsExpression::int_lit(2),
                },
                JsObjectProperty {
                    key: "2x".into(),
                    value: JsExpression::int_lit(3),
                },
            ],
        };
        let stmt = JsStatement::Vars(vec![JsVar {
            meta: Meta::SYNTHETIC,
            name: "o".into(),
            init: Some(expr),
        }]);
        assert_eq!(compact(&stmt), "var o={a:1,\"b c\":2,\"2x\":3};");
    }

    #[test]
    fn test_keyword_binary_spacing() {
        let expr = JsExpression::binary(
            JsBinaryOp::In,
            JsExpression::str_lit("k"),
            JsExpression::name_ref("o"),
        );
        assert_eq!(compact(&expr.make_stmt()), "\"k\" in o;");
    }

    #[test]
    fn test_return_comma_expression() {
        let stmt = JsStatement::Return(Some(JsExpression::binary(
            JsBinaryOp::Comma,
            JsExpression::assignment(JsExpression::name_ref("x"), JsExpression::bool_lit(true)),
            JsExpression::name_ref("y"),
        )));
        assert_eq!(compact(&stmt), "return x=true,y;");
    }

    #[test]
    fn test_stack_entry_shape() {
        // $stack[$stackIndex = ++$stackDepth] = foo
        let entry = JsExpression::assignment(
            JsExpression::ArrayAccess {
                meta: Meta::SYNTHETIC,
                array: Box::new(JsExpression::name_ref("$stack")),
                index: Box::new(JsExpression::assignment(
                    JsExpression::name_ref("$stackIndex"),
                    JsExpression::Prefix {
                        meta: Meta::SYNTHETIC,
                        op: JsUnaryOp::Inc,
                        arg: Box::new(JsExpression::name_ref("$stackDepth")),
                    },
                )),
            },
            JsExpression::name_ref("foo"),
        );
        assert_eq!(compact(&entry.make_stmt()), "$stack[$stackIndex=++$stackDepth]=foo;");
    }
}
