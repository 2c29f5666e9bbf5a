//! Static evaluation of the JS AST.
//!
//! Removes physically dead code: branches guarded by literal booleans, loops
//! that never run, expressions whose value is ignored and side-effect free,
//! statements following an unconditional return or throw. After the
//! permutation resolver turns property lookups into literals, this pass is
//! what strips the code belonging to other permutations.
//!
//! Pruning a statement may not drop the declarations inside it; `var` names
//! and function declarations are scoped to the enclosing function, so the
//! stripped declarations are kept in place of the removed code.

use super::ast::*;

/// Runs simplification to a fixed point.
pub fn optimize(program: &mut JsProgram) {
    while simplify(program) {}
}

/// Runs one simplification pass; returns whether anything changed.
pub fn simplify(program: &mut JsProgram) -> bool {
    let mut eval = StaticEval { changed: false };
    eval.scope_body(&mut program.globals);
    eval.changed
}

struct StaticEval {
    changed: bool,
}

impl StaticEval {
    /// Processes one function scope: hoists named function expressions to
    /// declarations at the top of the scope, then simplifies the statements.
    fn scope_body(&mut self, body: &mut JsBlock) {
        self.hoist_functions(body);
        let stmts = std::mem::take(&mut body.stmts);
        body.stmts = self.stmt_list(stmts);
    }

    /// Named function expressions are bound in the enclosing function scope,
    /// so `var f = function g() {..}` becomes a declaration of `g` at the top
    /// of the scope and a reference where the expression stood. Functions
    /// that are already declaration statements stay where they are.
    fn hoist_functions(&mut self, body: &mut JsBlock) {
        let mut hoisted: Vec<JsStatement> = Vec::new();
        for stmt in &mut body.stmts {
            if let JsStatement::Expr(JsExpression::Function(f)) = stmt {
                if f.name.is_some() {
                    continue;
                }
            }
            extract_named_functions_stmt(stmt, &mut hoisted);
        }
        if !hoisted.is_empty() {
            self.changed = true;
            hoisted.extend(std::mem::take(&mut body.stmts));
            body.stmts = hoisted;
        }
    }

    /// Simplifies a statement list: flattens nested blocks, drops empty
    /// statements, and prunes everything after an unconditional control
    /// break down to its declarations.
    fn stmt_list(&mut self, stmts: Vec<JsStatement>) -> Vec<JsStatement> {
        let mut out = Vec::new();
        let mut broken = false;
        for stmt in stmts {
            if broken {
                if declarations_only(&stmt) {
                    out.push(stmt);
                } else {
                    self.changed = true;
                    out.extend(must_exec_decls(&stmt));
                }
                continue;
            }
            match self.stmt(stmt) {
                JsStatement::Empty => {
                    self.changed = true;
                }
                JsStatement::Block(block) => {
                    self.changed = true;
                    for inner in block.stmts {
                        if broken {
                            if declarations_only(&inner) {
                                out.push(inner);
                            } else {
                                out.extend(must_exec_decls(&inner));
                            }
                            continue;
                        }
                        if inner.unconditional_control_break() {
                            broken = true;
                        }
                        out.push(inner);
                    }
                }
                stmt => {
                    if stmt.unconditional_control_break() {
                        broken = true;
                    }
                    out.push(stmt);
                }
            }
        }
        out
    }

    fn stmt(&mut self, stmt: JsStatement) -> JsStatement {
        match stmt {
            JsStatement::Empty => JsStatement::Empty,
            JsStatement::Block(block) => {
                JsStatement::Block(JsBlock::of(self.stmt_list(block.stmts)))
            }
            JsStatement::Expr(expr) => {
                if let JsExpression::Function(mut f) = expr {
                    // Function declaration; only its own scope is processed.
                    self.scope_body(&mut f.body);
                    return JsStatement::Expr(JsExpression::Function(f));
                }
                let expr = self.expr(expr, false);
                if expr.has_side_effects() {
                    JsStatement::Expr(expr)
                } else {
                    self.changed = true;
                    JsStatement::Empty
                }
            }
            JsStatement::Vars(vars) => JsStatement::Vars(
                vars.into_iter()
                    .map(|v| JsVar {
                        meta: v.meta,
                        name: v.name,
                        init: v.init.map(|e| self.expr(e, false)),
                    })
                    .collect(),
            ),
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => {
                let test = self.expr(test, true);
                let then_stmt = self.stmt(*then_stmt);
                let else_stmt = else_stmt.map(|s| self.stmt(*s));
                self.simplify_if(test, then_stmt, else_stmt)
            }
            JsStatement::While { test, body } => {
                let test = self.expr(test, true);
                let body = self.stmt(*body);
                if test.is_boolean_false() && !test.has_side_effects() {
                    self.changed = true;
                    return JsStatement::Block(JsBlock::of(must_exec_decls(&body)));
                }
                JsStatement::While {
                    test,
                    body: Box::new(body),
                }
            }
            JsStatement::DoWhile { body, test } => {
                let body = self.stmt(*body);
                let test = self.expr(test, true);
                // A do loop with a false condition runs its body exactly
                // once, unless a break or continue targets the loop itself.
                if test.is_boolean_false()
                    && !test.has_side_effects()
                    && !has_loop_exit(&body)
                {
                    self.changed = true;
                    return body;
                }
                JsStatement::DoWhile {
                    body: Box::new(body),
                    test,
                }
            }
            JsStatement::For {
                init,
                test,
                update,
                body,
            } => {
                let init = init.map(|i| match i {
                    JsForInit::Vars(vars) => JsForInit::Vars(
                        vars.into_iter()
                            .map(|v| JsVar {
                                meta: v.meta,
                                name: v.name,
                                init: v.init.map(|e| self.expr(e, false)),
                            })
                            .collect(),
                    ),
                    JsForInit::Expr(e) => JsForInit::Expr(self.expr(e, false)),
                });
                let test = test.map(|e| self.expr(e, true));
                let update = update.map(|e| self.expr(e, false));
                let body = self.stmt(*body);
                if let Some(t) = &test {
                    if t.is_boolean_false() && !t.has_side_effects() {
                        self.changed = true;
                        let mut stmts = Vec::new();
                        match init {
                            Some(JsForInit::Vars(vars)) => stmts.push(JsStatement::Vars(vars)),
                            Some(JsForInit::Expr(e)) => {
                                if e.has_side_effects() {
                                    stmts.push(e.make_stmt());
                                }
                            }
                            None => {}
                        }
                        stmts.extend(must_exec_decls(&body));
                        return JsStatement::Block(JsBlock::of(stmts));
                    }
                }
                JsStatement::For {
                    init,
                    test,
                    update,
                    body: Box::new(body),
                }
            }
            JsStatement::Return(expr) => JsStatement::Return(expr.map(|e| self.expr(e, false))),
            JsStatement::Break => JsStatement::Break,
            JsStatement::Continue => JsStatement::Continue,
            JsStatement::Throw(expr) => JsStatement::Throw(self.expr(expr, false)),
            JsStatement::Try {
                block,
                catches,
                finally,
            } => JsStatement::Try {
                block: JsBlock::of(self.stmt_list(block.stmts)),
                catches: catches
                    .into_iter()
                    .map(|c| JsCatch {
                        param: c.param,
                        body: JsBlock::of(self.stmt_list(c.body.stmts)),
                    })
                    .collect(),
                finally: finally.map(|f| JsBlock::of(self.stmt_list(f.stmts))),
            },
        }
    }

    fn simplify_if(
        &mut self,
        test: JsExpression,
        then_stmt: JsStatement,
        else_stmt: Option<JsStatement>,
    ) -> JsStatement {
        if !test.has_side_effects() {
            if test.is_boolean_true() {
                self.changed = true;
                let mut stmts = match &else_stmt {
                    Some(else_stmt) => must_exec_decls(else_stmt),
                    None => vec![],
                };
                stmts.push(then_stmt);
                return JsStatement::Block(JsBlock::of(stmts));
            }
            if test.is_boolean_false() {
                self.changed = true;
                let mut stmts = must_exec_decls(&then_stmt);
                if let Some(else_stmt) = else_stmt {
                    stmts.push(else_stmt);
                }
                return JsStatement::Block(JsBlock::of(stmts));
            }
        }

        let then_empty = then_stmt.is_empty_stmt();
        let else_empty = else_stmt.as_ref().map_or(true, JsStatement::is_empty_stmt);
        if then_empty && else_empty {
            self.changed = true;
            return if test.has_side_effects() {
                test.make_stmt()
            } else {
                JsStatement::Empty
            };
        }

        // `if (a) b(); else c();` carries no control flow a conditional
        // expression can't; same for the one-armed forms via && and ||.
        match (single_expression(&then_stmt), else_stmt) {
            (Some(then_expr), Some(else_stmt)) => {
                if let Some(else_expr) = single_expression(&else_stmt) {
                    self.changed = true;
                    return JsExpression::Conditional {
                        meta: test.meta(),
                        test: Box::new(test),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    }
                    .make_stmt();
                }
                JsStatement::If {
                    test,
                    then_stmt: Box::new(then_stmt),
                    else_stmt: Some(Box::new(else_stmt)),
                }
            }
            (Some(then_expr), None) => {
                self.changed = true;
                JsExpression::binary(JsBinaryOp::And, test, then_expr).make_stmt()
            }
            (None, else_stmt) => {
                if then_empty {
                    if let Some(else_stmt) = &else_stmt {
                        if let Some(else_expr) = single_expression(else_stmt) {
                            self.changed = true;
                            return JsExpression::binary(JsBinaryOp::Or, test, else_expr)
                                .make_stmt();
                        }
                    }
                }
                JsStatement::If {
                    test,
                    then_stmt: Box::new(then_stmt),
                    else_stmt: else_stmt.map(Box::new),
                }
            }
        }
    }

    /// Simplifies an expression. `bool_ctx` is true where the value will be
    /// coerced to a boolean anyway, which licenses dropping double negation.
    fn expr(&mut self, expr: JsExpression, bool_ctx: bool) -> JsExpression {
        match expr {
            e @ JsExpression::Literal { .. }
            | e @ JsExpression::NameRef { .. }
            | e @ JsExpression::This { .. } => e,
            JsExpression::Array { meta, elements } => JsExpression::Array {
                meta,
                elements: elements.into_iter().map(|e| self.expr(e, false)).collect(),
            },
            JsExpression::Object { meta, properties } => JsExpression::Object {
                meta,
                properties: properties
                    .into_iter()
                    .map(|p| JsObjectProperty {
                        key: p.key,
                        value: self.expr(p.value, false),
                    })
                    .collect(),
            },
            JsExpression::Function(mut f) => {
                self.scope_body(&mut f.body);
                JsExpression::Function(f)
            }
            JsExpression::Prefix { meta, op, arg } => {
                let arg = self.expr(*arg, op == JsUnaryOp::Not);
                if op == JsUnaryOp::Not {
                    if !arg.has_side_effects() {
                        if arg.is_boolean_true() {
                            self.changed = true;
                            return JsExpression::bool_lit(false);
                        }
                        if arg.is_boolean_false() {
                            self.changed = true;
                            return JsExpression::bool_lit(true);
                        }
                    }
                    if bool_ctx {
                        if let JsExpression::Prefix {
                            op: JsUnaryOp::Not,
                            arg: inner,
                            ..
                        } = arg
                        {
                            self.changed = true;
                            return *inner;
                        }
                    }
                }
                JsExpression::Prefix {
                    meta,
                    op,
                    arg: Box::new(arg),
                }
            }
            JsExpression::Postfix { meta, op, arg } => JsExpression::Postfix {
                meta,
                op,
                arg: Box::new(self.expr(*arg, false)),
            },
            JsExpression::Binary {
                meta,
                op,
                left,
                right,
            } => {
                let operand_ctx = bool_ctx && matches!(op, JsBinaryOp::And | JsBinaryOp::Or);
                let left = self.expr(*left, operand_ctx);
                let right = self.expr(*right, operand_ctx);
                match op {
                    JsBinaryOp::And if !left.has_side_effects() => {
                        if left.is_boolean_true() {
                            self.changed = true;
                            right
                        } else if left.is_boolean_false() {
                            self.changed = true;
                            left
                        } else {
                            JsExpression::Binary {
                                meta,
                                op,
                                left: Box::new(left),
                                right: Box::new(right),
                            }
                        }
                    }
                    JsBinaryOp::Or if !left.has_side_effects() => {
                        if left.is_boolean_true() {
                            self.changed = true;
                            left
                        } else if left.is_boolean_false() {
                            self.changed = true;
                            right
                        } else {
                            JsExpression::Binary {
                                meta,
                                op,
                                left: Box::new(left),
                                right: Box::new(right),
                            }
                        }
                    }
                    JsBinaryOp::Comma if !left.has_side_effects() => {
                        self.changed = true;
                        right
                    }
                    _ => JsExpression::Binary {
                        meta,
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                }
            }
            JsExpression::Conditional {
                meta,
                test,
                then_expr,
                else_expr,
            } => {
                let test = self.expr(*test, true);
                let then_expr = self.expr(*then_expr, bool_ctx);
                let else_expr = self.expr(*else_expr, bool_ctx);
                if !test.has_side_effects() {
                    if test.is_boolean_true() {
                        self.changed = true;
                        return then_expr;
                    }
                    if test.is_boolean_false() {
                        self.changed = true;
                        return else_expr;
                    }
                }
                JsExpression::Conditional {
                    meta,
                    test: Box::new(test),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                }
            }
            JsExpression::Invocation { meta, callee, args } => JsExpression::Invocation {
                meta,
                callee: Box::new(self.expr(*callee, false)),
                args: args.into_iter().map(|e| self.expr(e, false)).collect(),
            },
            JsExpression::New { meta, callee, args } => JsExpression::New {
                meta,
                callee: Box::new(self.expr(*callee, false)),
                args: args.into_iter().map(|e| self.expr(e, false)).collect(),
            },
            JsExpression::ArrayAccess { meta, array, index } => JsExpression::ArrayAccess {
                meta,
                array: Box::new(self.expr(*array, false)),
                index: Box::new(self.expr(*index, false)),
            },
            JsExpression::Member {
                meta,
                object,
                member,
            } => JsExpression::Member {
                meta,
                object: Box::new(self.expr(*object, false)),
                member,
            },
        }
    }
}

/// If `stmt` is exactly one expression statement (possibly block-wrapped),
/// returns the expression. Function declarations are not expressions here.
fn single_expression(stmt: &JsStatement) -> Option<JsExpression> {
    match stmt {
        JsStatement::Expr(JsExpression::Function(f)) if f.name.is_some() => None,
        JsStatement::Expr(e) => Some(e.clone()),
        JsStatement::Block(block) if block.stmts.len() == 1 => {
            single_expression(&block.stmts[0])
        }
        _ => None,
    }
}

/// Collects the declarations that must survive when `stmt` is removed:
/// `var` statements with their initializers stripped and function
/// declarations kept whole. Nested functions declare nothing in this scope.
fn must_exec_decls(stmt: &JsStatement) -> Vec<JsStatement> {
    let mut out = Vec::new();
    collect_decls(stmt, &mut out);
    out
}

fn collect_decls(stmt: &JsStatement, out: &mut Vec<JsStatement>) {
    match stmt {
        JsStatement::Vars(vars) => {
            out.push(JsStatement::Vars(
                vars.iter().map(|v| JsVar::uninitialized(v.name.clone())).collect(),
            ));
        }
        JsStatement::Expr(JsExpression::Function(f)) if f.name.is_some() => {
            out.push(stmt.clone());
        }
        JsStatement::Block(block) => {
            for s in &block.stmts {
                collect_decls(s, out);
            }
        }
        JsStatement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            collect_decls(then_stmt, out);
            if let Some(else_stmt) = else_stmt {
                collect_decls(else_stmt, out);
            }
        }
        JsStatement::While { body, .. } | JsStatement::DoWhile { body, .. } => {
            collect_decls(body, out);
        }
        JsStatement::For { init, body, .. } => {
            if let Some(JsForInit::Vars(vars)) = init {
                out.push(JsStatement::Vars(
                    vars.iter().map(|v| JsVar::uninitialized(v.name.clone())).collect(),
                ));
            }
            collect_decls(body, out);
        }
        JsStatement::Try {
            block,
            catches,
            finally,
        } => {
            for s in &block.stmts {
                collect_decls(s, out);
            }
            for c in catches {
                for s in &c.body.stmts {
                    collect_decls(s, out);
                }
            }
            if let Some(f) = finally {
                for s in &f.stmts {
                    collect_decls(s, out);
                }
            }
        }
        _ => {}
    }
}

/// True when replacing `stmt` by its declarations would change nothing.
fn declarations_only(stmt: &JsStatement) -> bool {
    match stmt {
        JsStatement::Vars(vars) => vars.iter().all(|v| v.init.is_none()),
        JsStatement::Expr(JsExpression::Function(f)) => f.name.is_some(),
        _ => false,
    }
}

/// Whether `stmt` contains a break or continue that would target the loop
/// directly enclosing it. Nested loops capture their own breaks, and
/// functions are separate worlds.
fn has_loop_exit(stmt: &JsStatement) -> bool {
    match stmt {
        JsStatement::Break | JsStatement::Continue => true,
        JsStatement::Block(block) => block.stmts.iter().any(has_loop_exit),
        JsStatement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            has_loop_exit(then_stmt)
                || else_stmt.as_ref().map_or(false, |s| has_loop_exit(s))
        }
        JsStatement::Try {
            block,
            catches,
            finally,
        } => {
            block.stmts.iter().any(has_loop_exit)
                || catches.iter().any(|c| c.body.stmts.iter().any(has_loop_exit))
                || finally
                    .as_ref()
                    .map_or(false, |f| f.stmts.iter().any(has_loop_exit))
        }
        _ => false,
    }
}

/// Replaces named function expressions nested inside `stmt` with name
/// references, pushing the extracted declarations. Does not look inside
/// function bodies; those hoist in their own scope.
fn extract_named_functions_stmt(stmt: &mut JsStatement, out: &mut Vec<JsStatement>) {
    match stmt {
        JsStatement::Expr(expr) => extract_named_functions(expr, out),
        JsStatement::Vars(vars) => {
            for v in vars {
                if let Some(init) = &mut v.init {
                    extract_named_functions(init, out);
                }
            }
        }
        JsStatement::If {
            test,
            then_stmt,
            else_stmt,
        } => {
            extract_named_functions(test, out);
            extract_named_functions_stmt(then_stmt, out);
            if let Some(else_stmt) = else_stmt {
                extract_named_functions_stmt(else_stmt, out);
            }
        }
        JsStatement::While { test, body } => {
            extract_named_functions(test, out);
            extract_named_functions_stmt(body, out);
        }
        JsStatement::DoWhile { body, test } => {
            extract_named_functions_stmt(body, out);
            extract_named_functions(test, out);
        }
        JsStatement::For {
            init,
            test,
            update,
            body,
        } => {
            match init {
                Some(JsForInit::Vars(vars)) => {
                    for v in vars {
                        if let Some(e) = &mut v.init {
                            extract_named_functions(e, out);
                        }
                    }
                }
                Some(JsForInit::Expr(e)) => extract_named_functions(e, out),
                None => {}
            }
            if let Some(e) = test {
                extract_named_functions(e, out);
            }
            if let Some(e) = update {
                extract_named_functions(e, out);
            }
            extract_named_functions_stmt(body, out);
        }
        JsStatement::Return(Some(e)) | JsStatement::Throw(e) => extract_named_functions(e, out),
        JsStatement::Block(block) => {
            for s in &mut block.stmts {
                extract_named_functions_stmt(s, out);
            }
        }
        JsStatement::Try {
            block,
            catches,
            finally,
        } => {
            for s in &mut block.stmts {
                extract_named_functions_stmt(s, out);
            }
            for c in catches {
                for s in &mut c.body.stmts {
                    extract_named_functions_stmt(s, out);
                }
            }
            if let Some(f) = finally {
                for s in &mut f.stmts {
                    extract_named_functions_stmt(s, out);
                }
            }
        }
        _ => {}
    }
}

fn extract_named_functions(expr: &mut JsExpression, out: &mut Vec<JsStatement>) {
    if let JsExpression::Function(f) = expr {
        if let Some(name) = f.name.clone() {
            let decl = std::mem::replace(expr, JsExpression::name_ref(name));
            out.push(decl.make_stmt());
        }
        return;
    }
    match expr {
        JsExpression::Array { elements, .. } => {
            for e in elements {
                extract_named_functions(e, out);
            }
        }
        JsExpression::Object { properties, .. } => {
            for p in properties {
                extract_named_functions(&mut p.value, out);
            }
        }
        JsExpression::Prefix { arg, .. } | JsExpression::Postfix { arg, .. } => {
            extract_named_functions(arg, out);
        }
        JsExpression::Binary { left, right, .. } => {
            extract_named_functions(left, out);
            extract_named_functions(right, out);
        }
        JsExpression::Conditional {
            test,
            then_expr,
            else_expr,
            ..
        } => {
            extract_named_functions(test, out);
            extract_named_functions(then_expr, out);
            extract_named_functions(else_expr, out);
        }
        JsExpression::Invocation { callee, args, .. }
        | JsExpression::New { callee, args, .. } => {
            extract_named_functions(callee, out);
            for a in args {
                extract_named_functions(a, out);
            }
        }
        JsExpression::ArrayAccess { array, index, .. } => {
            extract_named_functions(array, out);
            extract_named_functions(index, out);
        }
        JsExpression::Member { object, .. } => extract_named_functions(object, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::writer::{generate, JsOutputStyle};

    fn program_of(stmts: Vec<JsStatement>) -> JsProgram {
        JsProgram {
            files: vec!["test.js".into()],
            globals: JsBlock::of(stmts),
        }
    }

    fn optimized(stmts: Vec<JsStatement>) -> String {
        let mut program = program_of(stmts);
        optimize(&mut program);
        generate(&program, JsOutputStyle::Compact)
    }

    #[test]
    fn test_if_true_keeps_then_branch() {
        // if (true) a(); else b();  ->  a();
        let call = |name: &str| JsExpression::Invocation {
            meta: Meta::SYNTHETIC,
            callee: Box::new(JsExpression::name_ref(name)),
            args: vec![],
        };
        let stmt = JsStatement::If {
            test: JsExpression::bool_lit(true),
            then_stmt: Box::new(call("a").make_stmt()),
            else_stmt: Some(Box::new(call("b").make_stmt())),
        };
        assert_eq!(optimized(vec![stmt]), "a();");
    }

    #[test]
    fn test_dead_branch_keeps_declarations() {
        // if (false) { var x = a(); }  ->  var x;
        let init = JsExpression::Invocation {
            meta: Meta::SYNTHETIC,
            callee: Box::new(JsExpression::name_ref("a")),
            args: vec![],
        };
        let stmt = JsStatement::If {
            test: JsExpression::bool_lit(false),
            then_stmt: Box::new(JsStatement::Block(JsBlock::of(vec![JsStatement::Vars(
                vec![JsVar {
                    meta: Meta::SYNTHETIC,
                    name: "x".into(),
                    init: Some(init),
                }],
            )]))),
            else_stmt: None,
        };
        assert_eq!(optimized(vec![stmt]), "var x;");
    }

    #[test]
    fn test_short_circuit_and() {
        // true && f()  ->  f()
        let expr = JsExpression::binary(
            JsBinaryOp::And,
            JsExpression::bool_lit(true),
            JsExpression::Invocation {
                meta: Meta::SYNTHETIC,
                callee: Box::new(JsExpression::name_ref("f")),
                args: vec![],
            },
        );
        assert_eq!(optimized(vec![expr.make_stmt()]), "f();");
    }

    #[test]
    fn test_pure_statement_removed() {
        // a + b;  ->  (nothing)
        let expr = JsExpression::binary(
            JsBinaryOp::Add,
            JsExpression::name_ref("a"),
            JsExpression::name_ref("b"),
        );
        assert_eq!(optimized(vec![expr.make_stmt()]), "");
    }

    #[test]
    fn test_unreachable_after_return_pruned() {
        // function f() { return 1; g(); var y = 2; }
        let body = JsBlock::of(vec![
            JsStatement::Return(Some(JsExpression::int_lit(1))),
            JsExpression::Invocation {
                meta: Meta::SYNTHETIC,
                callee: Box::new(JsExpression::name_ref("g")),
                args: vec![],
            }
            .make_stmt(),
            JsStatement::Vars(vec![JsVar {
                meta: Meta::SYNTHETIC,
                name: "y".into(),
                init: Some(JsExpression::int_lit(2)),
            }]),
        ]);
        let f = JsExpression::Function(JsFunction {
            meta: Meta::SYNTHETIC,
            name: Some("f".into()),
            params: vec![],
            body,
        });
        assert_eq!(optimized(vec![f.make_stmt()]), "function f(){return 1;var y;}");
    }

    #[test]
    fn test_while_false_removed() {
        let stmt = JsStatement::While {
            test: JsExpression::bool_lit(false),
            body: Box::new(
                JsExpression::Invocation {
                    meta: Meta::SYNTHETIC,
                    callee: Box::new(JsExpression::name_ref("spin")),
                    args: vec![],
                }
                .make_stmt(),
            ),
        };
        assert_eq!(optimized(vec![stmt]), "");
    }

    #[test]
    fn test_do_while_false_unrolled() {
        // do f(); while (false);  ->  f();
        let stmt = JsStatement::DoWhile {
            body: Box::new(
                JsExpression::Invocation {
                    meta: Meta::SYNTHETIC,
                    callee: Box::new(JsExpression::name_ref("f")),
                    args: vec![],
                }
                .make_stmt(),
            ),
            test: JsExpression::bool_lit(false),
        };
        assert_eq!(optimized(vec![stmt]), "f();");
    }

    #[test]
    fn test_do_while_with_break_kept() {
        let body = JsStatement::Block(JsBlock::of(vec![
            JsExpression::Invocation {
                meta: Meta::SYNTHETIC,
                callee: Box::new(JsExpression::name_ref("f")),
                args: vec![],
            }
            .make_stmt(),
            JsStatement::If {
                test: JsExpression::name_ref("c"),
                then_stmt: Box::new(JsStatement::Break),
                else_stmt: None,
            },
        ]));
        let stmt = JsStatement::DoWhile {
            body: Box::new(body),
            test: JsExpression::bool_lit(false),
        };
        let out = optimized(vec![stmt]);
        assert!(out.starts_with("do"), "loop must survive: {}", out);
    }

    #[test]
    fn test_double_not_dropped_in_condition() {
        // if (!!x) f();  ->  x && f();
        let stmt = JsStatement::If {
            test: JsExpression::Prefix {
                meta: Meta::SYNTHETIC,
                op: JsUnaryOp::Not,
                arg: Box::new(JsExpression::Prefix {
                    meta: Meta::SYNTHETIC,
                    op: JsUnaryOp::Not,
                    arg: Box::new(JsExpression::name_ref("x")),
                }),
            },
            then_stmt: Box::new(
                JsExpression::Invocation {
                    meta: Meta::SYNTHETIC,
                    callee: Box::new(JsExpression::name_ref("f")),
                    args: vec![],
                }
                .make_stmt(),
            ),
            else_stmt: None,
        };
        assert_eq!(optimized(vec![stmt]), "x&&f();");
    }

    #[test]
    fn test_named_function_expression_hoisted() {
        // var f = function g() {};  ->  function g(){} var f = g;
        let stmt = JsStatement::Vars(vec![JsVar {
            meta: Meta::SYNTHETIC,
            name: "f".into(),
            init: Some(JsExpression::Function(JsFunction {
                meta: Meta::SYNTHETIC,
                name: Some("g".into()),
                params: vec![],
                body: JsBlock::new(),
            })),
        }]);
        assert_eq!(optimized(vec![stmt]), "function g(){}var f=g;");
    }
}
