//! Per-permutation specialization of the shared program.
//!
//! Module sources query their compile-time environment through two
//! intrinsics: `$getProperty("name")` evaluates to the binding-property
//! value the permutation was compiled for, and `$rebind("Request")` becomes
//! an invocation of the rebind answer selected for the permutation. This
//! pass substitutes both on a private copy of the program, then folds string
//! comparisons and negations of the resulting literals so the static
//! evaluator can remove the branches belonging to other permutations.

use std::collections::{BTreeMap, BTreeSet};

use super::ast::*;
use crate::error::Error;

pub const GET_PROPERTY: &str = "$getProperty";
pub const REBIND: &str = "$rebind";

/// Specializes `program` in place for one permutation. `properties` maps
/// binding-property names to this permutation's values; `rebind_answers`
/// maps rebind requests to answer function names.
pub fn specialize(
    program: &mut JsProgram,
    properties: &BTreeMap<String, String>,
    rebind_answers: &BTreeMap<String, String>,
) -> Result<(), Error> {
    let resolver = Resolver {
        properties,
        rebind_answers,
    };
    for stmt in &mut program.globals.stmts {
        resolver.stmt(stmt)?;
    }
    Ok(())
}

/// Collects every `$rebind("...")` request in the program, sorted. The
/// precompile stage records this set and rejects requests with no rule.
pub fn rebind_requests(program: &JsProgram) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    scan_block(&program.globals, REBIND, &mut out);
    out
}

/// Collects every `$getProperty("...")` name in the program, sorted.
pub fn property_requests(program: &JsProgram) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    scan_block(&program.globals, GET_PROPERTY, &mut out);
    out
}

struct Resolver<'a> {
    properties: &'a BTreeMap<String, String>,
    rebind_answers: &'a BTreeMap<String, String>,
}

impl Resolver<'_> {
    fn stmt(&self, stmt: &mut JsStatement) -> Result<(), Error> {
        match stmt {
            JsStatement::Expr(expr) | JsStatement::Throw(expr) => self.expr(expr),
            JsStatement::Vars(vars) => {
                for v in vars {
                    if let Some(init) = &mut v.init {
                        self.expr(init)?;
                    }
                }
                Ok(())
            }
            JsStatement::Block(block) => self.block(block),
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => {
                self.expr(test)?;
                self.stmt(then_stmt)?;
                if let Some(else_stmt) = else_stmt {
                    self.stmt(else_stmt)?;
                }
                Ok(())
            }
            JsStatement::While { test, body } | JsStatement::DoWhile { body, test } => {
                self.expr(test)?;
                self.stmt(body)
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
                                self.expr(e)?;
                            }
                        }
                    }
                    Some(JsForInit::Expr(e)) => self.expr(e)?,
                    None => {}
                }
                if let Some(e) = test {
                    self.expr(e)?;
                }
                if let Some(e) = update {
                    self.expr(e)?;
                }
                self.stmt(body)
            }
            JsStatement::Return(Some(expr)) => self.expr(expr),
            JsStatement::Try {
                block,
                catches,
                finally,
            } => {
                self.block(block)?;
                for c in catches {
                    self.block(&mut c.body)?;
                }
                if let Some(f) = finally {
                    self.block(f)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn block(&self, block: &mut JsBlock) -> Result<(), Error> {
        for stmt in &mut block.stmts {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn expr(&self, expr: &mut JsExpression) -> Result<(), Error> {
        // Substitute first so folding below sees the literals.
        if let JsExpression::Invocation { meta, callee, args } = expr {
            if let JsExpression::NameRef { name, .. } = &**callee {
                match name.as_str() {
                    GET_PROPERTY => {
                        let meta = *meta;
                        let prop = intrinsic_arg(GET_PROPERTY, args)?;
                        let value = self.properties.get(&prop).ok_or_else(|| {
                            Error::UnboundProperty(prop.clone())
                        })?;
                        *expr = JsExpression::Literal {
                            meta,
                            value: JsLiteral::String(value.clone()),
                        };
                        return Ok(());
                    }
                    REBIND => {
                        let meta = *meta;
                        let request = intrinsic_arg(REBIND, args)?;
                        let answer = self.rebind_answers.get(&request).ok_or_else(|| {
                            Error::UnknownRebind(request.clone())
                        })?;
                        *expr = JsExpression::Invocation {
                            meta,
                            callee: Box::new(JsExpression::NameRef {
                                meta,
                                name: answer.clone(),
                            }),
                            args: Vec::new(),
                        };
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        match expr {
            JsExpression::Function(f) => self.block(&mut f.body)?,
            JsExpression::Array { elements, .. } => {
                for e in elements {
                    self.expr(e)?;
                }
            }
            JsExpression::Object { properties, .. } => {
                for p in properties {
                    self.expr(&mut p.value)?;
                }
            }
            JsExpression::Prefix { arg, .. } | JsExpression::Postfix { arg, .. } => {
                self.expr(arg)?;
            }
            JsExpression::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            JsExpression::Conditional {
                test,
                then_expr,
                else_expr,
                ..
            } => {
                self.expr(test)?;
                self.expr(then_expr)?;
                self.expr(else_expr)?;
            }
            JsExpression::Invocation { callee, args, .. }
            | JsExpression::New { callee, args, .. } => {
                self.expr(callee)?;
                for a in args {
                    self.expr(a)?;
                }
            }
            JsExpression::ArrayAccess { array, index, .. } => {
                self.expr(array)?;
                self.expr(index)?;
            }
            JsExpression::Member { object, .. } => self.expr(object)?,
            _ => {}
        }

        fold(expr);
        Ok(())
    }
}

/// Folds comparisons of two string literals and negations of literals. Only
/// what specialization can produce; general constant folding belongs to the
/// static evaluator.
fn fold(expr: &mut JsExpression) {
    let folded = match expr {
        JsExpression::Binary {
            op, left, right, ..
        } => {
            let (a, b) = match (&**left, &**right) {
                (
                    JsExpression::Literal {
                        value: JsLiteral::String(a),
                        ..
                    },
                    JsExpression::Literal {
                        value: JsLiteral::String(b),
                        ..
                    },
                ) => (a, b),
                _ => return,
            };
            match op {
                JsBinaryOp::Eq | JsBinaryOp::StrictEq => Some(a == b),
                JsBinaryOp::Neq | JsBinaryOp::StrictNeq => Some(a != b),
                _ => None,
            }
        }
        JsExpression::Prefix {
            op: JsUnaryOp::Not,
            arg,
            ..
        } if matches!(&**arg, JsExpression::Literal { .. }) => Some(arg.is_boolean_false()),
        _ => None,
    };
    if let Some(value) = folded {
        *expr = JsExpression::bool_lit(value);
    }
}

fn intrinsic_arg(intrinsic: &str, args: &[JsExpression]) -> Result<String, Error> {
    match args {
        [JsExpression::Literal {
            value: JsLiteral::String(s),
            ..
        }] => Ok(s.clone()),
        _ => Err(Error::Intrinsic(format!(
            "{} takes exactly one string literal argument",
            intrinsic
        ))),
    }
}

fn scan_block(block: &JsBlock, intrinsic: &str, out: &mut BTreeSet<String>) {
    for stmt in &block.stmts {
        scan_stmt(stmt, intrinsic, out);
    }
}

fn scan_stmt(stmt: &JsStatement, intrinsic: &str, out: &mut BTreeSet<String>) {
    match stmt {
        JsStatement::Expr(expr) | JsStatement::Throw(expr) => scan_expr(expr, intrinsic, out),
        JsStatement::Vars(vars) => {
            for v in vars {
                if let Some(init) = &v.init {
                    scan_expr(init, intrinsic, out);
                }
            }
        }
        JsStatement::Block(block) => scan_block(block, intrinsic, out),
        JsStatement::If {
            test,
            then_stmt,
            else_stmt,
        } => {
            scan_expr(test, intrinsic, out);
            scan_stmt(then_stmt, intrinsic, out);
            if let Some(else_stmt) = else_stmt {
                scan_stmt(else_stmt, intrinsic, out);
            }
        }
        JsStatement::While { test, body } | JsStatement::DoWhile { body, test } => {
            scan_expr(test, intrinsic, out);
            scan_stmt(body, intrinsic, out);
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
                        if let Some(e) = &v.init {
                            scan_expr(e, intrinsic, out);
                        }
                    }
                }
                Some(JsForInit::Expr(e)) => scan_expr(e, intrinsic, out),
                None => {}
            }
            if let Some(e) = test {
                scan_expr(e, intrinsic, out);
            }
            if let Some(e) = update {
                scan_expr(e, intrinsic, out);
            }
            scan_stmt(body, intrinsic, out);
        }
        JsStatement::Return(Some(expr)) => scan_expr(expr, intrinsic, out),
        JsStatement::Try {
            block,
            catches,
            finally,
        } => {
            scan_block(block, intrinsic, out);
            for c in catches {
                scan_block(&c.body, intrinsic, out);
            }
            if let Some(f) = finally {
                scan_block(f, intrinsic, out);
            }
        }
        _ => {}
    }
}

fn scan_expr(expr: &JsExpression, intrinsic: &str, out: &mut BTreeSet<String>) {
    if let JsExpression::Invocation { callee, args, .. } = expr {
        if let JsExpression::NameRef { name, .. } = &**callee {
            if name == intrinsic {
                if let [JsExpression::Literal {
                    value: JsLiteral::String(s),
                    ..
                }] = args.as_slice()
                {
                    out.insert(s.clone());
                }
            }
        }
    }
    match expr {
        JsExpression::Function(f) => scan_block(&f.body, intrinsic, out),
        JsExpression::Array { elements, .. } => {
            for e in elements {
                scan_expr(e, intrinsic, out);
            }
        }
        JsExpression::Object { properties, .. } => {
            for p in properties {
                scan_expr(&p.value, intrinsic, out);
            }
        }
        JsExpression::Prefix { arg, .. } | JsExpression::Postfix { arg, .. } => {
            scan_expr(arg, intrinsic, out);
        }
        JsExpression::Binary { left, right, .. } => {
            scan_expr(left, intrinsic, out);
            scan_expr(right, intrinsic, out);
        }
        JsExpression::Conditional {
            test,
            then_expr,
            else_expr,
            ..
        } => {
            scan_expr(test, intrinsic, out);
            scan_expr(then_expr, intrinsic, out);
            scan_expr(else_expr, intrinsic, out);
        }
        JsExpression::Invocation { callee, args, .. } | JsExpression::New { callee, args, .. } => {
            scan_expr(callee, intrinsic, out);
            for a in args {
                scan_expr(a, intrinsic, out);
            }
        }
        JsExpression::ArrayAccess { array, index, .. } => {
            scan_expr(array, intrinsic, out);
            scan_expr(index, intrinsic, out);
        }
        JsExpression::Member { object, .. } => scan_expr(object, intrinsic, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::writer::{generate, JsOutputStyle};

    fn intrinsic_call(name: &str, arg: &str) -> JsExpression {
        JsExpression::Invocation {
            meta: Meta::SYNTHETIC,
            callee: Box::new(JsExpression::name_ref(name)),
            args: vec![JsExpression::str_lit(arg)],
        }
    }

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_property_substitution_folds_comparison() {
        // if ($getProperty("user.agent") == "ie6") a(); else b();
        let test = JsExpression::binary(
            JsBinaryOp::Eq,
            intrinsic_call(GET_PROPERTY, "user.agent"),
            JsExpression::str_lit("ie6"),
        );
        let stmt = JsStatement::If {
            test,
            then_stmt: Box::new(
                JsExpression::Invocation {
                    meta: Meta::SYNTHETIC,
                    callee: Box::new(JsExpression::name_ref("a")),
                    args: vec![],
                }
                .make_stmt(),
            ),
            else_stmt: Some(Box::new(
                JsExpression::Invocation {
                    meta: Meta::SYNTHETIC,
                    callee: Box::new(JsExpression::name_ref("b")),
                    args: vec![],
                }
                .make_stmt(),
            )),
        };
        let mut program = JsProgram {
            files: vec![],
            globals: JsBlock::of(vec![stmt]),
        };
        specialize(
            &mut program,
            &bindings(&[("user.agent", "gecko")]),
            &BTreeMap::new(),
        )
        .unwrap();
        crate::js::static_eval::optimize(&mut program);
        assert_eq!(generate(&program, JsOutputStyle::Compact), "b();");
    }

    #[test]
    fn test_rebind_substitution() {
        let stmt = JsStatement::Vars(vec![JsVar {
            meta: Meta::SYNTHETIC,
            name: "log".into(),
            init: Some(intrinsic_call(REBIND, "Logger")),
        }]);
        let mut program = JsProgram {
            files: vec![],
            globals: JsBlock::of(vec![stmt]),
        };
        specialize(
            &mut program,
            &BTreeMap::new(),
            &bindings(&[("Logger", "Ie6Logger")]),
        )
        .unwrap();
        assert_eq!(
            generate(&program, JsOutputStyle::Compact),
            "var log=Ie6Logger();"
        );
    }

    #[test]
    fn test_unknown_rebind_is_an_error() {
        let mut program = JsProgram {
            files: vec![],
            globals: JsBlock::of(vec![intrinsic_call(REBIND, "Nope").make_stmt()]),
        };
        let err = specialize(&mut program, &BTreeMap::new(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownRebind(name) if name == "Nope"));
    }

    #[test]
    fn test_request_scan() {
        let stmts = vec![
            intrinsic_call(REBIND, "Logger").make_stmt(),
            intrinsic_call(REBIND, "Animator").make_stmt(),
            intrinsic_call(GET_PROPERTY, "user.agent").make_stmt(),
        ];
        let program = JsProgram {
            files: vec![],
            globals: JsBlock::of(stmts),
        };
        let rebinds: Vec<String> = rebind_requests(&program).into_iter().collect();
        assert_eq!(rebinds, vec!["Animator".to_string(), "Logger".to_string()]);
        let props: Vec<String> = property_requests(&program).into_iter().collect();
        assert_eq!(props, vec!["user.agent".to_string()]);
    }
}
