//! Emulated call-stack instrumentation.
//!
//! Maintains a parallel call stack in generated code so that stack traces can
//! be reconstructed on platforms whose native exceptions carry none. Every
//! function pushes a reference to itself into the global `$stack` array on
//! entry and restores the global `$stackDepth` counter on every exit path.
//! Optionally a second `$location` array records the source position of the
//! last expression that could raise.
//!
//! The only tricky control flow is `try`/`finally`: a `return` inside the
//! guarded block reaches the `finally` before leaving the function, so the
//! pop must run there, and only when the function is actually exiting. Each
//! outermost `finally` gets its own lazily allocated early-exit flag. Catch
//! blocks reset `$stackDepth` to the function's saved index because a
//! browser-thrown exception skips all pop instrumentation on its way up.
//!
//! The pass requires the `$caught` support function; when a program never
//! defines it the pass is skipped entirely, which is a valid configuration.

use super::ast::*;

/// Name of the exception-normalization support function. Its presence in the
/// program gates the whole pass.
pub const SUPPORT_FUNCTION: &str = "$caught";

const STACK: &str = "$stack";
const STACK_DEPTH: &str = "$stackDepth";
const LOCATION: &str = "$location";
const STACK_INDEX: &str = "$stackIndex";
const RETURN_TEMP: &str = "$returnTemp";

/// Instruments every function in the program. Returns false when the support
/// function is absent and the program was left untouched. Line recording is
/// forced on whenever file recording is on, since a bare file name is
/// useless.
pub fn exec(program: &mut JsProgram, record_file_names: bool, record_line_numbers: bool) -> bool {
    if program.top_level_function(SUPPORT_FUNCTION).is_none() {
        return false;
    }
    let record_line_numbers = record_line_numbers || record_file_names;

    let emulator = StackEmulator {
        files: program.files.clone(),
        record_file_names,
        record_line_numbers,
    };
    emulator.make_globals(&mut program.globals);
    for stmt in &mut program.globals.stmts {
        emulator.walk_stmt(stmt);
    }
    true
}

struct StackEmulator {
    files: Vec<String>,
    record_file_names: bool,
    record_line_numbers: bool,
}

impl StackEmulator {
    /// Declares the shared stack state at the top of the program, merging
    /// into an existing leading var statement when there is one.
    fn make_globals(&self, globals: &mut JsBlock) {
        let minus_one = JsExpression::Prefix {
            meta: Meta::SYNTHETIC,
            op: JsUnaryOp::Neg,
            arg: Box::new(JsExpression::int_lit(1)),
        };
        let empty_array = || JsExpression::Array {
            meta: Meta::SYNTHETIC,
            elements: Vec::new(),
        };
        let new_vars = vec![
            JsVar {
                meta: Meta::SYNTHETIC,
                name: STACK.into(),
                init: Some(empty_array()),
            },
            JsVar {
                meta: Meta::SYNTHETIC,
                name: STACK_DEPTH.into(),
                init: Some(minus_one),
            },
            JsVar {
                meta: Meta::SYNTHETIC,
                name: LOCATION.into(),
                init: Some(empty_array()),
            },
        ];
        match globals.stmts.first_mut() {
            Some(JsStatement::Vars(vars)) => vars.extend(new_vars),
            _ => globals.stmts.insert(0, JsStatement::Vars(new_vars)),
        }
    }

    // Finds every function in the tree; inner functions are instrumented
    // before the function containing them, and the per-function rewrite
    // never descends into an already instrumented child.

    fn walk_stmt(&self, stmt: &mut JsStatement) {
        match stmt {
            JsStatement::Expr(expr) | JsStatement::Throw(expr) => self.walk_expr(expr),
            JsStatement::Vars(vars) => {
                for v in vars {
                    if let Some(init) = &mut v.init {
                        self.walk_expr(init);
                    }
                }
            }
            JsStatement::Block(block) => {
                for s in &mut block.stmts {
                    self.walk_stmt(s);
                }
            }
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => {
                self.walk_expr(test);
                self.walk_stmt(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.walk_stmt(else_stmt);
                }
            }
            JsStatement::While { test, body } | JsStatement::DoWhile { body, test } => {
                self.walk_expr(test);
                self.walk_stmt(body);
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
                                self.walk_expr(e);
                            }
                        }
                    }
                    Some(JsForInit::Expr(e)) => self.walk_expr(e),
                    None => {}
                }
                if let Some(e) = test {
                    self.walk_expr(e);
                }
                if let Some(e) = update {
                    self.walk_expr(e);
                }
                self.walk_stmt(body);
            }
            JsStatement::Return(Some(expr)) => self.walk_expr(expr),
            JsStatement::Try {
                block,
                catches,
                finally,
            } => {
                for s in &mut block.stmts {
                    self.walk_stmt(s);
                }
                for c in catches {
                    for s in &mut c.body.stmts {
                        self.walk_stmt(s);
                    }
                }
                if let Some(f) = finally {
                    for s in &mut f.stmts {
                        self.walk_stmt(s);
                    }
                }
            }
            _ => {}
        }
    }

    fn walk_expr(&self, expr: &mut JsExpression) {
        match expr {
            JsExpression::Function(f) => {
                for s in &mut f.body.stmts {
                    self.walk_stmt(s);
                }
                self.instrument_function(f);
            }
            JsExpression::Array { elements, .. } => {
                for e in elements {
                    self.walk_expr(e);
                }
            }
            JsExpression::Object { properties, .. } => {
                for p in properties {
                    self.walk_expr(&mut p.value);
                }
            }
            JsExpression::Prefix { arg, .. } | JsExpression::Postfix { arg, .. } => {
                self.walk_expr(arg)
            }
            JsExpression::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            JsExpression::Conditional {
                test,
                then_expr,
                else_expr,
                ..
            } => {
                self.walk_expr(test);
                self.walk_expr(then_expr);
                self.walk_expr(else_expr);
            }
            JsExpression::Invocation { callee, args, .. }
            | JsExpression::New { callee, args, .. } => {
                self.walk_expr(callee);
                for a in args {
                    self.walk_expr(a);
                }
            }
            JsExpression::ArrayAccess { array, index, .. } => {
                self.walk_expr(array);
                self.walk_expr(index);
            }
            JsExpression::Member { object, .. } => self.walk_expr(object),
            _ => {}
        }
    }

    fn instrument_function(&self, f: &mut JsFunction) {
        if f.body.is_empty() {
            return;
        }
        if self.record_line_numbers {
            let mut recorder = LocationRecorder {
                files: &self.files,
                record_file_names: self.record_file_names,
                last: None,
            };
            for stmt in &mut f.body.stmts {
                recorder.stmt(stmt);
            }
        }

        let mut entry_exit = EntryExit {
            vars_to_add: vec![JsVar::uninitialized(STACK_INDEX)],
            frame_active: false,
            frame_var: None,
            exit_var_count: 0,
            return_temp_added: false,
        };
        let mut stmts = entry_exit.stmt_list(std::mem::take(&mut f.body.stmts));

        // Entry push goes after a leading var statement, if any.
        let idx = usize::from(matches!(stmts.first(), Some(JsStatement::Vars(_))));
        stmts.insert(idx, push_stmt(f.name.as_deref()));

        // A trailing return or throw already popped.
        if !matches!(
            stmts.last(),
            Some(JsStatement::Return(_)) | Some(JsStatement::Throw(_))
        ) {
            stmts.push(pop_expr().make_stmt());
        }

        match stmts.first_mut() {
            Some(JsStatement::Vars(vars)) => vars.extend(entry_exit.vars_to_add),
            _ => stmts.insert(0, JsStatement::Vars(entry_exit.vars_to_add)),
        }
        f.body.stmts = stmts;
    }
}

/// `$stack[$stackIndex = ++$stackDepth] = <fn>`, with `null` standing in for
/// an anonymous function.
fn push_stmt(name: Option<&str>) -> JsStatement {
    let fn_ref = match name {
        Some(name) => JsExpression::name_ref(name),
        None => JsExpression::Literal {
            meta: Meta::SYNTHETIC,
            value: JsLiteral::Null,
        },
    };
    let slot = JsExpression::ArrayAccess {
        meta: Meta::SYNTHETIC,
        array: Box::new(JsExpression::name_ref(STACK)),
        index: Box::new(JsExpression::assignment(
            JsExpression::name_ref(STACK_INDEX),
            JsExpression::Prefix {
                meta: Meta::SYNTHETIC,
                op: JsUnaryOp::Inc,
                arg: Box::new(JsExpression::name_ref(STACK_DEPTH)),
            },
        )),
    };
    JsExpression::assignment(slot, fn_ref).make_stmt()
}

/// `$stackDepth = $stackIndex - 1`
fn pop_expr() -> JsExpression {
    JsExpression::assignment(
        JsExpression::name_ref(STACK_DEPTH),
        JsExpression::binary(
            JsBinaryOp::Sub,
            JsExpression::name_ref(STACK_INDEX),
            JsExpression::int_lit(1),
        ),
    )
}

/// `$stackDepth = $stackIndex`
fn reset_expr() -> JsExpression {
    JsExpression::assignment(
        JsExpression::name_ref(STACK_DEPTH),
        JsExpression::name_ref(STACK_INDEX),
    )
}

/// Per-function exit bookkeeping. Statement rewrites return a list because a
/// single return may expand into several statements.
struct EntryExit {
    vars_to_add: Vec<JsVar>,
    /// Whether we are inside the protected region of the outermost
    /// try/finally. Nested try/finally blocks get no special treatment; a
    /// return anywhere in the region routes through the same flag.
    frame_active: bool,
    frame_var: Option<String>,
    exit_var_count: usize,
    return_temp_added: bool,
}

impl EntryExit {
    fn stmt_list(&mut self, stmts: Vec<JsStatement>) -> Vec<JsStatement> {
        let mut out = Vec::new();
        for stmt in stmts {
            out.extend(self.stmt(stmt));
        }
        out
    }

    /// Rewrites one statement, wrapping multi-statement expansions in a block
    /// for single-statement positions.
    fn one(&mut self, stmt: JsStatement) -> JsStatement {
        let mut expanded = self.stmt(stmt);
        if expanded.len() == 1 {
            if let Some(only) = expanded.pop() {
                return only;
            }
        }
        JsStatement::Block(JsBlock::of(expanded))
    }

    fn stmt(&mut self, stmt: JsStatement) -> Vec<JsStatement> {
        match stmt {
            JsStatement::Block(block) => vec![JsStatement::Block(JsBlock::of(
                self.stmt_list(block.stmts),
            ))],
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => vec![JsStatement::If {
                test,
                then_stmt: Box::new(self.one(*then_stmt)),
                else_stmt: else_stmt.map(|s| Box::new(self.one(*s))),
            }],
            JsStatement::While { test, body } => vec![JsStatement::While {
                test,
                body: Box::new(self.one(*body)),
            }],
            JsStatement::DoWhile { body, test } => vec![JsStatement::DoWhile {
                body: Box::new(self.one(*body)),
                test,
            }],
            JsStatement::For {
                init,
                test,
                update,
                body,
            } => vec![JsStatement::For {
                init,
                test,
                update,
                body: Box::new(self.one(*body)),
            }],
            JsStatement::Return(expr) => self.rewrite_return(expr),
            JsStatement::Try {
                block,
                catches,
                finally,
            } => self.rewrite_try(block, catches, finally),
            stmt => vec![stmt],
        }
    }

    fn rewrite_return(&mut self, expr: Option<JsExpression>) -> Vec<JsStatement> {
        if self.frame_active {
            // The enclosing finally performs the pop; flag the early exit.
            let flag = JsExpression::assignment(
                JsExpression::name_ref(self.frame_var_name()),
                JsExpression::bool_lit(true),
            );
            return match expr {
                None => vec![flag.make_stmt(), JsStatement::Return(None)],
                Some(expr) => vec![JsStatement::Return(Some(JsExpression::binary(
                    JsBinaryOp::Comma,
                    flag,
                    expr,
                )))],
            };
        }
        match expr {
            // The return expression may itself throw after the pop, so it is
            // evaluated into a temp while the frame is still live.
            Some(expr) if expr.has_side_effects() => {
                if !self.return_temp_added {
                    self.return_temp_added = true;
                    self.vars_to_add.push(JsVar::uninitialized(RETURN_TEMP));
                }
                vec![
                    JsExpression::assignment(JsExpression::name_ref(RETURN_TEMP), expr)
                        .make_stmt(),
                    pop_expr().make_stmt(),
                    JsStatement::Return(Some(JsExpression::name_ref(RETURN_TEMP))),
                ]
            }
            expr => vec![pop_expr().make_stmt(), JsStatement::Return(expr)],
        }
    }

    fn rewrite_try(
        &mut self,
        block: JsBlock,
        catches: Vec<JsCatch>,
        mut finally: Option<JsBlock>,
    ) -> Vec<JsStatement> {
        if !self.frame_active {
            if let Some(finally) = finally.take() {
                self.frame_active = true;
                self.frame_var = None;

                let block = JsBlock::of(self.stmt_list(block.stmts));
                // Exceptions must hit a catch so the depth can be restored
                // before they propagate.
                let mut catches = catches;
                if catches.is_empty() {
                    catches.push(synthetic_catch());
                }
                let catches: Vec<JsCatch> =
                    catches.into_iter().map(|c| self.rewrite_catch(c)).collect();

                let exit_var = self.frame_var.take();
                self.frame_active = false;

                // Exceptions thrown by the finally itself just leave.
                let mut fin_stmts = self.stmt_list(finally.stmts);
                if let Some(exit_var) = exit_var {
                    if !matches!(
                        fin_stmts.last(),
                        Some(JsStatement::Return(_)) | Some(JsStatement::Throw(_))
                    ) {
                        fin_stmts.push(
                            JsExpression::binary(
                                JsBinaryOp::And,
                                JsExpression::name_ref(exit_var),
                                pop_expr(),
                            )
                            .make_stmt(),
                        );
                    }
                }
                return vec![JsStatement::Try {
                    block,
                    catches,
                    finally: Some(JsBlock::of(fin_stmts)),
                }];
            }
        }
        vec![JsStatement::Try {
            block: JsBlock::of(self.stmt_list(block.stmts)),
            catches: catches.into_iter().map(|c| self.rewrite_catch(c)).collect(),
            finally: finally.map(|f| JsBlock::of(self.stmt_list(f.stmts))),
        }]
    }

    fn rewrite_catch(&mut self, catch: JsCatch) -> JsCatch {
        let mut stmts = catch.body.stmts;
        insert_catch_resets(&mut stmts);
        JsCatch {
            param: catch.param,
            body: JsBlock::of(self.stmt_list(stmts)),
        }
    }

    fn frame_var_name(&mut self) -> String {
        if let Some(name) = &self.frame_var {
            return name.clone();
        }
        let name = format!("$exitingEarly{}", self.exit_var_count);
        self.exit_var_count += 1;
        self.vars_to_add.push(JsVar::uninitialized(name.clone()));
        self.frame_var = Some(name.clone());
        name
    }
}

/// `catch (e) { e = $caught(e); throw e; }` (the depth reset is added by the
/// regular catch rewrite).
fn synthetic_catch() -> JsCatch {
    let caught_call = JsExpression::Invocation {
        meta: Meta::SYNTHETIC,
        callee: Box::new(JsExpression::name_ref(SUPPORT_FUNCTION)),
        args: vec![JsExpression::name_ref("e")],
    };
    JsCatch {
        param: "e".into(),
        body: JsBlock::of(vec![
            JsExpression::assignment(JsExpression::name_ref("e"), caught_call).make_stmt(),
            JsStatement::Throw(JsExpression::name_ref("e")),
        ]),
    }
}

/// Inserts `$stackDepth = $stackIndex` after every `x = $caught(..)`
/// statement, restoring the depth the exception skipped past.
fn insert_catch_resets(stmts: &mut Vec<JsStatement>) {
    let mut i = 0;
    while i < stmts.len() {
        if is_caught_assignment(&stmts[i]) {
            stmts.insert(i + 1, reset_expr().make_stmt());
            i += 1;
        } else {
            insert_catch_resets_nested(&mut stmts[i]);
        }
        i += 1;
    }
}

fn insert_catch_resets_nested(stmt: &mut JsStatement) {
    match stmt {
        JsStatement::Block(block) => insert_catch_resets(&mut block.stmts),
        JsStatement::If {
            then_stmt,
            else_stmt,
            ..
        } => {
            insert_catch_resets_nested(then_stmt);
            if let Some(else_stmt) = else_stmt {
                insert_catch_resets_nested(else_stmt);
            }
        }
        JsStatement::While { body, .. }
        | JsStatement::DoWhile { body, .. }
        | JsStatement::For { body, .. } => insert_catch_resets_nested(body),
        JsStatement::Try {
            block,
            catches,
            finally,
        } => {
            insert_catch_resets(&mut block.stmts);
            for c in catches {
                insert_catch_resets(&mut c.body.stmts);
            }
            if let Some(f) = finally {
                insert_catch_resets(&mut f.stmts);
            }
        }
        _ => {}
    }
}

fn is_caught_assignment(stmt: &JsStatement) -> bool {
    if let JsStatement::Expr(JsExpression::Binary {
        op: JsBinaryOp::Asg,
        right,
        ..
    }) = stmt
    {
        if let JsExpression::Invocation { callee, .. } = &**right {
            if let JsExpression::NameRef { name, .. } = &**callee {
                return name == SUPPORT_FUNCTION;
            }
        }
    }
    false
}

/// Prefixes every expression that can raise or transfer control with an
/// update of the `$location` side table. Consecutive identical locations are
/// recorded once; loop conditions and increments reset the tracking because
/// their evaluation order differs from source order.
struct LocationRecorder<'a> {
    files: &'a [String],
    record_file_names: bool,
    last: Option<Meta>,
}

impl LocationRecorder<'_> {
    fn reset(&mut self) {
        self.last = None;
    }

    fn stmt(&mut self, stmt: &mut JsStatement) {
        match stmt {
            JsStatement::Expr(expr) | JsStatement::Throw(expr) => self.expr(expr, false),
            JsStatement::Vars(vars) => {
                for v in vars {
                    if let Some(init) = &mut v.init {
                        self.expr(init, false);
                    }
                }
            }
            JsStatement::Block(block) => {
                for s in &mut block.stmts {
                    self.stmt(s);
                }
            }
            JsStatement::If {
                test,
                then_stmt,
                else_stmt,
            } => {
                self.expr(test, false);
                self.stmt(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.stmt(else_stmt);
                }
            }
            JsStatement::While { test, body } => {
                self.reset();
                self.expr(test, false);
                self.stmt(body);
            }
            JsStatement::DoWhile { body, test } => {
                self.stmt(body);
                self.reset();
                self.expr(test, false);
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
                                self.expr(e, false);
                            }
                        }
                    }
                    Some(JsForInit::Expr(e)) => self.expr(e, false),
                    None => {}
                }
                if let Some(test) = test {
                    self.reset();
                    self.expr(test, false);
                }
                if let Some(update) = update {
                    self.reset();
                    self.expr(update, false);
                }
                self.stmt(body);
            }
            JsStatement::Return(Some(expr)) => self.expr(expr, false),
            JsStatement::Try {
                block,
                catches,
                finally,
            } => {
                for s in &mut block.stmts {
                    self.stmt(s);
                }
                for c in catches {
                    for s in &mut c.body.stmts {
                        self.stmt(s);
                    }
                }
                if let Some(f) = finally {
                    for s in &mut f.stmts {
                        self.stmt(s);
                    }
                }
            }
            _ => {}
        }
    }

    fn expr(&mut self, expr: &mut JsExpression, lvalue: bool) {
        match expr {
            // Already-instrumented nested functions are their own world.
            JsExpression::Function(_)
            | JsExpression::Literal { .. }
            | JsExpression::NameRef { .. }
            | JsExpression::This { .. } => return,
            JsExpression::Array { elements, .. } => {
                for e in elements {
                    self.expr(e, false);
                }
            }
            JsExpression::Object { properties, .. } => {
                for p in properties {
                    self.expr(&mut p.value, false);
                }
            }
            JsExpression::Prefix { arg, op, .. } | JsExpression::Postfix { arg, op, .. } => {
                self.expr(arg, op.is_modifying());
            }
            JsExpression::Binary {
                op, left, right, ..
            } => {
                self.expr(left, op.is_assignment());
                self.expr(right, false);
            }
            JsExpression::Conditional {
                test,
                then_expr,
                else_expr,
                ..
            } => {
                self.expr(test, false);
                self.expr(then_expr, false);
                self.expr(else_expr, false);
            }
            JsExpression::Invocation { callee, args, .. }
            | JsExpression::New { callee, args, .. } => {
                self.expr(callee, false);
                for a in args {
                    self.expr(a, false);
                }
            }
            JsExpression::ArrayAccess { array, index, .. } => {
                self.expr(array, false);
                self.expr(index, false);
            }
            JsExpression::Member { object, .. } => self.expr(object, false),
        }
        if !lvalue && self.should_record(expr) {
            self.record(expr);
        }
    }

    fn should_record(&self, expr: &JsExpression) -> bool {
        let meta = expr.meta();
        if meta.is_synthetic() {
            return false;
        }
        let qualifies = match expr {
            JsExpression::ArrayAccess { .. }
            | JsExpression::Invocation { .. }
            | JsExpression::New { .. } => true,
            JsExpression::Binary { op, .. } => op.is_assignment(),
            JsExpression::Prefix { op, .. } | JsExpression::Postfix { op, .. } => {
                op.is_modifying()
            }
            _ => false,
        };
        if !qualifies {
            return false;
        }
        match self.last {
            Some(last) => {
                meta.line != last.line || (self.record_file_names && meta.file != last.file)
            }
            None => true,
        }
    }

    /// Rewrites `expr` to `($location[$stackIndex] = "file:line", expr)`.
    fn record(&mut self, expr: &mut JsExpression) {
        let meta = expr.meta();
        self.last = Some(meta);

        let text = if self.record_file_names {
            let file = self
                .files
                .get(meta.file as usize)
                .map(String::as_str)
                .unwrap_or("");
            format!("{}:{}", base_name(file), meta.line)
        } else {
            meta.line.to_string()
        };
        let update = JsExpression::assignment(
            JsExpression::ArrayAccess {
                meta: Meta::SYNTHETIC,
                array: Box::new(JsExpression::name_ref(LOCATION)),
                index: Box::new(JsExpression::name_ref(STACK_INDEX)),
            },
            JsExpression::str_lit(text),
        );
        let original = std::mem::replace(expr, JsExpression::bool_lit(false));
        *expr = JsExpression::binary(JsBinaryOp::Comma, update, original);
    }
}

fn base_name(file: &str) -> &str {
    file.rsplit('/').next().unwrap_or(file)
}
