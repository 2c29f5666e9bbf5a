//! JavaScript AST used on the permutation side of the pipeline.
//!
//! One enum variant per node kind so rewrite passes can match exhaustively.
//! Every expression carries a [`Meta`] (source file index + line) because the
//! stack emulator records locations; statements synthesized by passes use
//! [`Meta::SYNTHETIC`]. The whole tree is serde-serializable since it travels
//! inside the precompilation file.

use serde::{Deserialize, Serialize};

/// Source position attached to expressions: an index into
/// [`JsProgram::files`] plus a one-based line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub file: u32,
    pub line: u32,
}

impl Meta {
    /// Position used for nodes created by compiler passes.
    pub const SYNTHETIC: Meta = Meta {
        file: u32::MAX,
        line: 0,
    };

    pub fn is_synthetic(&self) -> bool {
        self.file == u32::MAX
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsLiteral {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsUnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
    Inc,
    Dec,
}

impl JsUnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            JsUnaryOp::Neg => "-",
            JsUnaryOp::Pos => "+",
            JsUnaryOp::Not => "!",
            JsUnaryOp::BitNot => "~",
            JsUnaryOp::TypeOf => "typeof",
            JsUnaryOp::Void => "void",
            JsUnaryOp::Delete => "delete",
            JsUnaryOp::Inc => "++",
            JsUnaryOp::Dec => "--",
        }
    }

    /// True for operators that write through their operand.
    pub fn is_modifying(self) -> bool {
        matches!(self, JsUnaryOp::Inc | JsUnaryOp::Dec | JsUnaryOp::Delete)
    }

    /// Keyword operators need a space before their operand when printed.
    pub fn is_keyword(self) -> bool {
        matches!(self, JsUnaryOp::TypeOf | JsUnaryOp::Void | JsUnaryOp::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsBinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Shru,
    Lt,
    Lte,
    Gt,
    Gte,
    InstanceOf,
    In,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Asg,
    AsgAdd,
    AsgSub,
    AsgMul,
    AsgDiv,
    AsgMod,
    AsgShl,
    AsgShr,
    AsgShru,
    AsgBitAnd,
    AsgBitXor,
    AsgBitOr,
    Comma,
}

impl JsBinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            JsBinaryOp::Mul => "*",
            JsBinaryOp::Div => "/",
            JsBinaryOp::Mod => "%",
            JsBinaryOp::Add => "+",
            JsBinaryOp::Sub => "-",
            JsBinaryOp::Shl => "<<",
            JsBinaryOp::Shr => ">>",
            JsBinaryOp::Shru => ">>>",
            JsBinaryOp::Lt => "<",
            JsBinaryOp::Lte => "<=",
            JsBinaryOp::Gt => ">",
            JsBinaryOp::Gte => ">=",
            JsBinaryOp::InstanceOf => "instanceof",
            JsBinaryOp::In => "in",
            JsBinaryOp::Eq => "==",
            JsBinaryOp::Neq => "!=",
            JsBinaryOp::StrictEq => "===",
            JsBinaryOp::StrictNeq => "!==",
            JsBinaryOp::BitAnd => "&",
            JsBinaryOp::BitXor => "^",
            JsBinaryOp::BitOr => "|",
            JsBinaryOp::And => "&&",
            JsBinaryOp::Or => "||",
            JsBinaryOp::Asg => "=",
            JsBinaryOp::AsgAdd => "+=",
            JsBinaryOp::AsgSub => "-=",
            JsBinaryOp::AsgMul => "*=",
            JsBinaryOp::AsgDiv => "/=",
            JsBinaryOp::AsgMod => "%=",
            JsBinaryOp::AsgShl => "<<=",
            JsBinaryOp::AsgShr => ">>=",
            JsBinaryOp::AsgShru => ">>>=",
            JsBinaryOp::AsgBitAnd => "&=",
            JsBinaryOp::AsgBitXor => "^=",
            JsBinaryOp::AsgBitOr => "|=",
            JsBinaryOp::Comma => ",",
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            JsBinaryOp::Asg
                | JsBinaryOp::AsgAdd
                | JsBinaryOp::AsgSub
                | JsBinaryOp::AsgMul
                | JsBinaryOp::AsgDiv
                | JsBinaryOp::AsgMod
                | JsBinaryOp::AsgShl
                | JsBinaryOp::AsgShr
                | JsBinaryOp::AsgShru
                | JsBinaryOp::AsgBitAnd
                | JsBinaryOp::AsgBitXor
                | JsBinaryOp::AsgBitOr
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, JsBinaryOp::InstanceOf | JsBinaryOp::In)
    }

    /// Operator precedence; larger binds tighter. Assignment and comma are
    /// right- and left-associative respectively, which the writer handles.
    pub fn precedence(self) -> u8 {
        match self {
            JsBinaryOp::Comma => 1,
            op if op.is_assignment() => 2,
            JsBinaryOp::Or => 4,
            JsBinaryOp::And => 5,
            JsBinaryOp::BitOr => 6,
            JsBinaryOp::BitXor => 7,
            JsBinaryOp::BitAnd => 8,
            JsBinaryOp::Eq | JsBinaryOp::Neq | JsBinaryOp::StrictEq | JsBinaryOp::StrictNeq => 9,
            JsBinaryOp::Lt
            | JsBinaryOp::Lte
            | JsBinaryOp::Gt
            | JsBinaryOp::Gte
            | JsBinaryOp::InstanceOf
            | JsBinaryOp::In => 10,
            JsBinaryOp::Shl | JsBinaryOp::Shr | JsBinaryOp::Shru => 11,
            JsBinaryOp::Add | JsBinaryOp::Sub => 12,
            _ => 13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsObjectProperty {
    pub key: String,
    pub value: JsExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsFunction {
    pub meta: Meta,
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: JsBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsExpression {
    Literal {
        meta: Meta,
        value: JsLiteral,
    },
    NameRef {
        meta: Meta,
        name: String,
    },
    This {
        meta: Meta,
    },
    Array {
        meta: Meta,
        elements: Vec<JsExpression>,
    },
    Object {
        meta: Meta,
        properties: Vec<JsObjectProperty>,
    },
    Function(JsFunction),
    Prefix {
        meta: Meta,
        op: JsUnaryOp,
        arg: Box<JsExpression>,
    },
    Postfix {
        meta: Meta,
        op: JsUnaryOp,
        arg: Box<JsExpression>,
    },
    Binary {
        meta: Meta,
        op: JsBinaryOp,
        left: Box<JsExpression>,
        right: Box<JsExpression>,
    },
    Conditional {
        meta: Meta,
        test: Box<JsExpression>,
        then_expr: Box<JsExpression>,
        else_expr: Box<JsExpression>,
    },
    Invocation {
        meta: Meta,
        callee: Box<JsExpression>,
        args: Vec<JsExpression>,
    },
    New {
        meta: Meta,
        callee: Box<JsExpression>,
        args: Vec<JsExpression>,
    },
    ArrayAccess {
        meta: Meta,
        array: Box<JsExpression>,
        index: Box<JsExpression>,
    },
    Member {
        meta: Meta,
        object: Box<JsExpression>,
        member: String,
    },
}

impl JsExpression {
    pub fn meta(&self) -> Meta {
        match self {
            JsExpression::Literal { meta, .. }
            | JsExpression::NameRef { meta, .. }
            | JsExpression::This { meta }
            | JsExpression::Array { meta, .. }
            | JsExpression::Object { meta, .. }
            | JsExpression::Prefix { meta, .. }
            | JsExpression::Postfix { meta, .. }
            | JsExpression::Binary { meta, .. }
            | JsExpression::Conditional { meta, .. }
            | JsExpression::Invocation { meta, .. }
            | JsExpression::New { meta, .. }
            | JsExpression::ArrayAccess { meta, .. }
            | JsExpression::Member { meta, .. } => *meta,
            JsExpression::Function(f) => f.meta,
        }
    }

    /// Whether evaluating this expression can be observed by the program.
    /// The analysis is conservative: calls, constructions and writes count,
    /// pure reads do not.
    pub fn has_side_effects(&self) -> bool {
        match self {
            JsExpression::Literal { .. }
            | JsExpression::NameRef { .. }
            | JsExpression::This { .. }
            | JsExpression::Function(_) => false,
            JsExpression::Array { elements, .. } => {
                elements.iter().any(JsExpression::has_side_effects)
            }
            JsExpression::Object { properties, .. } => {
                properties.iter().any(|p| p.value.has_side_effects())
            }
            JsExpression::Prefix { op, arg, .. } => op.is_modifying() || arg.has_side_effects(),
            JsExpression::Postfix { .. } => true,
            JsExpression::Binary { op, left, right, .. } => {
                op.is_assignment() || left.has_side_effects() || right.has_side_effects()
            }
            JsExpression::Conditional {
                test,
                then_expr,
                else_expr,
                ..
            } => {
                test.has_side_effects()
                    || then_expr.has_side_effects()
                    || else_expr.has_side_effects()
            }
            JsExpression::Invocation { .. } | JsExpression::New { .. } => true,
            JsExpression::ArrayAccess { array, index, .. } => {
                array.has_side_effects() || index.has_side_effects()
            }
            JsExpression::Member { object, .. } => object.has_side_effects(),
        }
    }

    /// True when this expression always evaluates truthy.
    pub fn is_boolean_true(&self) -> bool {
        match self {
            JsExpression::Literal { value, .. } => match value {
                JsLiteral::Bool(b) => *b,
                JsLiteral::Integer(n) => *n != 0,
                JsLiteral::Float(f) => *f != 0.0,
                JsLiteral::String(s) => !s.is_empty(),
                JsLiteral::Null => false,
            },
            JsExpression::Prefix {
                op: JsUnaryOp::Not,
                arg,
                ..
            } => arg.is_boolean_false(),
            JsExpression::Function(_) => true,
            _ => false,
        }
    }

    /// True when this expression always evaluates falsy.
    pub fn is_boolean_false(&self) -> bool {
        match self {
            JsExpression::Literal { value, .. } => match value {
                JsLiteral::Bool(b) => !*b,
                JsLiteral::Integer(n) => *n == 0,
                JsLiteral::Float(f) => *f == 0.0,
                JsLiteral::String(s) => s.is_empty(),
                JsLiteral::Null => true,
            },
            JsExpression::Prefix {
                op: JsUnaryOp::Not,
                arg,
                ..
            } => arg.is_boolean_true(),
            _ => false,
        }
    }

    pub fn make_stmt(self) -> JsStatement {
        JsStatement::Expr(self)
    }

    // Constructors for synthesized nodes.

    pub fn name_ref<S: Into<String>>(name: S) -> JsExpression {
        JsExpression::NameRef {
            meta: Meta::SYNTHETIC,
            name: name.into(),
        }
    }

    pub fn bool_lit(value: bool) -> JsExpression {
        JsExpression::Literal {
            meta: Meta::SYNTHETIC,
            value: JsLiteral::Bool(value),
        }
    }

    pub fn int_lit(value: i64) -> JsExpression {
        JsExpression::Literal {
            meta: Meta::SYNTHETIC,
            value: JsLiteral::Integer(value),
        }
    }

    pub fn str_lit<S: Into<String>>(value: S) -> JsExpression {
        JsExpression::Literal {
            meta: Meta::SYNTHETIC,
            value: JsLiteral::String(value.into()),
        }
    }

    pub fn binary(op: JsBinaryOp, left: JsExpression, right: JsExpression) -> JsExpression {
        JsExpression::Binary {
            meta: Meta::SYNTHETIC,
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn assignment(target: JsExpression, value: JsExpression) -> JsExpression {
        JsExpression::binary(JsBinaryOp::Asg, target, value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsVar {
    pub meta: Meta,
    pub name: String,
    pub init: Option<JsExpression>,
}

impl JsVar {
    pub fn uninitialized<S: Into<String>>(name: S) -> JsVar {
        JsVar {
            meta: Meta::SYNTHETIC,
            name: name.into(),
            init: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsCatch {
    pub param: String,
    pub body: JsBlock,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsBlock {
    pub stmts: Vec<JsStatement>,
}

impl JsBlock {
    pub fn new() -> JsBlock {
        JsBlock { stmts: Vec::new() }
    }

    pub fn of(stmts: Vec<JsStatement>) -> JsBlock {
        JsBlock { stmts }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsForInit {
    Vars(Vec<JsVar>),
    Expr(JsExpression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JsStatement {
    Empty,
    Block(JsBlock),
    Expr(JsExpression),
    Vars(Vec<JsVar>),
    If {
        test: JsExpression,
        then_stmt: Box<JsStatement>,
        else_stmt: Option<Box<JsStatement>>,
    },
    While {
        test: JsExpression,
        body: Box<JsStatement>,
    },
    DoWhile {
        body: Box<JsStatement>,
        test: JsExpression,
    },
    For {
        init: Option<JsForInit>,
        test: Option<JsExpression>,
        update: Option<JsExpression>,
        body: Box<JsStatement>,
    },
    Return(Option<JsExpression>),
    Break,
    Continue,
    Throw(JsExpression),
    Try {
        block: JsBlock,
        catches: Vec<JsCatch>,
        finally: Option<JsBlock>,
    },
}

impl JsStatement {
    /// Whether control unconditionally leaves the enclosing statement list
    /// after this statement; everything after it in a block is unreachable.
    pub fn unconditional_control_break(&self) -> bool {
        match self {
            JsStatement::Return(_)
            | JsStatement::Throw(_)
            | JsStatement::Break
            | JsStatement::Continue => true,
            JsStatement::Block(block) => block
                .stmts
                .iter()
                .any(JsStatement::unconditional_control_break),
            _ => false,
        }
    }

    /// Empty statements and empty blocks count as "nothing to execute".
    pub fn is_empty_stmt(&self) -> bool {
        match self {
            JsStatement::Empty => true,
            JsStatement::Block(block) => block.is_empty(),
            _ => false,
        }
    }
}

/// One whole parsed program: the global statement block plus the source file
/// table that expression [`Meta`]s index into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsProgram {
    pub files: Vec<String>,
    pub globals: JsBlock,
}

impl JsProgram {
    pub fn new() -> JsProgram {
        JsProgram {
            files: Vec::new(),
            globals: JsBlock::new(),
        }
    }

    pub fn file_name(&self, meta: Meta) -> Option<&str> {
        if meta.is_synthetic() {
            None
        } else {
            self.files.get(meta.file as usize).map(String::as_str)
        }
    }

    /// Finds a top-level function declaration by name. The stack emulator
    /// uses this to locate its support function.
    pub fn top_level_function(&self, name: &str) -> Option<&JsFunction> {
        self.globals.stmts.iter().find_map(|stmt| match stmt {
            JsStatement::Expr(JsExpression::Function(f)) if f.name.as_deref() == Some(name) => {
                Some(f)
            }
            _ => None,
        })
    }
}

impl Default for JsProgram {
    fn default() -> Self {
        JsProgram::new()
    }
}
