use pest::error::{Error, ErrorVariant};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::js::ast::*;

#[derive(Parser)]
#[grammar = "parser/js_grammar.pest"] // relative to src
pub struct JsParser;

/// Parses one source file into its top-level statements. `file` is the index
/// of the file in the program's file table; every expression's [`Meta`]
/// points back at it.
pub fn parse_to_ast(script: &str, file: u32) -> Result<Vec<JsStatement>, Error<Rule>> {
    let mut pairs = JsParser::parse(Rule::script, script)?;
    let script_pair = pairs.next().unwrap();
    let mut stmts = vec![];
    for pair in script_pair.into_inner() {
        match pair.as_rule() {
            Rule::statement => stmts.push(build_ast_from_statement(pair, file)?),
            Rule::EOI => { /* Do nothing */ }
            _ => return Err(get_unexpected_error(1, &pair)),
        }
    }
    Ok(stmts)
}

pub fn parse_to_pairs(script: &str) -> Result<Pairs<Rule>, Error<Rule>> {
    JsParser::parse(Rule::script, script)
}

fn get_unexpected_error(id: i32, pair: &Pair<Rule>) -> Error<Rule> {
    let message = format!("Unexpected state reached [{:?}] - {}", pair.as_rule(), id);
    Error::new_from_span(ErrorVariant::CustomError { message }, pair.as_span())
}

fn meta_of(pair: &Pair<Rule>, file: u32) -> Meta {
    let (line, _col) = pair.as_span().start_pos().line_col();
    Meta {
        file,
        line: line as u32,
    }
}

fn build_ast_from_statement(pair: Pair<Rule>, file: u32) -> Result<JsStatement, Error<Rule>> {
    let inner_pair = pair.into_inner().next().unwrap();
    Ok(match inner_pair.as_rule() {
        Rule::block => JsStatement::Block(build_ast_from_block(inner_pair, file)?),
        Rule::empty_statement => JsStatement::Empty,
        Rule::var_statement => JsStatement::Vars(build_var_declarations(inner_pair, file)?),
        Rule::if_statement => {
            let mut pair_iter = inner_pair.into_inner();
            let test = build_ast_from_expression(pair_iter.next().unwrap(), file)?;
            let then_stmt = build_ast_from_statement(pair_iter.next().unwrap(), file)?;
            let else_stmt = match pair_iter.next() {
                // kw_else token precedes the alternative statement
                Some(_) => Some(Box::new(build_ast_from_statement(
                    pair_iter.next().unwrap(),
                    file,
                )?)),
                None => None,
            };
            JsStatement::If {
                test,
                then_stmt: Box::new(then_stmt),
                else_stmt,
            }
        }
        Rule::while_statement => {
            let mut pair_iter = inner_pair.into_inner();
            JsStatement::While {
                test: build_ast_from_expression(pair_iter.next().unwrap(), file)?,
                body: Box::new(build_ast_from_statement(pair_iter.next().unwrap(), file)?),
            }
        }
        Rule::do_while_statement => {
            let mut pair_iter = inner_pair.into_inner();
            pair_iter.next(); // kw_do
            JsStatement::DoWhile {
                body: Box::new(build_ast_from_statement(pair_iter.next().unwrap(), file)?),
                test: build_ast_from_expression(pair_iter.next().unwrap(), file)?,
            }
        }
        Rule::for_statement => {
            let mut init = None;
            let mut test = None;
            let mut update = None;
            let mut body = None;
            for part in inner_pair.into_inner() {
                match part.as_rule() {
                    Rule::for_init => {
                        let init_pair = part.into_inner().next().unwrap();
                        init = Some(match init_pair.as_rule() {
                            Rule::for_var_init => {
                                JsForInit::Vars(build_var_declarations(init_pair, file)?)
                            }
                            Rule::expression => {
                                JsForInit::Expr(build_ast_from_expression(init_pair, file)?)
                            }
                            _ => return Err(get_unexpected_error(2, &init_pair)),
                        });
                    }
                    Rule::for_test => {
                        test = Some(build_ast_from_expression(
                            part.into_inner().next().unwrap(),
                            file,
                        )?);
                    }
                    Rule::for_update => {
                        update = Some(build_ast_from_expression(
                            part.into_inner().next().unwrap(),
                            file,
                        )?);
                    }
                    Rule::statement => {
                        body = Some(build_ast_from_statement(part, file)?);
                    }
                    _ => return Err(get_unexpected_error(3, &part)),
                }
            }
            match body {
                Some(body) => JsStatement::For {
                    init,
                    test,
                    update,
                    body: Box::new(body),
                },
                None => JsStatement::Empty,
            }
        }
        Rule::return_statement => {
            let mut pair_iter = inner_pair.into_inner();
            pair_iter.next(); // kw_return
            JsStatement::Return(match pair_iter.next() {
                Some(expr_pair) => Some(build_ast_from_expression(expr_pair, file)?),
                None => None,
            })
        }
        Rule::break_statement => JsStatement::Break,
        Rule::continue_statement => JsStatement::Continue,
        Rule::throw_statement => {
            let mut pair_iter = inner_pair.into_inner();
            pair_iter.next(); // kw_throw
            JsStatement::Throw(build_ast_from_expression(pair_iter.next().unwrap(), file)?)
        }
        Rule::try_statement => {
            let mut block = JsBlock::new();
            let mut catches = vec![];
            let mut finally = None;
            for part in inner_pair.into_inner() {
                match part.as_rule() {
                    Rule::block => block = build_ast_from_block(part, file)?,
                    Rule::catch_clause => {
                        let mut catch_iter = part.into_inner();
                        let param = catch_iter.next().unwrap().as_str().to_string();
                        let body = build_ast_from_block(catch_iter.next().unwrap(), file)?;
                        catches.push(JsCatch { param, body });
                    }
                    Rule::finally_clause => {
                        finally =
                            Some(build_ast_from_block(part.into_inner().next().unwrap(), file)?);
                    }
                    _ => return Err(get_unexpected_error(4, &part)),
                }
            }
            JsStatement::Try {
                block,
                catches,
                finally,
            }
        }
        Rule::function_declaration => {
            JsStatement::Expr(build_ast_from_function(inner_pair, file)?)
        }
        Rule::expression_statement => JsStatement::Expr(build_ast_from_expression(
            inner_pair.into_inner().next().unwrap(),
            file,
        )?),
        _ => return Err(get_unexpected_error(5, &inner_pair)),
    })
}

fn build_ast_from_block(pair: Pair<Rule>, file: u32) -> Result<JsBlock, Error<Rule>> {
    let mut stmts = vec![];
    for inner_pair in pair.into_inner() {
        stmts.push(build_ast_from_statement(inner_pair, file)?);
    }
    Ok(JsBlock::of(stmts))
}

/// Handles both `var_statement` and `for_var_init`: a kw_var token followed
/// by one or more declarations.
fn build_var_declarations(pair: Pair<Rule>, file: u32) -> Result<Vec<JsVar>, Error<Rule>> {
    let mut vars = vec![];
    for var_pair in pair.into_inner() {
        if var_pair.as_rule() != Rule::var_declaration {
            continue; // kw_var
        }
        let meta = meta_of(&var_pair, file);
        let mut decl_iter = var_pair.into_inner();
        let name = decl_iter.next().unwrap().as_str().to_string();
        let init = match decl_iter.next() {
            Some(init_pair) => Some(build_ast_from_assignment_expression(init_pair, file)?),
            None => None,
        };
        vars.push(JsVar { meta, name, init });
    }
    Ok(vars)
}

/// `function [name](params) { body }`, shared by declarations and
/// expressions.
fn build_ast_from_function(pair: Pair<Rule>, file: u32) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut name = None;
    let mut params = vec![];
    let mut body = JsBlock::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_function => {}
            Rule::identifier => name = Some(part.as_str().to_string()),
            Rule::formal_parameters => {
                for param in part.into_inner() {
                    params.push(param.as_str().to_string());
                }
            }
            Rule::function_body => {
                let mut stmts = vec![];
                for stmt_pair in part.into_inner() {
                    stmts.push(build_ast_from_statement(stmt_pair, file)?);
                }
                body = JsBlock::of(stmts);
            }
            _ => return Err(get_unexpected_error(6, &part)),
        }
    }
    Ok(JsExpression::Function(JsFunction {
        meta,
        name,
        params,
        body,
    }))
}

fn build_ast_from_expression(pair: Pair<Rule>, file: u32) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    let mut expr = build_ast_from_assignment_expression(pair_iter.next().unwrap(), file)?;
    for inner_pair in pair_iter {
        let right = build_ast_from_assignment_expression(inner_pair, file)?;
        expr = JsExpression::Binary {
            meta,
            op: JsBinaryOp::Comma,
            left: Box::new(expr),
            right: Box::new(right),
        };
    }
    Ok(expr)
}

fn build_ast_from_assignment_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    let target = build_ast_from_conditional_expression(pair_iter.next().unwrap(), file)?;
    match pair_iter.next() {
        Some(op_pair) => {
            let op = match op_pair.as_str() {
                "=" => JsBinaryOp::Asg,
                "+=" => JsBinaryOp::AsgAdd,
                "-=" => JsBinaryOp::AsgSub,
                "*=" => JsBinaryOp::AsgMul,
                "/=" => JsBinaryOp::AsgDiv,
                "%=" => JsBinaryOp::AsgMod,
                "<<=" => JsBinaryOp::AsgShl,
                ">>=" => JsBinaryOp::AsgShr,
                ">>>=" => JsBinaryOp::AsgShru,
                "&=" => JsBinaryOp::AsgBitAnd,
                "^=" => JsBinaryOp::AsgBitXor,
                "|=" => JsBinaryOp::AsgBitOr,
                _ => return Err(get_unexpected_error(7, &op_pair)),
            };
            let value = build_ast_from_assignment_expression(pair_iter.next().unwrap(), file)?;
            Ok(JsExpression::Binary {
                meta,
                op,
                left: Box::new(target),
                right: Box::new(value),
            })
        }
        None => Ok(target),
    }
}

fn build_ast_from_conditional_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    let test = build_ast_from_binary_expression(pair_iter.next().unwrap(), file)?;
    match pair_iter.next() {
        Some(then_pair) => {
            let then_expr = build_ast_from_assignment_expression(then_pair, file)?;
            let else_expr =
                build_ast_from_assignment_expression(pair_iter.next().unwrap(), file)?;
            Ok(JsExpression::Conditional {
                meta,
                test: Box::new(test),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            })
        }
        None => Ok(test),
    }
}

/// All the left-associative binary precedence levels share one shape: a
/// first operand, then operator/operand pairs (or bare operands for the
/// fixed-operator levels).
fn build_ast_from_binary_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let rule = pair.as_rule();
    let meta = meta_of(&pair, file);
    let fixed_op = match rule {
        Rule::logical_or_expression => Some(JsBinaryOp::Or),
        Rule::logical_and_expression => Some(JsBinaryOp::And),
        _ => None,
    };
    let mut pair_iter = pair.into_inner();
    let mut expr = build_binary_operand(pair_iter.next().unwrap(), file)?;
    while let Some(next_pair) = pair_iter.next() {
        let (op, operand_pair) = match fixed_op {
            Some(op) => (op, next_pair),
            None => {
                let op = match next_pair.as_str() {
                    "|" => JsBinaryOp::BitOr,
                    "^" => JsBinaryOp::BitXor,
                    "&" => JsBinaryOp::BitAnd,
                    "===" => JsBinaryOp::StrictEq,
                    "!==" => JsBinaryOp::StrictNeq,
                    "==" => JsBinaryOp::Eq,
                    "!=" => JsBinaryOp::Neq,
                    "<=" => JsBinaryOp::Lte,
                    ">=" => JsBinaryOp::Gte,
                    "<" => JsBinaryOp::Lt,
                    ">" => JsBinaryOp::Gt,
                    "instanceof" => JsBinaryOp::InstanceOf,
                    "in" => JsBinaryOp::In,
                    "<<" => JsBinaryOp::Shl,
                    ">>>" => JsBinaryOp::Shru,
                    ">>" => JsBinaryOp::Shr,
                    "+" => JsBinaryOp::Add,
                    "-" => JsBinaryOp::Sub,
                    "*" => JsBinaryOp::Mul,
                    "/" => JsBinaryOp::Div,
                    "%" => JsBinaryOp::Mod,
                    _ => return Err(get_unexpected_error(8, &next_pair)),
                };
                (op, pair_iter.next().unwrap())
            }
        };
        let right = build_binary_operand(operand_pair, file)?;
        expr = JsExpression::Binary {
            meta,
            op,
            left: Box::new(expr),
            right: Box::new(right),
        };
    }
    Ok(expr)
}

fn build_binary_operand(pair: Pair<Rule>, file: u32) -> Result<JsExpression, Error<Rule>> {
    match pair.as_rule() {
        Rule::logical_or_expression
        | Rule::logical_and_expression
        | Rule::bitwise_or_expression
        | Rule::bitwise_xor_expression
        | Rule::bitwise_and_expression
        | Rule::equality_expression
        | Rule::relational_expression
        | Rule::shift_expression
        | Rule::additive_expression
        | Rule::multiplicative_expression => build_ast_from_binary_expression(pair, file),
        Rule::unary_expression => build_ast_from_unary_expression(pair, file),
        _ => Err(get_unexpected_error(9, &pair)),
    }
}

fn build_ast_from_unary_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut operators = vec![];
    let mut inner_pairs: Vec<Pair<Rule>> = pair.into_inner().collect();
    let postfix_pair = inner_pairs.pop().unwrap();
    let mut expr = build_ast_from_postfix_expression(postfix_pair, file)?;
    for op_pair in inner_pairs.drain(..) {
        operators.push(match op_pair.as_str() {
            "++" => JsUnaryOp::Inc,
            "--" => JsUnaryOp::Dec,
            "+" => JsUnaryOp::Pos,
            "-" => JsUnaryOp::Neg,
            "~" => JsUnaryOp::BitNot,
            "!" => JsUnaryOp::Not,
            "typeof" => JsUnaryOp::TypeOf,
            "void" => JsUnaryOp::Void,
            "delete" => JsUnaryOp::Delete,
            _ => return Err(get_unexpected_error(10, &op_pair)),
        });
    }
    // The innermost operator binds first.
    for op in operators.into_iter().rev() {
        expr = JsExpression::Prefix {
            meta,
            op,
            arg: Box::new(expr),
        };
    }
    Ok(expr)
}

fn build_ast_from_postfix_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    let expr = build_ast_from_left_hand_side_expression(pair_iter.next().unwrap(), file)?;
    match pair_iter.next() {
        Some(op_pair) => {
            let op = match op_pair.as_str() {
                "++" => JsUnaryOp::Inc,
                "--" => JsUnaryOp::Dec,
                _ => return Err(get_unexpected_error(11, &op_pair)),
            };
            Ok(JsExpression::Postfix {
                meta,
                op,
                arg: Box::new(expr),
            })
        }
        None => Ok(expr),
    }
}

fn build_ast_from_left_hand_side_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    let head_pair = pair_iter.next().unwrap();
    let mut expr = match head_pair.as_rule() {
        Rule::new_expression => build_ast_from_new_expression(head_pair, file)?,
        Rule::primary_expression => build_ast_from_primary_expression(head_pair, file)?,
        _ => return Err(get_unexpected_error(12, &head_pair)),
    };
    for suffix_pair in pair_iter {
        let inner_pair = suffix_pair.into_inner().next().unwrap();
        expr = apply_suffix(expr, inner_pair, meta, file)?;
    }
    Ok(expr)
}

fn apply_suffix(
    expr: JsExpression,
    suffix: Pair<Rule>,
    meta: Meta,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    Ok(match suffix.as_rule() {
        Rule::arguments => JsExpression::Invocation {
            meta,
            callee: Box::new(expr),
            args: build_argument_list(suffix, file)?,
        },
        Rule::index_suffix => JsExpression::ArrayAccess {
            meta,
            array: Box::new(expr),
            index: Box::new(build_ast_from_expression(
                suffix.into_inner().next().unwrap(),
                file,
            )?),
        },
        Rule::dot_suffix => JsExpression::Member {
            meta,
            object: Box::new(expr),
            member: suffix.into_inner().next().unwrap().as_str().to_string(),
        },
        _ => return Err(get_unexpected_error(13, &suffix)),
    })
}

fn build_ast_from_new_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let mut pair_iter = pair.into_inner();
    pair_iter.next(); // kw_new
    let callee_pair = pair_iter.next().unwrap();
    let mut callee_iter = callee_pair.into_inner();
    let mut callee = build_ast_from_primary_expression(callee_iter.next().unwrap(), file)?;
    for suffix_pair in callee_iter {
        callee = apply_suffix(callee, suffix_pair, meta, file)?;
    }
    let args = match pair_iter.next() {
        Some(args_pair) => build_argument_list(args_pair, file)?,
        None => vec![],
    };
    Ok(JsExpression::New {
        meta,
        callee: Box::new(callee),
        args,
    })
}

fn build_argument_list(pair: Pair<Rule>, file: u32) -> Result<Vec<JsExpression>, Error<Rule>> {
    let mut args = vec![];
    for inner_pair in pair.into_inner() {
        args.push(build_ast_from_assignment_expression(inner_pair, file)?);
    }
    Ok(args)
}

fn build_ast_from_primary_expression(
    pair: Pair<Rule>,
    file: u32,
) -> Result<JsExpression, Error<Rule>> {
    let meta = meta_of(&pair, file);
    let inner_pair = pair.into_inner().next().unwrap();
    Ok(match inner_pair.as_rule() {
        Rule::literal => JsExpression::Literal {
            meta,
            value: build_ast_from_literal(inner_pair)?,
        },
        Rule::array_literal => {
            let mut elements = vec![];
            for element_pair in inner_pair.into_inner() {
                elements.push(build_ast_from_assignment_expression(element_pair, file)?);
            }
            JsExpression::Array { meta, elements }
        }
        Rule::object_literal => {
            let mut properties = vec![];
            for prop_pair in inner_pair.into_inner() {
                let mut prop_iter = prop_pair.into_inner();
                let name_pair = prop_iter.next().unwrap().into_inner().next().unwrap();
                let key = match name_pair.as_rule() {
                    Rule::identifier => name_pair.as_str().to_string(),
                    Rule::string_literal => unescape_string(name_pair.as_str()),
                    _ => return Err(get_unexpected_error(14, &name_pair)),
                };
                let value = build_ast_from_assignment_expression(prop_iter.next().unwrap(), file)?;
                properties.push(JsObjectProperty { key, value });
            }
            JsExpression::Object { meta, properties }
        }
        Rule::function_expression => build_ast_from_function(inner_pair, file)?,
        Rule::this_exp => JsExpression::This { meta },
        Rule::identifier_reference => JsExpression::NameRef {
            meta,
            name: inner_pair.as_str().to_string(),
        },
        Rule::paren_expression => {
            build_ast_from_expression(inner_pair.into_inner().next().unwrap(), file)?
        }
        _ => return Err(get_unexpected_error(15, &inner_pair)),
    })
}

fn build_ast_from_literal(pair: Pair<Rule>) -> Result<JsLiteral, Error<Rule>> {
    let inner_pair = pair.into_inner().next().unwrap();
    Ok(match inner_pair.as_rule() {
        Rule::null_literal => JsLiteral::Null,
        Rule::boolean_literal => JsLiteral::Bool(inner_pair.as_str() == "true"),
        Rule::numeric_literal => build_ast_from_numeric_literal(&inner_pair)?,
        Rule::string_literal => JsLiteral::String(unescape_string(inner_pair.as_str())),
        _ => return Err(get_unexpected_error(16, &inner_pair)),
    })
}

fn build_ast_from_numeric_literal(pair: &Pair<Rule>) -> Result<JsLiteral, Error<Rule>> {
    let s = pair.as_str();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return match i64::from_str_radix(hex, 16) {
            Ok(n) => Ok(JsLiteral::Integer(n)),
            Err(_) => Err(get_unexpected_error(17, pair)),
        };
    }
    if s.contains('.') || s.contains('e') || s.contains('E') {
        match s.parse::<f64>() {
            Ok(f) => Ok(JsLiteral::Float(f)),
            Err(_) => Err(get_unexpected_error(18, pair)),
        }
    } else {
        match s.parse::<i64>() {
            Ok(n) => Ok(JsLiteral::Integer(n)),
            // Out of integer range; JS numbers are doubles anyway.
            Err(_) => match s.parse::<f64>() {
                Ok(f) => Ok(JsLiteral::Float(f)),
                Err(_) => Err(get_unexpected_error(19, pair)),
            },
        }
    }
}

/// Strips the surrounding quotes and processes the escape sequences the
/// grammar admits.
fn unescape_string(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&code);
                    }
                }
            }
            Some(c) => out.push(c),
            None => {}
        }
    }
    out
}
