mod api;
#[cfg(test)]
mod unit_tests;

pub use api::{parse_to_ast, parse_to_pairs, JsParser, Rule};

use crate::error::{Error, Result};
use crate::js::ast::{JsBlock, JsProgram};

/// Parses a set of `(file name, source)` pairs into one program. The file
/// names land in the program's file table in the given order, so statement
/// metadata can be traced back to its source.
pub fn parse_program(sources: &[(String, String)]) -> Result<JsProgram> {
    let mut files = Vec::with_capacity(sources.len());
    let mut stmts = vec![];
    for (index, (name, source)) in sources.iter().enumerate() {
        files.push(name.clone());
        let parsed = parse_to_ast(source, index as u32).map_err(|e| Error::Parse {
            file: name.clone(),
            message: e.to_string(),
        })?;
        stmts.extend(parsed);
    }
    Ok(JsProgram {
        files,
        globals: JsBlock::of(stmts),
    })
}
