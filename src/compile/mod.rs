//! The precompile and per-permutation compile stages.
//!
//! Precompile parses and optimizes the module sources once into a
//! [`UnifiedAst`], enumerates the permutation space, and writes the bundle
//! to the work directory. The compile stage then specializes the shared
//! program per permutation, in parallel, writing one JavaScript file per
//! permutation index. The two stages communicate only through the work
//! directory, so the pipeline restarts at permutation granularity.

mod precompilation;

pub use precompilation::{permutation_file_name, Precompilation, PRECOMPILATION_FILE};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use log::{debug, error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cfg::{
    ModuleDef, PropertyPermutations, StaticPropertyOracle, EMULATED_STACK, RECORD_FILE_NAMES,
    RECORD_LINE_NUMBERS,
};
use crate::error::{Error, Result};
use crate::js::ast::JsProgram;
use crate::js::writer::{self, JsOutputStyle};
use crate::js::{resolve, stack_emulator, static_eval};
use crate::parser;

/// Compiler options carried by the unified AST into every permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JjsOptions {
    pub optimize: bool,
    pub output: JsOutputStyle,
}

impl Default for JjsOptions {
    fn default() -> JjsOptions {
        JjsOptions {
            optimize: true,
            output: JsOutputStyle::Compact,
        }
    }
}

/// One point in the binding-property cross-product. The id is assigned at
/// [`Precompilation`] construction and names this permutation's output
/// files from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permutation {
    pub id: usize,
    pub oracle: StaticPropertyOracle,
    pub rebind_answers: BTreeMap<String, String>,
}

/// The whole-program AST shared read-only by every permutation compile,
/// plus the options and the rebind requests discovered in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAst {
    pub options: JjsOptions,
    pub program: JsProgram,
    pub rebind_requests: BTreeSet<String>,
}

/// Parses and optimizes the module sources, enumerates the permutation
/// space, and writes the precompilation bundle under
/// `<work>/<module>/`. Any rebind request without a rule or property
/// request without a declaration aborts the whole stage.
pub fn precompile(
    module: &ModuleDef,
    options: JjsOptions,
    work_dir: &Path,
) -> Result<Precompilation> {
    let mut sources = Vec::with_capacity(module.sources.len());
    for (name, path) in module.sources.iter().zip(module.source_paths()) {
        sources.push((name.clone(), fs::read_to_string(&path)?));
    }
    let mut program = parser::parse_program(&sources)?;
    if options.optimize {
        static_eval::optimize(&mut program);
    }

    let rebind_requests = resolve::rebind_requests(&program);
    for request in &rebind_requests {
        if module.rebind_rule(request).is_none() {
            return Err(Error::UnknownRebind(request.clone()));
        }
    }
    for property in resolve::property_requests(&program) {
        if module.property(&property).is_none() {
            return Err(Error::UnboundProperty(property));
        }
    }

    let mut permutations = vec![];
    for combo in PropertyPermutations::new(module) {
        let mut rebind_answers = BTreeMap::new();
        for request in &rebind_requests {
            let answer = module
                .rebind_answer(request, &combo)
                .ok_or_else(|| Error::UnknownRebind(request.clone()))?;
            rebind_answers.insert(request.clone(), answer);
        }
        permutations.push(Permutation {
            id: 0, // final ids assigned below
            oracle: StaticPropertyOracle::new(module, combo),
            rebind_answers,
        });
    }

    let precompilation = Precompilation::new(
        UnifiedAst {
            options,
            program,
            rebind_requests,
        },
        permutations,
    );
    let module_work_dir = work_dir.join(&module.name);
    precompilation.save(&module_work_dir.join(PRECOMPILATION_FILE))?;
    info!(
        "precompiled module '{}': {} permutations",
        module.name,
        precompilation.permutations.len()
    );
    Ok(precompilation)
}

/// Compiles one permutation. Pure in `(ast, permutation)`: the shared
/// program is cloned and all mutation happens on the private copy.
pub fn compile_permutation(ast: &UnifiedAst, permutation: &Permutation) -> Result<String> {
    let mut program = ast.program.clone();
    resolve::specialize(
        &mut program,
        permutation.oracle.values(),
        &permutation.rebind_answers,
    )?;
    if ast.options.optimize {
        static_eval::optimize(&mut program);
    }
    if permutation.oracle.configuration_bool(EMULATED_STACK) {
        let instrumented = stack_emulator::exec(
            &mut program,
            permutation.oracle.configuration_bool(RECORD_FILE_NAMES),
            permutation.oracle.configuration_bool(RECORD_LINE_NUMBERS),
        );
        if !instrumented {
            debug!(
                "permutation {}: no stack emulation support function, pass skipped",
                permutation.id
            );
        }
    }
    Ok(writer::generate(&program, ast.options.output))
}

/// Validates a requested permutation subset: sorted, deduplicated, every
/// id in range. An empty request selects all permutations.
pub fn select_permutations(precompilation: &Precompilation, ids: &[usize]) -> Result<Vec<usize>> {
    let count = precompilation.permutations.len();
    if ids.is_empty() {
        return Ok((0..count).collect());
    }
    let mut selected = ids.to_vec();
    selected.sort_unstable();
    selected.dedup();
    for &id in &selected {
        if id >= count {
            return Err(Error::InvalidPermId { id, count });
        }
    }
    Ok(selected)
}

/// The compile stage: loads the precompilation from `<work>/<module>/`,
/// compiles the selected permutations in parallel, and writes
/// `permutation-<N>.js` per success. Individual permutation failures are
/// logged and the batch continues; the aggregate failure is the returned
/// error.
pub fn compile_perms(work_dir: &Path, module_name: &str, ids: &[usize]) -> Result<()> {
    let module_work_dir = work_dir.join(module_name);
    let precompilation = Precompilation::load(&module_work_dir.join(PRECOMPILATION_FILE))?;
    let selected = select_permutations(&precompilation, ids)?;
    info!(
        "compiling {} of {} permutations",
        selected.len(),
        precompilation.permutations.len()
    );

    let results: Vec<(usize, Option<String>)> = selected
        .par_iter()
        .map(|&id| {
            let permutation = &precompilation.permutations[id];
            match compile_permutation(&precompilation.ast, permutation) {
                Ok(js) => (id, Some(js)),
                Err(e) => {
                    error!("permutation {} failed: {}", id, e);
                    (id, None)
                }
            }
        })
        .collect();

    let mut failed = 0;
    for (id, js) in results {
        match js {
            Some(js) => {
                fs::write(module_work_dir.join(permutation_file_name(id)), js)?;
                debug!("wrote {}", permutation_file_name(id));
            }
            None => failed += 1,
        }
    }
    if failed > 0 {
        return Err(Error::Compile {
            failed,
            total: selected.len(),
        });
    }
    Ok(())
}
