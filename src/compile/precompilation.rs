use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Permutation, UnifiedAst};
use crate::error::{Error, Result};

/// File name of the serialized bundle inside `<work>/<module>/`.
pub const PRECOMPILATION_FILE: &str = "precompilation.ser";

/// `permutation-<N>.js`, the compile stage's output for one permutation.
pub fn permutation_file_name(id: usize) -> String {
    format!("permutation-{}.js", id)
}

/// The hand-off bundle between the precompile and compile/link stages.
///
/// Permutation ids are reassigned sequentially here and nowhere else, so
/// they are dense, match array position, and stay stable through file
/// naming and linking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precompilation {
    pub ast: UnifiedAst,
    pub permutations: Vec<Permutation>,
}

impl Precompilation {
    pub fn new(ast: UnifiedAst, mut permutations: Vec<Permutation>) -> Precompilation {
        for (id, permutation) in permutations.iter_mut().enumerate() {
            permutation.id = id;
        }
        Precompilation { ast, permutations }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Precompilation> {
        if !path.is_file() {
            return Err(Error::MissingPrecompilation(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::StaticPropertyOracle;
    use crate::compile::JjsOptions;
    use crate::js::ast::JsProgram;
    use std::collections::{BTreeMap, BTreeSet};

    fn permutation(id: usize) -> Permutation {
        Permutation {
            id,
            oracle: StaticPropertyOracle::from_parts(BTreeMap::new(), BTreeMap::new()),
            rebind_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn construction_renumbers_sequentially() {
        let ast = UnifiedAst {
            options: JjsOptions::default(),
            program: JsProgram::new(),
            rebind_requests: BTreeSet::new(),
        };
        let pre = Precompilation::new(ast, vec![permutation(7), permutation(3), permutation(7)]);
        let ids: Vec<usize> = pre.permutations.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn load_without_file_is_the_user_facing_error() {
        let err = Precompilation::load(Path::new("/nonexistent/precompilation.ser")).unwrap_err();
        assert!(err.to_string().contains("please run precompile first"));
    }
}
