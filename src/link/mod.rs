//! The link stage: assembles per-permutation payloads, static resources,
//! and the runtime selection script into the deployable output tree.
//!
//! Link is all-or-nothing. Every permutation file is read back before any
//! output path is touched, and both output directories are deleted and
//! recreated, so a failed run never leaves a stale tree that looks
//! complete.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::cfg::ModuleDef;
use crate::compile::{permutation_file_name, Precompilation, PRECOMPILATION_FILE};
use crate::error::{Error, Result};

/// Where an artifact lands: `Public` under `<out>/<module>/`, `Private`
/// under `<out>/<module>-aux/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub visibility: Visibility,
    pub partial_path: String,
    pub data: Vec<u8>,
}

/// The set of files one link run emits, accumulated before anything is
/// written.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new() -> ArtifactSet {
        ArtifactSet::default()
    }

    pub fn add(&mut self, visibility: Visibility, partial_path: &str, data: Vec<u8>) {
        self.artifacts.push(Artifact {
            visibility,
            partial_path: partial_path.to_string(),
            data,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }
}

/// One permutation's compiled payload read back from the work directory,
/// with the property values it was compiled for.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub permutation_id: usize,
    pub js: String,
    pub properties: BTreeMap<String, String>,
}

/// Links `<work>/<module>/` into `<out>/<module>/` and
/// `<out>/<module>-aux/`.
pub fn link(module: &ModuleDef, work_dir: &Path, out_dir: &Path) -> Result<()> {
    let module_work_dir = work_dir.join(&module.name);
    let precompilation = Precompilation::load(&module_work_dir.join(PRECOMPILATION_FILE))?;
    let results = read_results(&precompilation, &module_work_dir)?;
    let artifacts = assemble(module, &precompilation, &results)?;

    let public_dir = out_dir.join(&module.name);
    let private_dir = out_dir.join(format!("{}-aux", module.name));
    recreate_dir(&public_dir)?;
    recreate_dir(&private_dir)?;
    for artifact in artifacts.iter() {
        let root = match artifact.visibility {
            Visibility::Public => &public_dir,
            Visibility::Private => &private_dir,
        };
        let path = root.join(&artifact.partial_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &artifact.data)?;
        debug!("linked {}", path.display());
    }
    info!(
        "linked module '{}': {} permutations into {}",
        module.name,
        results.len(),
        public_dir.display()
    );
    Ok(())
}

/// Reads every permutation payload back. Any missing file is fatal here,
/// before a single output path exists.
fn read_results(
    precompilation: &Precompilation,
    module_work_dir: &Path,
) -> Result<Vec<CompilationResult>> {
    let mut results = Vec::with_capacity(precompilation.permutations.len());
    for permutation in &precompilation.permutations {
        let path = module_work_dir.join(permutation_file_name(permutation.id));
        if !path.is_file() {
            return Err(Error::MissingPermutationFile(path));
        }
        results.push(CompilationResult {
            permutation_id: permutation.id,
            js: fs::read_to_string(&path)?,
            properties: permutation.oracle.values().clone(),
        });
    }
    Ok(results)
}

/// Builds the full artifact set in memory: one `<N>.cache.js` per
/// permutation, the selection script, the public resources, and the aux
/// permutation table.
pub fn assemble(
    module: &ModuleDef,
    precompilation: &Precompilation,
    results: &[CompilationResult],
) -> Result<ArtifactSet> {
    if results.len() != precompilation.permutations.len() {
        return Err(Error::Link(format!(
            "have {} compilation results for {} permutations",
            results.len(),
            precompilation.permutations.len()
        )));
    }
    let mut artifacts = ArtifactSet::new();
    for result in results {
        artifacts.add(
            Visibility::Public,
            &format!("{}.cache.js", result.permutation_id),
            result.js.clone().into_bytes(),
        );
    }
    artifacts.add(
        Visibility::Public,
        &format!("{}.nocache.js", module.name),
        selection_script(module, results).into_bytes(),
    );
    for (partial_path, full_path) in module.public_paths() {
        let data = fs::read(&full_path).map_err(|e| {
            Error::Link(format!(
                "public resource {} unreadable: {}",
                full_path.display(),
                e
            ))
        })?;
        artifacts.add(Visibility::Public, &partial_path, data);
    }
    artifacts.add(
        Visibility::Private,
        "permutation-map.txt",
        permutation_map(results).into_bytes(),
    );
    Ok(artifacts)
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// The runtime dispatcher. Each permutation entry carries only the
/// unbound properties (those with more than one allowed value overall);
/// statically-bound properties never participate in dispatch. Client
/// values come from `window["permjs:properties"]`, with declared
/// fallbacks filling the gaps.
pub fn selection_script(module: &ModuleDef, results: &[CompilationResult]) -> String {
    let unbound = module.unbound_properties();
    let mut fallbacks = String::new();
    for (i, (name, fallback)) in unbound
        .iter()
        .filter_map(|p| p.fallback.as_ref().map(|f| (&p.name, f)))
        .enumerate()
    {
        if i > 0 {
            fallbacks.push(',');
        }
        let _ = write!(fallbacks, "{}:{}", js_string(name), js_string(fallback));
    }
    let mut entries = String::new();
    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            entries.push(',');
        }
        let mut answer = String::new();
        for (j, prop) in unbound.iter().enumerate() {
            if j > 0 {
                answer.push(',');
            }
            let value = result
                .properties
                .get(&prop.name)
                .map(String::as_str)
                .unwrap_or("");
            let _ = write!(answer, "{}:{}", js_string(&prop.name), js_string(value));
        }
        let _ = write!(entries, "[{},{{{}}}]", result.permutation_id, answer);
    }
    format!(
        "(function(){{\n\
         var provided=window[\"permjs:properties\"]||{{}};\n\
         var fallbacks={{{fallbacks}}};\n\
         var answers=[{entries}];\n\
         function value(name){{var v=provided[name];return v==null?fallbacks[name]:v;}}\n\
         for(var i=0;i<answers.length;i++){{\n\
         var match=true,props=answers[i][1];\n\
         for(var name in props){{if(props[name]!=value(name)){{match=false;break;}}}}\n\
         if(match){{document.write('<script src=\"'+answers[i][0]+'.cache.js\"><\\/script>');return;}}\n\
         }}\n\
         }})();\n",
        fallbacks = fallbacks,
        entries = entries,
    )
}

/// Aux permutation table: one line per permutation, `<id> key=value,...`
/// over the full bound property set.
fn permutation_map(results: &[CompilationResult]) -> String {
    let mut out = String::new();
    for result in results {
        let _ = write!(out, "{}", result.permutation_id);
        for (i, (name, value)) in result.properties.iter().enumerate() {
            out.push(if i == 0 { ' ' } else { ',' });
            let _ = write!(out, "{}={}", name, value);
        }
        out.push('\n');
    }
    out
}

fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn showcase() -> ModuleDef {
        ModuleDef::parse(
            r#"
            name = "showcase"
            sources = ["showcase.js"]
            [[property]]
            name = "user.agent"
            values = ["ie6", "gecko"]
            fallback = "gecko"
            [[property]]
            name = "locale"
            values = ["en"]
        "#,
            Path::new("."),
        )
        .unwrap()
    }

    fn result(id: usize, agent: &str) -> CompilationResult {
        let mut properties = BTreeMap::new();
        properties.insert("user.agent".to_string(), agent.to_string());
        properties.insert("locale".to_string(), "en".to_string());
        CompilationResult {
            permutation_id: id,
            js: String::new(),
            properties,
        }
    }

    #[test]
    fn selection_script_uses_only_unbound_properties() {
        let module = showcase();
        let script = selection_script(&module, &[result(0, "ie6"), result(1, "gecko")]);
        assert!(script.contains("window[\"permjs:properties\"]"));
        assert!(script.contains("[0,{\"user.agent\":\"ie6\"}]"));
        assert!(script.contains("[1,{\"user.agent\":\"gecko\"}]"));
        assert!(script.contains("var fallbacks={\"user.agent\":\"gecko\"}"));
        // locale has only one allowed value; it never reaches dispatch
        assert!(!script.contains("locale"));
    }

    #[test]
    fn permutation_map_lists_full_bindings() {
        let map = permutation_map(&[result(0, "ie6")]);
        assert_eq!(map, "0 locale=en,user.agent=ie6\n");
    }
}
