//! Discover script functions in a directory

use super::{ScriptError, ScriptFunction};
use crate::functions::RuleFunction;
use crate::logging::{Logger, SCRIPT};
use glob::glob;
use std::path::Path;
use std::sync::Arc;

/// File extension of script functions
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Load every `*.rhai` file directly inside `dir`.
///
/// A script that fails to compile or lacks `run_rule` is logged and
/// skipped. Two scripts claiming the same name keep the first one found,
/// in file name order.
pub fn load_functions(
    dir: &Path,
    logger: &Logger,
) -> Result<Vec<Arc<dyn RuleFunction>>, ScriptError> {
    if !dir.is_dir() {
        return Err(ScriptError::Io {
            path: dir.display().to_string(),
            message: "not a directory".into(),
        });
    }

    let pattern = dir.join(format!("*.{}", SCRIPT_EXTENSION));
    let pattern = pattern.to_string_lossy();
    let entries = glob(&pattern).map_err(|e| ScriptError::Io {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut paths: Vec<_> = entries.filter_map(Result::ok).collect();
    paths.sort();

    let mut functions: Vec<Arc<dyn RuleFunction>> = Vec::new();
    for path in paths {
        match ScriptFunction::from_file(&path) {
            Ok(function) => {
                if functions.iter().any(|f| f.name() == function.name()) {
                    logger.warn(
                        SCRIPT,
                        format_args!(
                            "skipping {}: function '{}' is already defined",
                            path.display(),
                            function.name()
                        ),
                    );
                    continue;
                }
                logger.debug(
                    SCRIPT,
                    format_args!("loaded function '{}' from {}", function.name(), path.display()),
                );
                functions.push(Arc::new(function));
            }
            Err(e) => {
                logger.warn(SCRIPT, format_args!("skipping {}: {}", path.display(), e));
            }
        }
    }

    logger.info(
        SCRIPT,
        format_args!("loaded {} script function(s) from {}", functions.len(), dir.display()),
    );
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("check_title.rhai"),
            "fn run_rule(input, context) { [] }",
        )
        .unwrap();
        fs::write(
            dir.path().join("named.rhai"),
            r#"
                fn get_schema() { #{ name: "ownerKnown" } }
                fn run_rule(input, context) { [] }
            "#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.rhai"), "fn run_rule(").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let functions = load_functions(dir.path(), &Logger::silent()).unwrap();
        let mut names: Vec<&str> = functions.iter().map(|f| f.name()).collect();
        names.sort();
        assert_eq!(names, vec!["check_title", "ownerKnown"]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let dir = TempDir::new().unwrap();
        let script = r#"
            fn get_schema() { #{ name: "same" } }
            fn run_rule(input, context) { [] }
        "#;
        fs::write(dir.path().join("a.rhai"), script).unwrap();
        fs::write(dir.path().join("b.rhai"), script).unwrap();
        let functions = load_functions(dir.path(), &Logger::silent()).unwrap();
        assert_eq!(functions.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let err = load_functions(Path::new("/no/such/dir"), &Logger::silent()).err();
        assert!(matches!(err, Some(ScriptError::Io { .. })));
    }
}
