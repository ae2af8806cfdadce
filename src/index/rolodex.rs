//! Multi-file loading for external references
//!
//! Files reached through `other.yaml#/pointer` style references are parsed
//! into the same arena as the root document, so every node keeps the file it
//! came from.

use super::{DocumentIndex, NodeId, Reference};
use crate::logging::{self, Logger};
use crate::remote::RemoteLoader;
use crate::resolver::{ResolverWarning, WarningKind};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Upper bound on files pulled in through references
const MAX_FILES: usize = 512;

/// Loader for referenced documents
pub struct Rolodex<'a> {
    allow_remote: bool,
    include_extensions: bool,
    remote: Option<&'a RemoteLoader>,
    logger: &'a Logger,
}

impl<'a> Rolodex<'a> {
    pub fn new(logger: &'a Logger) -> Self {
        Self {
            allow_remote: false,
            include_extensions: false,
            remote: None,
            logger,
        }
    }

    /// Permit `http(s)://` references, fetched with `loader`
    pub fn with_remote(mut self, loader: Option<&'a RemoteLoader>) -> Self {
        self.allow_remote = loader.is_some();
        self.remote = loader;
        self
    }

    pub fn with_extensions(mut self, include: bool) -> Self {
        self.include_extensions = include;
        self
    }

    /// Load every file reachable from the files already in `index`
    pub fn load(&self, index: &mut DocumentIndex) -> Vec<ResolverWarning> {
        let mut warnings = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut scanned = 0;

        while scanned < index.files().len() {
            let upto = index.files().len();
            let refs: Vec<Reference> = index
                .references(self.include_extensions)
                .into_iter()
                .filter(|r| r.file >= scanned && r.file < upto)
                .collect();

            for reference in refs {
                let (file_part, _) = split_reference(&reference.target);
                if file_part.is_empty() {
                    continue;
                }
                let base = index
                    .file(reference.file)
                    .map(|f| f.location.clone())
                    .unwrap_or_default();
                let location = join_location(&base, file_part);
                if index.find_file(&location).is_some() || failed.contains(&location) {
                    continue;
                }
                if index.files().len() >= MAX_FILES {
                    warnings.push(self.warn(
                        index,
                        &reference,
                        WarningKind::UnreachableFile,
                        format!("file limit of {} reached, '{}' not loaded", MAX_FILES, location),
                    ));
                    failed.insert(location);
                    continue;
                }

                let loaded = self
                    .read(&location)
                    .and_then(|(kind, bytes)| {
                        index
                            .add_file(&bytes, &location, &location)
                            .map_err(|e| (kind, e.to_string()))
                    });
                match loaded {
                    Ok(file) => self.logger.debug(
                        logging::RESOLVER,
                        format_args!("loaded referenced file '{}' as #{}", location, file),
                    ),
                    Err((kind, message)) => {
                        warnings.push(self.warn(index, &reference, kind, message));
                        failed.insert(location);
                    }
                }
            }
            scanned = upto;
        }
        warnings
    }

    fn read(&self, location: &str) -> Result<(WarningKind, Vec<u8>), (WarningKind, String)> {
        if is_url(location) {
            if !self.allow_remote {
                return Err((
                    WarningKind::RemoteNotAllowed,
                    format!("remote reference '{}' not allowed", location),
                ));
            }
            let loader = self.remote.ok_or_else(|| {
                (
                    WarningKind::RemoteNotAllowed,
                    format!("no HTTP client available for '{}'", location),
                )
            })?;
            return loader
                .fetch(location)
                .map(|bytes| (WarningKind::UnreachableFile, bytes))
                .map_err(|e| (WarningKind::UnreachableFile, e.to_string()));
        }
        std::fs::read(location)
            .map(|bytes| (WarningKind::UnreachableFile, bytes))
            .map_err(|e| {
                (
                    WarningKind::UnreachableFile,
                    format!("unable to read '{}': {}", location, e),
                )
            })
    }

    fn warn(
        &self,
        index: &DocumentIndex,
        reference: &Reference,
        kind: WarningKind,
        message: String,
    ) -> ResolverWarning {
        self.logger
            .warn(logging::RESOLVER, format_args!("{}", message));
        ResolverWarning {
            kind,
            reference: reference.target.clone(),
            file: index
                .file(reference.file)
                .map(|f| f.location.clone())
                .unwrap_or_default(),
            line: reference.line,
            column: reference.column,
            message,
        }
    }
}

/// Split `file#/pointer` into its file and pointer parts
pub fn split_reference(target: &str) -> (&str, &str) {
    match target.split_once('#') {
        Some((file, pointer)) => (file, pointer),
        None => (target, ""),
    }
}

pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolve `relative` against the location of the referencing file
pub fn join_location(base: &str, relative: &str) -> String {
    if is_url(relative) {
        return relative.to_string();
    }
    if is_url(base) {
        return url::Url::parse(base)
            .and_then(|u| u.join(relative))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| relative.to_string());
    }
    let relative_path = Path::new(relative);
    let joined = if relative_path.is_absolute() {
        relative_path.to_path_buf()
    } else {
        Path::new(base)
            .parent()
            .unwrap_or(Path::new(""))
            .join(relative_path)
    };
    normalize(&joined).to_string_lossy().replace('\\', "/")
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Find the definition a reference points at.
///
/// Returns the definition key (`location#pointer`) and the target node.
pub fn locate(index: &DocumentIndex, reference: &Reference) -> Result<(String, NodeId), String> {
    let (file_part, pointer) = split_reference(&reference.target);
    let file = if file_part.is_empty() {
        reference.file
    } else {
        let base = index
            .file(reference.file)
            .map(|f| f.location.as_str())
            .unwrap_or("");
        let location = join_location(base, file_part);
        index
            .find_file(&location)
            .ok_or_else(|| format!("referenced file '{}' is not available", location))?
    };
    let source = index
        .file(file)
        .ok_or_else(|| format!("unknown file #{}", file))?;
    let node = if pointer.is_empty() || pointer == "/" {
        Some(source.root)
    } else {
        index.resolve_pointer(file, pointer)
    };
    node.map(|n| (format!("{}#{}", source.location, pointer), n))
        .ok_or_else(|| {
            format!(
                "cannot resolve reference '{}', target not found",
                reference.target
            )
        })
}
