//! # Script Bundles
//!
//! Name-keyed sources handed to an embedded interpreter at startup.
//!
//! A bundle is either assembled in code (for sources embedded with
//! `include_str!`) or collected from a directory tree. Entries are integrated
//! in name order and integration stops at the first failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{BoxError, IntegrateError, Result};

/// Directory names skipped while collecting
const IGNORED_DIRS: &[&str] = &[".svn", ".git", ".hg"];

/// Hook that loads one script source into a runtime.
pub trait Interpreter {
    fn integrate(&mut self, name: &str, source: &str) -> std::result::Result<(), BoxError>;
}

impl<F> Interpreter for F
where
    F: FnMut(&str, &str) -> std::result::Result<(), BoxError>,
{
    fn integrate(&mut self, name: &str, source: &str) -> std::result::Result<(), BoxError> {
        self(name, source)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBundle {
    scripts: BTreeMap<String, String>,
}

impl ScriptBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the source stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        if self.scripts.insert(name.clone(), source.into()).is_some() {
            warn!(script = %name, "Script replaced in bundle");
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    /// Names in integration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.scripts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Collect every file under `root` whose extension matches `extension`
    /// (case-insensitive, without the dot).
    ///
    /// Entries are keyed by file name; line endings are normalized to `\n`.
    pub fn collect_dir(root: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let mut bundle = Self::new();
        bundle.walk(root.as_ref(), extension)?;
        info!(root = %root.as_ref().display(), scripts = bundle.len(), "Collected script bundle");
        Ok(bundle)
    }

    fn walk(&mut self, dir: &Path, extension: &str) -> Result<()> {
        let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                if !IGNORED_DIRS.contains(&file_name.as_str()) {
                    self.walk(&path, extension)?;
                }
                continue;
            }

            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if !matches {
                continue;
            }

            let source = fs::read_to_string(&path)?.replace("\r\n", "\n");
            debug!(script = %file_name, path = %path.display(), "Collected script");
            self.insert(file_name, source);
        }
        Ok(())
    }
}

/// Feed every script in `bundle` to `interpreter`, in name order.
///
/// Returns the number integrated, or the first failure with its name.
pub fn integrate_all<I>(
    bundle: &ScriptBundle,
    interpreter: &mut I,
) -> std::result::Result<usize, IntegrateError>
where
    I: Interpreter + ?Sized,
{
    let mut integrated = 0;
    for (name, source) in &bundle.scripts {
        interpreter
            .integrate(name, source)
            .map_err(|source| IntegrateError {
                name: name.clone(),
                source,
            })?;
        integrated += 1;
    }
    debug!(integrated, "Script bundle integrated");
    Ok(integrated)
}
