//! Resolution of include and file-reference paths.
//!
//! A path is either plain (relative to the including document) or carries an alias
//! prefix such as `data:` or `art:` that selects a set of search directories.

use bab_common::{BuildError, BuildResult, ErrorCode};
use bab_config::PathSettings;
use std::path::{Component, Path, PathBuf};

/// Resolves logical paths against the configured search directories.
#[derive(Debug, Clone)]
pub struct PathResolver {
    data_root: Option<PathBuf>,
    data_paths: Vec<String>,
    art_paths: Vec<String>,
    audio_paths: Vec<String>,
    postfix: String,
}

/// Lexically removes `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
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

impl PathResolver {
    /// A resolver over `paths`. `postfix` selects art variants.
    pub fn new(paths: &PathSettings, postfix: &str) -> Self {
        Self {
            data_root: paths.data_root.clone(),
            data_paths: paths.data_paths.clone(),
            art_paths: paths.art_paths.clone(),
            audio_paths: paths.audio_paths.clone(),
            postfix: postfix.to_string(),
        }
    }

    /// Resolves `target` as written in a document located in `base_dir`.
    pub fn resolve(&self, base_dir: &Path, target: &str) -> BuildResult<PathBuf> {
        let target = target.trim();
        if Path::new(target).has_root() {
            return Ok(PathBuf::from(target));
        }
        let parts: Vec<&str> = target.split(':').collect();
        match parts.as_slice() {
            [plain] => Ok(normalize(&base_dir.join(plain))),
            [alias, rest] => self.resolve_alias(base_dir, alias, rest, target),
            _ => Err(BuildError::new(
                ErrorCode::IllegalPath,
                format!(
                    "An illegal path {target} is used as a reference to another asset or document."
                ),
            )),
        }
    }

    fn resolve_alias(&self, base_dir: &Path, alias: &str, rest: &str, target: &str) -> BuildResult<PathBuf> {
        match alias.to_ascii_lowercase().as_str() {
            "data" => Ok(search(&self.data_paths, base_dir, rest)),
            "audio" => Ok(search(&self.audio_paths, base_dir, rest)),
            "art" => Ok(self.resolve_art(base_dir, rest)),
            "root" => match &self.data_root {
                Some(root) => Ok(normalize(&root.join(rest))),
                None => Err(BuildError::new(
                    ErrorCode::NoDataRootSpecified,
                    format!("DataRoot must be specified to resolve {target}."),
                )),
            },
            _ => Err(BuildError::new(
                ErrorCode::IllegalPathAlias,
                format!("An illegal alias {alias} is used in path {target}."),
            )),
        }
    }

    /// Bare art file names live in a subdirectory named after their first two letters.
    fn resolve_art(&self, base_dir: &Path, rest: &str) -> PathBuf {
        if rest.contains(['/', '\\']) || rest.chars().count() < 2 {
            return search(&self.art_paths, base_dir, rest);
        }
        let prefix: String = rest.chars().take(2).collect();
        let file = Path::new(rest);
        let variant = match (file.file_stem(), self.postfix.is_empty()) {
            (Some(stem), false) => {
                let ext = file
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                Some(format!("{}_{}{ext}", stem.to_string_lossy(), self.postfix))
            }
            _ => None,
        };
        let mut first = None;
        for dir in candidates(&self.art_paths, base_dir) {
            let dir = dir.join(&prefix);
            if let Some(variant) = &variant {
                let path = normalize(&dir.join(variant));
                if path.is_file() {
                    return path;
                }
            }
            let path = normalize(&dir.join(rest));
            if path.exists() {
                return path;
            }
            first.get_or_insert(path);
        }
        first.unwrap_or_else(|| normalize(&base_dir.join(rest)))
    }

    /// The search root that contains `path`, compared case-insensitively.
    pub fn data_root_of(&self, path: &Path) -> Option<PathBuf> {
        let lowered = path.to_string_lossy().to_lowercase();
        self.data_root
            .iter()
            .cloned()
            .chain(
                self.data_paths
                    .iter()
                    .filter(|p| p.as_str() != "*")
                    .map(PathBuf::from),
            )
            .find(|root| {
                let root = root.to_string_lossy().to_lowercase();
                !root.is_empty()
                    && lowered.starts_with(&root)
                    && lowered[root.len()..].starts_with(['/', '\\'])
            })
    }

    /// `path` without extension, relative to its data root when it has one.
    pub fn path_from_root(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(root) = self.data_root_of(path) else {
            return stem;
        };
        let text = path.to_string_lossy();
        let root_len = root.to_string_lossy().len();
        let relative = Path::new(text[root_len..].trim_start_matches(['/', '\\']));
        match relative.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.join(&stem).to_string_lossy().into_owned(),
            None => stem,
        }
    }

    /// The manifest a stream rooted at `path` is expected to produce.
    pub fn expected_output_manifest(&self, path: &Path) -> String {
        format!("{}.manifest", self.path_from_root(path))
    }
}

fn candidates<'a>(paths: &'a [String], base_dir: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
    paths.iter().map(move |p| {
        if p == "*" {
            base_dir.to_path_buf()
        } else {
            PathBuf::from(p)
        }
    })
}

/// First existing `dir/rest` over `paths`; the first candidate if none exists.
fn search(paths: &[String], base_dir: &Path, rest: &str) -> PathBuf {
    let all: Vec<PathBuf> = candidates(paths, base_dir)
        .map(|dir| normalize(&dir.join(rest)))
        .collect();
    if all.len() > 1 {
        if let Some(found) = all.iter().find(|p| p.exists()) {
            return found.clone();
        }
    }
    all.into_iter()
        .next()
        .unwrap_or_else(|| normalize(&base_dir.join(rest)))
}
