use crate::util;
use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: std::path::PathBuf,
    pub hash: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

/// Directories never indexed regardless of user globs; dot-directories are
/// filtered separately.
const DEFAULT_IGNORE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    "target",
    "build",
    "dist",
];

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    LanguageSpec {
        name: "typescript",
        extensions: &["ts", "mts", "cts"],
    },
    LanguageSpec {
        name: "tsx",
        extensions: &["tsx"],
    },
    LanguageSpec {
        name: "go",
        extensions: &["go"],
    },
    LanguageSpec {
        name: "rust",
        extensions: &["rs"],
    },
    LanguageSpec {
        name: "java",
        extensions: &["java"],
    },
    LanguageSpec {
        name: "cpp",
        extensions: &["cpp", "cc", "cxx", "hpp", "hh", "c", "h"],
    },
    LanguageSpec {
        name: "dart",
        extensions: &["dart"],
    },
    LanguageSpec {
        name: "sql",
        extensions: &["sql"],
    },
    LanguageSpec {
        name: "html",
        extensions: &["html", "htm"],
    },
    LanguageSpec {
        name: "css",
        extensions: &["css", "scss"],
    },
    LanguageSpec {
        name: "firestore",
        extensions: &["rules"],
    },
    LanguageSpec {
        name: "markdown",
        extensions: &["md", "markdown", "mdx"],
    },
];

pub fn language_specs() -> &'static [LanguageSpec] {
    LANGUAGE_SPECS
}

pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    let ext = ext.to_ascii_lowercase();
    LANGUAGE_SPECS
        .iter()
        .find(|spec| spec.extensions.iter().any(|candidate| *candidate == ext))
        .map(|spec| spec.name)
}

/// Gitignore-style include/exclude scope. Exclude always wins; an empty
/// include set admits everything. Patterns without a leading `/` match
/// anywhere in the tree.
#[derive(Debug)]
pub struct ScopeFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl ScopeFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn empty() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    pub fn allows(&self, rel_path: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(rel_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    let mut added = false;
    for pattern in patterns {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            continue;
        }
        added = true;
        match trimmed.strip_prefix('/') {
            Some(anchored) => add_glob(&mut builder, anchored)?,
            None => {
                add_glob(&mut builder, trimmed)?;
                add_glob(&mut builder, &format!("**/{trimmed}"))?;
            }
        }
    }
    if !added {
        return Ok(None);
    }
    Ok(Some(builder.build()?))
}

fn add_glob(builder: &mut GlobSetBuilder, pattern: &str) -> Result<()> {
    builder.add(
        GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob {pattern:?}"))?,
    );
    Ok(())
}

/// Walk the project, hash every supported file, and apply the scope
/// filter. Output is sorted by relative path so downstream passes are
/// deterministic.
pub fn scan_project(root: &Path, scope: &ScopeFilter) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .ignore(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(true)
        {
            continue;
        }
        let Some(language) = detect_language(path) else {
            continue;
        };
        let Ok(rel_path) = util::normalize_rel_path(root, path) else {
            continue;
        };
        if !scope.allows(&rel_path) {
            continue;
        }
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash: util::sha256_hex(&bytes),
            language: language.to_string(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    if !entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
        return false;
    }
    if DEFAULT_IGNORE_DIRS
        .iter()
        .any(|dir| OsStr::new(dir) == entry.file_name())
    {
        return true;
    }
    let Some(name) = entry.file_name().to_str() else {
        return true;
    };
    // dot-directories are never indexed; depth 0 is the walk root itself
    name.starts_with('.') && entry.depth() > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_skips_default_ignores_and_dotdirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::create_dir_all(root.join(".idea")).unwrap();
        fs::write(root.join("src/main.py"), "def f(): pass\n").unwrap();
        fs::write(root.join("node_modules/lib/x.js"), "var a = 1;\n").unwrap();
        fs::write(root.join(".idea/conf.py"), "x = 1\n").unwrap();
        fs::write(root.join("notes.txt"), "not code\n").unwrap();

        let files = scan_project(root, &ScopeFilter::empty()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.py"]);
    }

    #[test]
    fn hash_is_stable_for_unchanged_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "x = 1\n").unwrap();
        let first = scan_project(root, &ScopeFilter::empty()).unwrap();
        let second = scan_project(root, &ScopeFilter::empty()).unwrap();
        assert_eq!(first[0].hash, second[0].hash);
    }

    #[test]
    fn exclude_wins_over_include() {
        let scope = ScopeFilter::new(
            &["src/**".to_string()],
            &["src/generated/**".to_string()],
        )
        .unwrap();
        assert!(scope.allows("src/main.py"));
        assert!(!scope.allows("src/generated/pb.py"));
        assert!(!scope.allows("docs/readme.md"));
    }

    #[test]
    fn unanchored_pattern_matches_anywhere() {
        let scope = ScopeFilter::new(&[], &["tests/**".to_string()]).unwrap();
        assert!(!scope.allows("tests/test_auth.py"));
        assert!(!scope.allows("pkg/tests/test_x.py"));
        assert!(scope.allows("src/auth.py"));

        let anchored = ScopeFilter::new(&[], &["/tests/**".to_string()]).unwrap();
        assert!(!anchored.allows("tests/test_auth.py"));
        assert!(anchored.allows("pkg/tests/test_x.py"));
    }

    #[test]
    fn language_detection_by_extension() {
        assert_eq!(detect_language(Path::new("a/b.py")), Some("python"));
        assert_eq!(detect_language(Path::new("x.tsx")), Some("tsx"));
        assert_eq!(
            detect_language(Path::new("firestore.rules")),
            Some("firestore")
        );
        assert_eq!(detect_language(Path::new("x.bin")), None);
    }
}
