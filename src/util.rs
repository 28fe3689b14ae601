use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Canonical forward-slash form of a path. Backslashes become forward
/// slashes, a Windows drive letter is lowercased, redundant and `.` segments
/// collapse. `..` is kept verbatim: resolving it would touch the filesystem,
/// and this form feeds hashes that must not depend on symlink layout.
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut parts = Vec::new();
    let mut prefix = String::new();
    for comp in Path::new(&raw).components() {
        match comp {
            Component::Prefix(p) => {
                let text = p.as_os_str().to_string_lossy().replace('\\', "/");
                prefix = lowercase_drive(&text);
            }
            Component::RootDir => {}
            Component::CurDir => {}
            Component::ParentDir => parts.push("..".to_string()),
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
        }
    }
    let is_abs = raw.starts_with('/') || !prefix.is_empty();
    let joined = parts.join("/");
    if is_abs {
        format!("{prefix}/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

fn lowercase_drive(prefix: &str) -> String {
    let bytes = prefix.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let mut out = prefix.to_string();
        out.replace_range(..1, &prefix[..1].to_ascii_lowercase());
        out
    } else {
        prefix.to_string()
    }
}

/// True iff the realpath of `path` is equal to or below the realpath of
/// `root`. Resolvers use this to discard out-of-root results, so symlinks
/// and `..` segments are resolved here and only here.
pub fn contains(root: &Path, path: &Path) -> bool {
    let root = match fs::canonicalize(root) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let path = match fs::canonicalize(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    path.starts_with(&root)
}

pub fn normalize_rel_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("strip prefix {} from {}", root.display(), path.display()))?;
    Ok(rel
        .components()
        .filter_map(|comp| match comp {
            Component::Normal(os) => Some(os.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/"))
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// 32-hex-char identity prefix shared by chunk ids, project ids, and cache
/// keys.
pub fn short_hash(data: &str) -> String {
    let mut hex = sha256_hex(data.as_bytes());
    hex.truncate(32);
    hex
}

/// Stable project identifier derived from the normalized absolute root.
pub fn project_id(root: &Path) -> String {
    let abs = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    short_hash(&normalize_path(&abs))
}

/// Chunk identity: filename, declared name, and start line pin a chunk
/// across runs as long as none of the three move.
pub fn chunk_id(filename: &str, symbol_name: &str, start_line: i64) -> String {
    short_hash(&format!("{filename}:{symbol_name}:{start_line}"))
}

pub fn to_abs_path(root: &Path, rel: &str) -> PathBuf {
    root.join(rel)
}

/// Collapse runs of whitespace to single spaces; used for signatures.
pub fn squash_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let cases = ["/a/b//c/./d", "C:\\Work\\proj", "a/./b", "/x/../y"];
        for case in cases {
            let once = normalize_path(Path::new(case));
            let twice = normalize_path(Path::new(&once));
            assert_eq!(once, twice, "case {case}");
        }
    }

    #[test]
    fn normalize_lowercases_drive() {
        let value = normalize_path(Path::new("C:\\Users\\dev\\proj"));
        assert!(value.starts_with("c:/"), "{value}");
    }

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_path(Path::new("/a//b/./c")), "/a/b/c");
    }

    #[test]
    fn normalize_keeps_parent_segments() {
        assert_eq!(normalize_path(Path::new("/a/../b")), "/a/../b");
    }

    #[test]
    fn contains_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("src");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("main.py"), "x = 1\n").unwrap();
        assert!(contains(dir.path(), &inner.join("main.py")));
        assert!(!contains(&inner, dir.path()));
    }

    #[test]
    fn chunk_id_is_stable() {
        let a = chunk_id("src/auth.py", "verify_token", 12);
        let b = chunk_id("src/auth.py", "verify_token", 12);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, chunk_id("src/auth.py", "verify_token", 13));
    }

    #[test]
    fn squash_whitespace_flattens() {
        assert_eq!(squash_whitespace("def  foo(a,\n        b)"), "def foo(a, b)");
    }
}
