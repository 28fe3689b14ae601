use crate::resolve::ImportResolver;
use std::path::{Path, PathBuf};

/// Python import resolution. Relative specifiers walk up from the source
/// file's package directory by dot count; absolute specifiers descend from
/// the project root and its conventional source heads. Candidate modules
/// try `<name>.py` first, then `<name>/__init__.py`.
pub struct PythonResolver;

impl ImportResolver for PythonResolver {
    fn resolve(
        &self,
        import_string: &str,
        source_file: &Path,
        project_root: &Path,
    ) -> Option<PathBuf> {
        let spec = import_string.trim();
        if spec.is_empty() || spec.contains('*') {
            return None;
        }
        if spec.starts_with('.') {
            resolve_relative(spec, source_file)
        } else {
            resolve_absolute(spec, project_root)
        }
    }
}

fn resolve_relative(spec: &str, source_file: &Path) -> Option<PathBuf> {
    let dot_count = spec.chars().take_while(|ch| *ch == '.').count();
    let rest = &spec[dot_count..];

    // one dot is the current package; each extra dot ascends one level
    let mut base = source_file.parent()?.to_path_buf();
    for _ in 1..dot_count {
        base = base.parent()?.to_path_buf();
    }

    if rest.is_empty() {
        let init = base.join("__init__.py");
        return init.is_file().then_some(init);
    }
    descend(&base, rest)
}

fn resolve_absolute(spec: &str, project_root: &Path) -> Option<PathBuf> {
    // search heads: the root itself plus conventional source roots
    for head in [
        project_root.to_path_buf(),
        project_root.join("src"),
        project_root.join("lib"),
    ] {
        if let Some(found) = descend(&head, spec) {
            return Some(found);
        }
    }
    None
}

fn descend(base: &Path, dotted: &str) -> Option<PathBuf> {
    let parts: Vec<&str> = dotted.split('.').filter(|part| !part.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }
    let mut current = base.to_path_buf();
    for (idx, part) in parts.iter().enumerate() {
        let is_last = idx == parts.len() - 1;
        if is_last {
            let module = current.join(format!("{part}.py"));
            if module.is_file() {
                return Some(module);
            }
            let package_init = current.join(part).join("__init__.py");
            if package_init.is_file() {
                return Some(package_init);
            }
            return None;
        }
        current = current.join(part);
        if !current.is_dir() {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/utils.py"), "def helper(): pass\n").unwrap();
        fs::write(root.join("pkg/sub/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/sub/deep.py"), "").unwrap();
        (dir, root)
    }

    #[test]
    fn relative_single_dot() {
        let (_dir, root) = project();
        let resolved = PythonResolver
            .resolve(".utils", &root.join("pkg/sub/deep.py"), &root)
            .map(|p| p.file_name().unwrap().to_os_string());
        // one dot stays in pkg/sub, where utils.py does not exist
        assert_eq!(resolved, None);
        let resolved = PythonResolver.resolve(".deep", &root.join("pkg/sub/__init__.py"), &root);
        assert_eq!(resolved, Some(root.join("pkg/sub/deep.py")));
    }

    #[test]
    fn relative_double_dot_ascends() {
        let (_dir, root) = project();
        let resolved = PythonResolver.resolve("..utils", &root.join("pkg/sub/deep.py"), &root);
        assert_eq!(resolved, Some(root.join("pkg/utils.py")));
    }

    #[test]
    fn absolute_from_project_root() {
        let (_dir, root) = project();
        assert_eq!(
            PythonResolver.resolve("pkg.utils", &root.join("main.py"), &root),
            Some(root.join("pkg/utils.py"))
        );
        assert_eq!(
            PythonResolver.resolve("pkg", &root.join("main.py"), &root),
            Some(root.join("pkg/__init__.py"))
        );
        assert_eq!(
            PythonResolver.resolve("pkg.sub", &root.join("main.py"), &root),
            Some(root.join("pkg/sub/__init__.py"))
        );
    }

    #[test]
    fn external_packages_are_unresolved() {
        let (_dir, root) = project();
        assert_eq!(PythonResolver.resolve("os", &root.join("main.py"), &root), None);
        assert_eq!(
            PythonResolver.resolve("fastapi.routing", &root.join("main.py"), &root),
            None
        );
    }
}
