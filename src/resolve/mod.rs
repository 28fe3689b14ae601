use crate::util;
use std::path::{Path, PathBuf};

pub mod dart;
pub mod javascript;
pub mod python;

/// Maps an import string found in `source_file` to a project-root-relative
/// file path. Resolution failures and external packages are `None`, never
/// errors: an unresolved import simply records no edge.
pub trait ImportResolver {
    fn resolve(&self, import_string: &str, source_file: &Path, project_root: &Path)
        -> Option<PathBuf>;
}

pub struct Resolvers {
    python: python::PythonResolver,
    javascript: javascript::JsResolver,
    dart: dart::DartResolver,
}

impl Resolvers {
    pub fn new() -> Self {
        Self {
            python: python::PythonResolver,
            javascript: javascript::JsResolver,
            dart: dart::DartResolver,
        }
    }

    /// Resolve and gate: any candidate outside the realpath of the project
    /// root is discarded here, so a hostile `../../../../etc/passwd`
    /// specifier can never produce an edge.
    pub fn resolve(
        &self,
        language: &str,
        import_string: &str,
        source_file: &Path,
        project_root: &Path,
    ) -> Option<String> {
        let resolver: &dyn ImportResolver = match language {
            "python" => &self.python,
            "javascript" | "typescript" | "tsx" => &self.javascript,
            "dart" => &self.dart,
            _ => return None,
        };
        let resolved = resolver.resolve(import_string, source_file, project_root)?;
        if !util::contains(project_root, &resolved) {
            return None;
        }
        let canonical = std::fs::canonicalize(&resolved).ok()?;
        let root = std::fs::canonicalize(project_root).ok()?;
        util::normalize_rel_path(&root, &canonical).ok()
    }
}

impl Default for Resolvers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn out_of_root_results_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.js"), "import x from '../../outside';\n").unwrap();
        fs::write(dir.path().join("outside.js"), "export default 1;\n").unwrap();

        let resolvers = Resolvers::new();
        let resolved = resolvers.resolve(
            "javascript",
            "../../outside",
            &root.join("src/app.js"),
            &root,
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn traversal_attack_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("app.js"), "").unwrap();

        let resolvers = Resolvers::new();
        assert_eq!(
            resolvers.resolve(
                "javascript",
                "../../../../etc/passwd",
                &root.join("app.js"),
                &root,
            ),
            None
        );
    }
}
