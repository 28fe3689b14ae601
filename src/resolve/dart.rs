use crate::resolve::ImportResolver;
use std::path::{Path, PathBuf};

/// Dart resolution: `package:` imports map through the project's own
/// pubspec name (or the package_config table) into `lib/`; plain
/// specifiers resolve relative to the importing file. `dart:` core
/// libraries are external by definition.
pub struct DartResolver;

impl ImportResolver for DartResolver {
    fn resolve(
        &self,
        import_string: &str,
        source_file: &Path,
        project_root: &Path,
    ) -> Option<PathBuf> {
        let spec = import_string.trim();
        if spec.is_empty() || spec.starts_with("dart:") {
            return None;
        }
        if let Some(rest) = spec.strip_prefix("package:") {
            return resolve_package(rest, project_root);
        }
        let candidate = source_file.parent()?.join(spec);
        candidate.is_file().then_some(candidate)
    }
}

fn resolve_package(rest: &str, project_root: &Path) -> Option<PathBuf> {
    let (package, rel_path) = rest.split_once('/')?;
    if let Some(own) = pubspec_name(project_root) {
        if own == package {
            let candidate = project_root.join("lib").join(rel_path);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    // package_config maps dependency names to their on-disk roots; only
    // in-project roots survive the containment gate later
    if let Some(package_root) = package_config_root(project_root, package) {
        let candidate = package_root.join("lib").join(rel_path);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn pubspec_name(project_root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(project_root.join("pubspec.yaml")).ok()?;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("name:") {
            let name = rest.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

fn package_config_root(project_root: &Path, package: &str) -> Option<PathBuf> {
    let path = project_root.join(".dart_tool").join("package_config.json");
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let packages = parsed.get("packages")?.as_array()?;
    for entry in packages {
        if entry.get("name").and_then(|v| v.as_str()) == Some(package) {
            let uri = entry.get("rootUri").and_then(|v| v.as_str())?;
            let cleaned = uri.trim_start_matches("file://");
            let root = if cleaned.starts_with('/') {
                PathBuf::from(cleaned)
            } else {
                project_root.join(".dart_tool").join(cleaned)
            };
            return Some(root);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn package_import_maps_into_lib() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/screens")).unwrap();
        fs::write(root.join("pubspec.yaml"), "name: myapp\nversion: 1.0.0\n").unwrap();
        fs::write(root.join("lib/screens/login.dart"), "").unwrap();
        fs::write(root.join("lib/main.dart"), "").unwrap();

        let resolved = DartResolver.resolve(
            "package:myapp/screens/login.dart",
            &root.join("lib/main.dart"),
            root,
        );
        assert_eq!(resolved, Some(root.join("lib/screens/login.dart")));
    }

    #[test]
    fn relative_import_resolves_against_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/auth.dart"), "").unwrap();
        fs::write(root.join("lib/main.dart"), "").unwrap();

        let resolved = DartResolver.resolve("auth.dart", &root.join("lib/main.dart"), root);
        assert_eq!(resolved, Some(root.join("lib/auth.dart")));
    }

    #[test]
    fn dart_core_imports_are_external() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("main.dart"), "").unwrap();
        assert_eq!(
            DartResolver.resolve("dart:async", &root.join("main.dart"), root),
            None
        );
    }
}
