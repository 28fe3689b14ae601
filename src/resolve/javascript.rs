use crate::resolve::ImportResolver;
use std::path::{Path, PathBuf};

/// Extension preference for extensionless specifiers.
const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "d.ts"];

/// JavaScript / TypeScript resolution: relative specifiers against the
/// importing file's directory with extension and `index.*` probing, bare
/// specifiers through `node_modules/<name>/package.json` and tsconfig
/// path aliases.
pub struct JsResolver;

impl ImportResolver for JsResolver {
    fn resolve(
        &self,
        import_string: &str,
        source_file: &Path,
        project_root: &Path,
    ) -> Option<PathBuf> {
        let spec = import_string.trim();
        if spec.is_empty() {
            return None;
        }
        if spec.starts_with('.') {
            let base = source_file.parent()?;
            return probe(&base.join(spec));
        }
        if let Some(found) = resolve_alias(spec, project_root) {
            return Some(found);
        }
        resolve_node_module(spec, project_root)
    }
}

/// Try the path as given, with each extension appended, then as a
/// directory holding an `index.*`.
fn probe(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    let raw = candidate.to_string_lossy().to_string();
    for ext in EXTENSIONS {
        let with_ext = PathBuf::from(format!("{raw}.{ext}"));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    if candidate.is_dir() {
        for ext in EXTENSIONS {
            let index = candidate.join(format!("index.{ext}"));
            if index.is_file() {
                return Some(index);
            }
        }
    }
    None
}

fn resolve_node_module(spec: &str, project_root: &Path) -> Option<PathBuf> {
    let package_dir = project_root.join("node_modules").join(spec);
    let manifest = package_dir.join("package.json");
    let raw = std::fs::read_to_string(&manifest).ok()?;
    let parsed: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let main = parsed.get("main").and_then(|value| value.as_str()).unwrap_or("index.js");
    probe(&package_dir.join(main))
}

/// tsconfig/jsconfig `compilerOptions.paths` mapping, exact and trailing
/// wildcard forms.
fn resolve_alias(spec: &str, project_root: &Path) -> Option<PathBuf> {
    let (paths, base_url) = load_path_aliases(project_root)?;
    for (pattern, targets) in &paths {
        if pattern == spec {
            for target in targets {
                if let Some(found) = probe(&project_root.join(&base_url).join(target)) {
                    return Some(found);
                }
            }
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            if let Some(suffix) = spec.strip_prefix(prefix) {
                for target in targets {
                    if let Some(target_base) = target.strip_suffix('*') {
                        let candidate = project_root
                            .join(&base_url)
                            .join(format!("{target_base}{suffix}"));
                        if let Some(found) = probe(&candidate) {
                            return Some(found);
                        }
                    }
                }
            }
        }
    }
    None
}

type PathAliases = Vec<(String, Vec<String>)>;

fn load_path_aliases(project_root: &Path) -> Option<(PathAliases, String)> {
    for name in ["tsconfig.json", "jsconfig.json"] {
        let path = project_root.join(name);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let cleaned = strip_json_comments(&raw);
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&cleaned) else {
            continue;
        };
        let options = parsed.get("compilerOptions");
        let base_url = options
            .and_then(|o| o.get("baseUrl"))
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let mut aliases = Vec::new();
        if let Some(paths) = options.and_then(|o| o.get("paths")).and_then(|v| v.as_object()) {
            for (pattern, targets) in paths {
                let targets: Vec<String> = targets
                    .as_array()
                    .map(|list| {
                        list.iter()
                            .filter_map(|t| t.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                aliases.push((pattern.clone(), targets));
            }
        }
        return Some((aliases, base_url));
    }
    None
}

/// tsconfig files routinely carry `//` and `/* */` comments that
/// serde_json rejects; strip them outside string literals.
fn strip_json_comments(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    let mut in_string = false;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        if in_string {
            out.push(ch);
            if ch == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1] as char);
                i += 1;
            } else if ch == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
                i += 1;
            }
            '/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            '/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn relative_with_extension_probe() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/components")).unwrap();
        fs::write(root.join("src/app.ts"), "").unwrap();
        fs::write(root.join("src/components/Button.tsx"), "").unwrap();
        fs::write(root.join("src/components/index.ts"), "").unwrap();

        let resolved = JsResolver.resolve("./components/Button", &root.join("src/app.ts"), root);
        assert_eq!(resolved, Some(root.join("src/components/Button.tsx")));

        let index = JsResolver.resolve("./components", &root.join("src/app.ts"), root);
        assert_eq!(index, Some(root.join("src/components/index.ts")));
    }

    #[test]
    fn bare_specifier_uses_package_main() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/leftpad/lib")).unwrap();
        fs::write(
            root.join("node_modules/leftpad/package.json"),
            r#"{"name": "leftpad", "main": "lib/entry.js"}"#,
        )
        .unwrap();
        fs::write(root.join("node_modules/leftpad/lib/entry.js"), "").unwrap();
        fs::write(root.join("app.js"), "").unwrap();

        let resolved = JsResolver.resolve("leftpad", &root.join("app.js"), root);
        assert_eq!(resolved, Some(root.join("node_modules/leftpad/lib/entry.js")));
    }

    #[test]
    fn tsconfig_alias_with_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/services")).unwrap();
        fs::write(
            root.join("tsconfig.json"),
            "{\n  // alias map\n  \"compilerOptions\": {\n    \"baseUrl\": \".\",\n    \"paths\": { \"@/*\": [\"src/*\"] }\n  }\n}\n",
        )
        .unwrap();
        fs::write(root.join("src/services/auth.ts"), "").unwrap();
        fs::write(root.join("src/app.ts"), "").unwrap();

        let resolved = JsResolver.resolve("@/services/auth", &root.join("src/app.ts"), root);
        assert_eq!(resolved, Some(root.join("src/services/auth.ts")));
    }
}
