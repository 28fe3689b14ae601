use anyhow::{bail, Result};

/// Keywords rejected when they appear as whole words, case-insensitive.
/// Filter strings are interpolated into store queries, so anything that
/// could splice a second clause is refused outright.
const REJECTED_KEYWORDS: &[&str] = &[
    "OR", "AND", "DROP", "DELETE", "INSERT", "UPDATE", "UNION",
];

/// Escape a value for interpolation into an equality filter. Quotes of both
/// kinds are doubled; dangerous whole-word keywords and statement separators
/// are rejected with an error rather than silently stripped.
pub fn sanitize(raw: &str) -> Result<String> {
    if raw.contains(';') {
        bail!("filter value contains ';': {raw:?}");
    }
    for word in words(raw) {
        for keyword in REJECTED_KEYWORDS {
            if word.eq_ignore_ascii_case(keyword) {
                bail!("filter value contains reserved word {keyword}: {raw:?}");
            }
        }
    }
    Ok(raw.replace('"', "\"\"").replace('\'', "''"))
}

/// Like [`sanitize`], additionally escaping the LIKE wildcards `%` and `_`
/// with a backslash. Queries using the result must declare `ESCAPE '\'`.
pub fn sanitize_like(raw: &str) -> Result<String> {
    let safe = sanitize(raw)?;
    Ok(safe
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_"))
}

fn words(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_quotes() {
        assert_eq!(sanitize(r#"a"b"#).unwrap(), r#"a""b"#);
        assert_eq!(sanitize("it's").unwrap(), "it''s");
    }

    #[test]
    fn rejects_whole_word_keywords() {
        assert!(sanitize("1 OR 1=1").is_err());
        assert!(sanitize("drop table chunks").is_err());
        assert!(sanitize("x; --").is_err());
        assert!(sanitize("a UNION b").is_err());
    }

    #[test]
    fn keyword_inside_identifier_passes() {
        // "order" contains "or" but not as a whole word
        assert_eq!(sanitize("order_service").unwrap(), "order_service");
        assert_eq!(sanitize("android").unwrap(), "android");
        assert_eq!(sanitize("updated_at").unwrap(), "updated_at");
    }

    #[test]
    fn like_escapes_wildcards() {
        assert_eq!(sanitize_like("50%_done").unwrap(), "50\\%\\_done");
    }

    #[test]
    fn case_insensitive_rejection() {
        assert!(sanitize("a oR b").is_err());
        assert!(sanitize("DeLeTe from x").is_err());
    }
}
