//! Code-safe identifiers for schema and operation names.

/// Turn a free-form name into a PascalCase identifier.
///
/// Whitespace, underscores, hyphens and slashes separate words; any other
/// character outside `[A-Za-z0-9]` is dropped. Each word keeps its casing
/// apart from an uppercased first character.
///
/// ```
/// use schema_dto::make_code_identifier;
///
/// assert_eq!(make_code_identifier("my-test-operation request_body"), "MyTestOperationRequestBody");
/// assert_eq!(make_code_identifier("put-/test"), "PutTest");
/// assert_eq!(make_code_identifier(""), "");
/// ```
pub fn make_code_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() || matches!(c, '_' | '-' | '/') {
                Some(' ')
            } else if c.is_ascii_alphanumeric() {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    cleaned.split(' ').map(capitalize).collect()
}

/// Strip a trailing `.json`, `.yaml` or `.yml` extension.
pub fn strip_extensions(file_name: &str) -> &str {
    [".json", ".yaml", ".yml"]
        .iter()
        .find_map(|ext| file_name.strip_suffix(*ext))
        .unwrap_or(file_name)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
