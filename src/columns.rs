// src/columns.rs

/// Finds the identifier column: the first header that, trimmed and
/// lowercased, contains "cnpj".
pub fn resolve_cnpj_column<S: AsRef<str>>(columns: &[S]) -> Option<&str> {
    columns
        .iter()
        .map(|c| c.as_ref())
        .find(|name| name.trim().to_lowercase().contains("cnpj"))
}
