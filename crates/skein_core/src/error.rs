use crate::ModuleId;

/// Build failure taxonomy. `Resolution` is fatal at initial build time and
/// degrades to a diagnostic during incremental updates; `Syntax` always
/// degrades; `Emission` signals an engine invariant violation and is fatal.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot resolve \"{specifier}\" from {importer}")]
    Resolution { specifier: String, importer: String },
    #[error("{file}:{line}:{column}: {message}")]
    Syntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("emission invariant violated: {0}")]
    Emission(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn resolution(specifier: &str, importer: Option<&ModuleId>) -> Self {
        Self::Resolution {
            specifier: specifier.to_string(),
            importer: importer
                .map(|id| id.to_string())
                .unwrap_or_else(|| "<entry>".to_string()),
        }
    }

    pub fn syntax(file: &str, source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(source, offset);
        Self::Syntax {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }
}

/// 1-based line/column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let mut line = 1;
    let mut col = 1;
    for ch in source[..offset].chars() {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Non-fatal findings accumulated on a build or rebuild instead of thrown,
/// so one broken module never blocks serving the rest.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub module: Option<ModuleId>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(module: Option<ModuleId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            module,
            message: message.into(),
        }
    }

    pub fn warning(module: Option<ModuleId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            module,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let src = "ab\ncd\nef";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 4), (2, 2));
        assert_eq!(line_col(src, 6), (3, 1));
    }

    #[test]
    fn syntax_error_formats_location() {
        let err = BuildError::syntax("/src/a.ts", "let x\nlet y", 6, "unexpected token");
        assert_eq!(err.to_string(), "/src/a.ts:2:1: unexpected token");
    }
}
