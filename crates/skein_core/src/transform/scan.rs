use linked_hash_set::LinkedHashSet;

use crate::transform::lexer::{tokenize, Token, TokenKind};
use crate::BuildError;

/// One `import ... from "spec"` statement, with the bindings it introduces.
/// A side-effect import carries no bindings at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    pub specifier: String,
    /// Byte span of the whole statement including a trailing `;`.
    pub span: (usize, usize),
    pub default_binding: Option<String>,
    pub namespace_binding: Option<String>,
    /// `(imported, local)` pairs from an import list.
    pub named: Vec<(String, String)>,
}

/// `export ... from "spec"` in any of its shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReExportStmt {
    pub specifier: String,
    pub span: (usize, usize),
    /// `export * from`.
    pub star: bool,
    /// `export * as ns from`.
    pub star_as: Option<String>,
    /// `(original, exported)` pairs from an export list.
    pub named: Vec<(String, String)>,
}

/// A local export site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStmt {
    /// `export default <expr>`; span covers only the two keywords.
    Default { kw_span: (usize, usize) },
    /// `export <decl>`; span covers only the `export` keyword, names are the
    /// bindings the declaration introduces.
    Decl {
        kw_span: (usize, usize),
        names: Vec<String>,
    },
    /// `export { a, b as c };`; span covers the whole statement.
    List {
        span: (usize, usize),
        names: Vec<(String, String)>,
    },
}

/// Everything the emitter and the graph need to know about one module's
/// surface, in source order.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Specifiers in first-occurrence order; duplicates collapse.
    pub dependencies: LinkedHashSet<String>,
    pub imports: Vec<ImportStmt>,
    pub re_exports: Vec<ReExportStmt>,
    pub exports: Vec<ExportStmt>,
}

impl ScanResult {
    /// Exported names in declaration order, `default` included.
    pub fn export_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for export in &self.exports {
            match export {
                ExportStmt::Default { .. } => names.push("default".to_string()),
                ExportStmt::Decl { names: decl, .. } => names.extend(decl.iter().cloned()),
                ExportStmt::List { names: list, .. } => {
                    names.extend(list.iter().map(|(_, exported)| exported.clone()))
                }
            }
        }
        for re in &self.re_exports {
            if let Some(ns) = &re.star_as {
                names.push(ns.clone());
            }
            names.extend(re.named.iter().map(|(_, exported)| exported.clone()));
        }
        names
    }
}

/// Scans transformed code for import and export statements. Only top-level
/// statements count; anything nested inside braces is runtime code.
pub fn scan(source: &str, file: &str) -> Result<ScanResult, BuildError> {
    let tokens = tokenize(source, file)?;
    let mut result = ScanResult::default();
    let mut depth = 0i32;
    let mut i = 0usize;
    while i < tokens.len() {
        let t = &tokens[i];
        match t.kind {
            TokenKind::Punct('{' | '(' | '[') => depth += 1,
            TokenKind::Punct('}' | ')' | ']') => depth -= 1,
            TokenKind::Ident if depth == 0 && t.text(source) == "import" => {
                // `import(` is a call expression, not a statement.
                if !tokens.get(i + 1).map(|n| n.is_punct('(')).unwrap_or(false) {
                    let (stmt, next) = parse_import(source, file, &tokens, i)?;
                    result.dependencies.insert_if_absent(stmt.specifier.clone());
                    result.imports.push(stmt);
                    i = next;
                    continue;
                }
            }
            TokenKind::Ident if depth == 0 && t.text(source) == "export" => {
                let next = parse_export(source, file, &tokens, i, &mut result)?;
                i = next;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    Ok(result)
}

fn unquote(token: &Token, source: &str) -> String {
    let text = token.text(source);
    text[1..text.len() - 1].to_string()
}

/// Span end for a statement: the trailing `;` if present, else the last
/// consumed token.
fn stmt_end(tokens: &[Token], last: usize) -> (usize, usize) {
    match tokens.get(last + 1) {
        Some(t) if t.is_punct(';') => (last + 1, t.end),
        _ => (last, tokens[last].end),
    }
}

fn parse_import(
    source: &str,
    file: &str,
    tokens: &[Token],
    start: usize,
) -> Result<(ImportStmt, usize), BuildError> {
    let err = |pos: usize, msg: &str| BuildError::syntax(file, source, pos, msg);
    let mut stmt = ImportStmt {
        specifier: String::new(),
        span: (tokens[start].start, 0),
        default_binding: None,
        namespace_binding: None,
        named: Vec::new(),
    };
    let mut i = start + 1;

    // Side-effect import: `import "spec";`
    if let Some(t) = tokens.get(i) {
        if t.kind == TokenKind::Str {
            stmt.specifier = unquote(t, source);
            let (last, end) = stmt_end(tokens, i);
            stmt.span.1 = end;
            return Ok((stmt, last + 1));
        }
    }

    loop {
        let t = tokens
            .get(i)
            .ok_or_else(|| err(tokens[start].start, "unterminated import statement"))?;
        match t.kind {
            TokenKind::Ident if t.text(source) == "from" => {
                i += 1;
                break;
            }
            TokenKind::Ident => {
                stmt.default_binding = Some(t.text(source).to_string());
                i += 1;
            }
            TokenKind::Punct('*') => {
                if !tokens
                    .get(i + 1)
                    .map(|n| n.is_ident(source, "as"))
                    .unwrap_or(false)
                {
                    return Err(err(t.start, "expected `as` after `*`"));
                }
                let ns = tokens
                    .get(i + 2)
                    .filter(|n| n.kind == TokenKind::Ident)
                    .ok_or_else(|| err(t.start, "expected namespace binding"))?;
                stmt.namespace_binding = Some(ns.text(source).to_string());
                i += 3;
            }
            TokenKind::Punct('{') => {
                let (named, next) = parse_binding_list(source, file, tokens, i)?;
                stmt.named = named;
                i = next;
            }
            TokenKind::Punct(',') => i += 1,
            _ => return Err(err(t.start, "malformed import statement")),
        }
    }

    let spec = tokens
        .get(i)
        .filter(|t| t.kind == TokenKind::Str)
        .ok_or_else(|| err(tokens[start].start, "expected module specifier"))?;
    stmt.specifier = unquote(spec, source);
    let (last, end) = stmt_end(tokens, i);
    stmt.span.1 = end;
    Ok((stmt, last + 1))
}

/// Parses `{ a, b as c }`; returns `(name, alias)` pairs and the index just
/// past the closing brace.
fn parse_binding_list(
    source: &str,
    file: &str,
    tokens: &[Token],
    open: usize,
) -> Result<(Vec<(String, String)>, usize), BuildError> {
    let err = |pos: usize, msg: &str| BuildError::syntax(file, source, pos, msg);
    let mut pairs = Vec::new();
    let mut i = open + 1;
    loop {
        let t = tokens
            .get(i)
            .ok_or_else(|| err(tokens[open].start, "unterminated binding list"))?;
        match t.kind {
            TokenKind::Punct('}') => return Ok((pairs, i + 1)),
            TokenKind::Punct(',') => i += 1,
            TokenKind::Ident => {
                let name = t.text(source).to_string();
                let alias = if tokens
                    .get(i + 1)
                    .map(|n| n.is_ident(source, "as"))
                    .unwrap_or(false)
                {
                    let a = tokens
                        .get(i + 2)
                        .filter(|n| n.kind == TokenKind::Ident)
                        .ok_or_else(|| err(t.start, "expected binding alias"))?;
                    i += 3;
                    a.text(source).to_string()
                } else {
                    i += 1;
                    name.clone()
                };
                pairs.push((name, alias));
            }
            _ => return Err(err(t.start, "malformed binding list")),
        }
    }
}

fn parse_export(
    source: &str,
    file: &str,
    tokens: &[Token],
    start: usize,
    result: &mut ScanResult,
) -> Result<usize, BuildError> {
    let err = |pos: usize, msg: &str| BuildError::syntax(file, source, pos, msg);
    let kw = &tokens[start];
    let next = tokens
        .get(start + 1)
        .ok_or_else(|| err(kw.start, "unterminated export statement"))?;

    match next.kind {
        TokenKind::Ident if next.text(source) == "default" => {
            result.exports.push(ExportStmt::Default {
                kw_span: (kw.start, next.end),
            });
            Ok(start + 2)
        }
        TokenKind::Punct('*') => {
            let mut i = start + 2;
            let mut star_as = None;
            if tokens
                .get(i)
                .map(|t| t.is_ident(source, "as"))
                .unwrap_or(false)
            {
                let ns = tokens
                    .get(i + 1)
                    .filter(|t| t.kind == TokenKind::Ident)
                    .ok_or_else(|| err(kw.start, "expected namespace name"))?;
                star_as = Some(ns.text(source).to_string());
                i += 2;
            }
            if !tokens
                .get(i)
                .map(|t| t.is_ident(source, "from"))
                .unwrap_or(false)
            {
                return Err(err(kw.start, "expected `from` in star export"));
            }
            let spec = tokens
                .get(i + 1)
                .filter(|t| t.kind == TokenKind::Str)
                .ok_or_else(|| err(kw.start, "expected module specifier"))?;
            let specifier = unquote(spec, source);
            let (last, end) = stmt_end(tokens, i + 1);
            result.dependencies.insert_if_absent(specifier.clone());
            result.re_exports.push(ReExportStmt {
                specifier,
                span: (kw.start, end),
                star: star_as.is_none(),
                star_as,
                named: Vec::new(),
            });
            Ok(last + 1)
        }
        TokenKind::Punct('{') => {
            let (pairs, after_list) = parse_binding_list(source, file, tokens, start + 1)?;
            if tokens
                .get(after_list)
                .map(|t| t.is_ident(source, "from"))
                .unwrap_or(false)
            {
                let spec = tokens
                    .get(after_list + 1)
                    .filter(|t| t.kind == TokenKind::Str)
                    .ok_or_else(|| err(kw.start, "expected module specifier"))?;
                let specifier = unquote(spec, source);
                let (last, end) = stmt_end(tokens, after_list + 1);
                result.dependencies.insert_if_absent(specifier.clone());
                result.re_exports.push(ReExportStmt {
                    specifier,
                    span: (kw.start, end),
                    star: false,
                    star_as: None,
                    named: pairs,
                });
                Ok(last + 1)
            } else {
                let (last, end) = stmt_end(tokens, after_list - 1);
                result.exports.push(ExportStmt::List {
                    span: (kw.start, end),
                    names: pairs,
                });
                Ok(last + 1)
            }
        }
        TokenKind::Ident => {
            let names = declared_names(source, tokens, start + 1)
                .ok_or_else(|| err(next.start, "malformed exported declaration"))?;
            result.exports.push(ExportStmt::Decl {
                kw_span: (kw.start, kw.end),
                names,
            });
            Ok(start + 1)
        }
        _ => Err(err(next.start, "malformed export statement")),
    }
}

/// Names bound by the declaration starting at `idx` (`var x`, `function f`,
/// `class C`). Multi-declarator `var a = 1, b = 2;` yields every declarator.
fn declared_names(source: &str, tokens: &[Token], idx: usize) -> Option<Vec<String>> {
    let head = tokens.get(idx)?;
    match head.text(source) {
        "function" | "class" => {
            let name = tokens.get(idx + 1)?;
            if name.kind != TokenKind::Ident {
                return None;
            }
            Some(vec![name.text(source).to_string()])
        }
        "var" | "let" | "const" => {
            let mut names = Vec::new();
            let mut depth = 0i32;
            let mut i = idx + 1;
            let mut expect_name = true;
            while let Some(t) = tokens.get(i) {
                match t.kind {
                    TokenKind::Punct('(' | '[' | '{') => depth += 1,
                    TokenKind::Punct(')' | ']' | '}') => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    TokenKind::Punct(';') if depth == 0 => break,
                    TokenKind::Punct(',') if depth == 0 => expect_name = true,
                    TokenKind::Ident if depth == 0 && expect_name => {
                        names.push(t.text(source).to_string());
                        expect_name = false;
                    }
                    _ => {}
                }
                i += 1;
            }
            if names.is_empty() {
                None
            } else {
                Some(names)
            }
        }
        "async" => declared_names(source, tokens, idx + 1),
        _ => None,
    }
}
