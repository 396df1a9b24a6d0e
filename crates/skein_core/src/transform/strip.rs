use crate::transform::lexer::{markup_allowed, tokenize, Lexer, Token, TokenKind};
use crate::BuildError;

pub const JSX_RUNTIME_IMPORT: &str = "import { jsx as __jsx } from \"jsx/runtime\";";

/// Syntax-extension stripping: lowers JSX into `__jsx(...)` calls and removes
/// TypeScript surface syntax, leaving plain executable JS. Runs before the
/// downgrade pass, which cannot parse extension syntax.
pub fn run(source: &str, file: &str) -> Result<String, BuildError> {
    let (code, used_jsx) = lower_jsx(source, file)?;
    let code = strip_types(&code, file)?;
    if used_jsx && !code.contains(JSX_RUNTIME_IMPORT) {
        Ok(format!("{JSX_RUNTIME_IMPORT}\n{code}"))
    } else {
        Ok(code)
    }
}

/// Element regions must leave the token stream before the lexer reads into
/// them: children and closing tags are not JS, and the `/` of `</name>` lands
/// in regex position. Tokens are pulled one at a time; on a markup `<` the
/// element is consumed at character level and the lexer resumes past it.
fn lower_jsx(source: &str, file: &str) -> Result<(String, bool), BuildError> {
    let parser = JsxParser::new(source, file);
    let mut lexer = Lexer::new(source, file);
    let mut out = String::new();
    let mut copied = 0usize;
    let mut used = false;
    let mut prev: Option<Token> = None;
    while let Some(t) = lexer.next_token(prev.as_ref())? {
        if t.is_punct('<') && markup_allowed(prev.as_ref(), source) && opens_markup(source, t.end) {
            let (replacement, end) = parser.parse_element(t.start)?;
            used = true;
            out.push_str(&source[copied..t.start]);
            out.push_str(&replacement);
            copied = end;
            lexer.seek(end);
            prev = None;
            continue;
        }
        prev = Some(t);
    }
    out.push_str(&source[copied..]);
    Ok((out, used))
}

/// A `<` opens markup when an element name starts immediately after it, or a
/// `>` follows (fragment), possibly across whitespace.
fn opens_markup(source: &str, after_lt: usize) -> bool {
    let bytes = source.as_bytes();
    match bytes.get(after_lt) {
        Some(&b) if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => true,
        _ => {
            let mut pos = after_lt;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            pos < bytes.len() && bytes[pos] == b'>'
        }
    }
}

/// Character-level JSX element parser. Works on raw source because element
/// children are free text the lexer has no tokens for.
struct JsxParser<'a> {
    source: &'a str,
    file: &'a str,
}

enum Prop {
    Named(String, String),
    Spread(String),
}

impl<'a> JsxParser<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        Self { source, file }
    }

    fn err(&self, at: usize, message: &str) -> BuildError {
        BuildError::syntax(self.file, self.source, at, message)
    }

    fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    fn skip_ws(&self, mut pos: usize) -> usize {
        let bytes = self.bytes();
        while pos < bytes.len() && (bytes[pos] as char).is_whitespace() {
            pos += 1;
        }
        pos
    }

    /// Parses one element starting at the `<` at `start`; returns the lowered
    /// `__jsx(...)` call and the offset just past the element.
    fn parse_element(&self, start: usize) -> Result<(String, usize), BuildError> {
        let bytes = self.bytes();
        debug_assert_eq!(bytes[start], b'<');
        let mut pos = self.skip_ws(start + 1);

        // Fragment: <>children</>
        if pos < bytes.len() && bytes[pos] == b'>' {
            let (children, end) = self.parse_children(pos + 1, None)?;
            return Ok((render_call("null", Vec::new(), children), end));
        }

        let (name, after_name) = self.parse_name(pos)?;
        pos = after_name;

        let mut props = Vec::new();
        loop {
            pos = self.skip_ws(pos);
            if pos >= bytes.len() {
                return Err(self.err(start, "unterminated element"));
            }
            match bytes[pos] {
                b'/' => {
                    let close = self.skip_ws(pos + 1);
                    if close >= bytes.len() || bytes[close] != b'>' {
                        return Err(self.err(pos, "expected \">\" after \"/\""));
                    }
                    return Ok((
                        render_call(&name_expr(&name), props, Vec::new()),
                        close + 1,
                    ));
                }
                b'>' => {
                    let (children, end) = self.parse_children(pos + 1, Some(&name))?;
                    return Ok((render_call(&name_expr(&name), props, children), end));
                }
                b'{' => {
                    // {...expr}
                    let inner = self.skip_ws(pos + 1);
                    if !self.source[inner..].starts_with("...") {
                        return Err(self.err(pos, "expected attribute or spread"));
                    }
                    let (expr, after) = self.parse_brace_expr(pos)?;
                    let expr = expr.trim_start_matches("...").trim().to_string();
                    props.push(Prop::Spread(expr));
                    pos = after;
                }
                _ => {
                    let (attr, after) = self.parse_attr(pos)?;
                    props.push(attr);
                    pos = after;
                }
            }
        }
    }

    fn parse_name(&self, start: usize) -> Result<(String, usize), BuildError> {
        let bytes = self.bytes();
        let mut pos = start;
        while pos < bytes.len() {
            let c = bytes[pos] as char;
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '-') {
                pos += 1;
            } else {
                break;
            }
        }
        if pos == start {
            return Err(self.err(start, "expected element name"));
        }
        Ok((self.source[start..pos].to_string(), pos))
    }

    fn parse_attr(&self, start: usize) -> Result<(Prop, usize), BuildError> {
        let (name, mut pos) = self.parse_name(start)?;
        pos = self.skip_ws(pos);
        let bytes = self.bytes();
        if pos >= bytes.len() || bytes[pos] != b'=' {
            // Bare attribute.
            return Ok((Prop::Named(name, "true".to_string()), pos));
        }
        pos = self.skip_ws(pos + 1);
        if pos >= bytes.len() {
            return Err(self.err(start, "missing attribute value"));
        }
        match bytes[pos] {
            b'"' | b'\'' => {
                let quote = bytes[pos];
                let mut end = pos + 1;
                while end < bytes.len() && bytes[end] != quote {
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(self.err(pos, "unterminated attribute value"));
                }
                let value = json_string(&self.source[pos + 1..end]);
                Ok((Prop::Named(name, value), end + 1))
            }
            b'{' => {
                let (expr, after) = self.parse_brace_expr(pos)?;
                Ok((Prop::Named(name, expr), after))
            }
            _ => Err(self.err(pos, "expected string or expression attribute value")),
        }
    }

    /// Consumes a `{ ... }` region; the inner expression is recursively
    /// lowered so nested elements inside it are handled.
    fn parse_brace_expr(&self, start: usize) -> Result<(String, usize), BuildError> {
        let bytes = self.bytes();
        debug_assert_eq!(bytes[start], b'{');
        let mut depth = 0usize;
        let mut pos = start;
        while pos < bytes.len() {
            match bytes[pos] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner = &self.source[start + 1..pos];
                        let (lowered, _) = lower_jsx(inner, self.file)?;
                        return Ok((lowered.trim().to_string(), pos + 1));
                    }
                }
                b'"' | b'\'' | b'`' => {
                    let quote = bytes[pos];
                    pos += 1;
                    while pos < bytes.len() && bytes[pos] != quote {
                        if bytes[pos] == b'\\' {
                            pos += 1;
                        }
                        pos += 1;
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        Err(self.err(start, "unterminated expression"))
    }

    fn parse_children(
        &self,
        start: usize,
        closing: Option<&str>,
    ) -> Result<(Vec<String>, usize), BuildError> {
        let bytes = self.bytes();
        let mut children = Vec::new();
        let mut text_start = start;
        let mut pos = start;
        while pos < bytes.len() {
            match bytes[pos] {
                b'<' => {
                    push_text(&mut children, &self.source[text_start..pos]);
                    let after = self.skip_ws(pos + 1);
                    if after < bytes.len() && bytes[after] == b'/' {
                        // closing tag
                        let name_start = self.skip_ws(after + 1);
                        if name_start >= bytes.len() {
                            return Err(self.err(pos, "malformed closing tag"));
                        }
                        let (name, after_name) = if closing.is_some() && bytes[name_start] != b'>' {
                            self.parse_name(name_start)?
                        } else {
                            (String::new(), name_start)
                        };
                        let gt = self.skip_ws(after_name);
                        if gt >= bytes.len() || bytes[gt] != b'>' {
                            return Err(self.err(pos, "malformed closing tag"));
                        }
                        match closing {
                            Some(expected) if name == expected => return Ok((children, gt + 1)),
                            None if name.is_empty() => return Ok((children, gt + 1)),
                            _ => {
                                return Err(self.err(
                                    pos,
                                    &format!("mismatched closing tag \"{name}\""),
                                ))
                            }
                        }
                    }
                    let (child, end) = self.parse_element(pos)?;
                    children.push(child);
                    pos = end;
                    text_start = end;
                }
                b'{' => {
                    push_text(&mut children, &self.source[text_start..pos]);
                    let (expr, after) = self.parse_brace_expr(pos)?;
                    if !expr.is_empty() {
                        children.push(expr);
                    }
                    pos = after;
                    text_start = after;
                }
                _ => pos += 1,
            }
        }
        Err(self.err(start, "unterminated element children"))
    }
}

fn push_text(children: &mut Vec<String>, raw: &str) {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !collapsed.is_empty() {
        children.push(json_string(&collapsed));
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// Intrinsic (lowercase or dashed) names become string tags; capitalized
/// names reference a component in scope.
fn name_expr(name: &str) -> String {
    let intrinsic = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(true)
        || name.contains('-');
    if intrinsic {
        json_string(name)
    } else {
        name.to_string()
    }
}

fn render_call(name: &str, props: Vec<Prop>, children: Vec<String>) -> String {
    let props_expr = render_props(props);
    let mut call = format!("__jsx({name}, {props_expr}");
    for child in children {
        call.push_str(", ");
        call.push_str(&child);
    }
    call.push(')');
    call
}

fn render_props(props: Vec<Prop>) -> String {
    if props.is_empty() {
        return "null".to_string();
    }
    let has_spread = props.iter().any(|p| matches!(p, Prop::Spread(_)));
    let mut segments: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for prop in props {
        match prop {
            Prop::Named(name, value) => {
                current.push(format!("{}: {value}", json_string(&name)));
            }
            Prop::Spread(expr) => {
                if !current.is_empty() {
                    segments.push(format!("{{ {} }}", current.join(", ")));
                    current.clear();
                }
                segments.push(expr);
            }
        }
    }
    if !current.is_empty() {
        segments.push(format!("{{ {} }}", current.join(", ")));
    }
    if has_spread {
        format!("Object.assign({{}}, {})", segments.join(", "))
    } else {
        segments.pop().unwrap_or_else(|| "null".to_string())
    }
}

/// Removes TypeScript-only syntax from the token stream: `interface` and
/// `type` statements, parameter/return/variable annotations, `as` casts and
/// type-only imports.
fn strip_types(source: &str, file: &str) -> Result<String, BuildError> {
    let tokens = tokenize(source, file)?;
    let mut removals: Vec<(usize, usize)> = Vec::new();

    let paren_match = match_pairs(&tokens, '(', ')', source, file)?;
    let brace_match = match_pairs(&tokens, '{', '}', source, file)?;

    // Statement-level constructs.
    let mut i = 0usize;
    let mut stmt_start = true;
    let mut module_stmt_until: Option<usize> = None;
    while i < tokens.len() {
        let t = tokens[i];
        if let Some(limit) = module_stmt_until {
            if i > limit {
                module_stmt_until = None;
            }
        }
        if stmt_start && t.kind == TokenKind::Ident {
            let word = t.text(source);
            let (kw, body) = if word == "export"
                && matches!(tokens.get(i + 1).map(|n| n.kind), Some(TokenKind::Ident))
            {
                (i, i + 1)
            } else {
                (i, i)
            };
            let body_word = tokens[body].text(source);
            match body_word {
                "interface" => {
                    let open = (body + 1..tokens.len())
                        .find(|&j| tokens[j].is_punct('{'))
                        .ok_or_else(|| {
                            BuildError::syntax(file, source, t.start, "malformed interface")
                        })?;
                    let close = *brace_match.get(&open).ok_or_else(|| {
                        BuildError::syntax(file, source, tokens[open].start, "unterminated interface")
                    })?;
                    removals.push((tokens[kw].start, tokens[close].end));
                    i = close + 1;
                    stmt_start = true;
                    continue;
                }
                // export type { A } [from "x"];
                "type" if kw != body
                    && matches!(
                        tokens.get(body + 1).map(|n| n.kind),
                        Some(TokenKind::Punct('{'))
                    ) =>
                {
                    let end = stmt_end(&tokens, body + 1);
                    removals.push((tokens[kw].start, end_offset(&tokens, end, source)));
                    i = end + 1;
                    stmt_start = true;
                    continue;
                }
                "type" if matches!(
                    tokens.get(body + 1).map(|n| n.kind),
                    Some(TokenKind::Ident)
                ) && matches!(
                    tokens.get(body + 2).map(|n| n.kind),
                    Some(TokenKind::Punct('=')) | Some(TokenKind::Punct('<'))
                ) =>
                {
                    let end = stmt_end(&tokens, body + 2);
                    removals.push((tokens[kw].start, end_offset(&tokens, end, source)));
                    i = end + 1;
                    stmt_start = true;
                    continue;
                }
                "import" | "export"
                    if tokens
                        .get(body + 1)
                        .map(|n| n.is_ident(source, "type"))
                        .unwrap_or(false)
                        && !tokens
                            .get(body + 2)
                            .map(|n| n.is_ident(source, "from") || n.is_punct(','))
                            .unwrap_or(true) =>
                {
                    // import type { A } from "x"; / export type { A };
                    let end = stmt_end(&tokens, body + 1);
                    removals.push((tokens[kw].start, end_offset(&tokens, end, source)));
                    i = end + 1;
                    stmt_start = true;
                    continue;
                }
                "import" | "export" => {
                    module_stmt_until = Some(stmt_end(&tokens, body));
                }
                _ => {}
            }
        }
        stmt_start = matches!(t.kind, TokenKind::Punct(';' | '{' | '}'));
        if t.kind == TokenKind::Ident && t.text(source) == "export" {
            stmt_start = false;
        }

        // `as T` casts, outside import/export statements.
        if t.kind == TokenKind::Ident
            && t.text(source) == "as"
            && module_stmt_until.map(|limit| i > limit).unwrap_or(true)
            && i > 0
            && is_value_end(&tokens[i - 1])
        {
            if let Some(end) = scan_type(&tokens, i + 1, TypeStop::Cast) {
                removals.push((t.start, type_end(&tokens, end, source)));
                i = end;
                continue;
            }
        }

        // Variable declarator annotations: var x: T = ...
        if t.kind == TokenKind::Ident
            && matches!(t.text(source), "var" | "let" | "const")
            && (i == 0 || !tokens[i - 1].is_punct('.'))
        {
            let mut j = i + 1;
            while j + 1 < tokens.len() && tokens[j].kind == TokenKind::Ident {
                if tokens[j + 1].is_punct(':') {
                    if let Some(end) = scan_type(&tokens, j + 2, TypeStop::Declarator) {
                        removals.push((tokens[j + 1].start, type_end(&tokens, end, source)));
                    }
                }
                // Next declarator after a top-level comma, if any.
                match next_declarator(&tokens, j + 1) {
                    Some(next) => j = next,
                    None => break,
                }
            }
        }

        i += 1;
    }

    // Parameter lists and return annotations.
    for (&open, &close) in paren_match.iter() {
        if open > close {
            continue;
        }
        if !is_param_list(&tokens, source, open, close) {
            continue;
        }
        strip_param_annotations(&tokens, source, open, close, &mut removals);
        // Return annotation directly after the closing paren.
        if let Some(colon) = tokens.get(close + 1).filter(|t| t.is_punct(':')) {
            if let Some(end) = scan_type(&tokens, close + 2, TypeStop::Return) {
                removals.push((colon.start, type_end(&tokens, end, source)));
            }
        }
    }

    Ok(apply_removals(source, removals))
}

fn end_offset(tokens: &[Token], idx: usize, source: &str) -> usize {
    tokens.get(idx).map(|t| t.end).unwrap_or(source.len())
}

/// End of the type expression whose terminator sits at `idx`: the end of the
/// token just before it.
fn type_end(tokens: &[Token], idx: usize, source: &str) -> usize {
    idx.checked_sub(1)
        .and_then(|k| tokens.get(k))
        .map(|t| t.end)
        .unwrap_or(source.len())
}

/// Index of the `;` ending the statement opened at `from` (depth aware), or
/// the last token.
fn stmt_end(tokens: &[Token], from: usize) -> usize {
    let mut depth = 0i32;
    for j in from..tokens.len() {
        match tokens[j].kind {
            TokenKind::Punct('(' | '[' | '{') => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => depth -= 1,
            TokenKind::Punct(';') if depth <= 0 => return j,
            _ => {}
        }
    }
    tokens.len().saturating_sub(1)
}

fn next_declarator(tokens: &[Token], from: usize) -> Option<usize> {
    let mut depth = 0i32;
    for j in from..tokens.len() {
        match tokens[j].kind {
            TokenKind::Punct('(' | '[' | '{') => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            TokenKind::Punct(';') if depth == 0 => return None,
            TokenKind::Punct(',') if depth == 0 => return Some(j + 1),
            _ => {}
        }
    }
    None
}

fn is_value_end(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Ident
            | TokenKind::Str
            | TokenKind::Number
            | TokenKind::Template
            | TokenKind::Punct(')')
            | TokenKind::Punct(']')
    )
}

enum TypeStop {
    /// Parameter type: stops at `,` or `)` at depth 0.
    Param,
    /// Declarator type: stops at `=`, `,` or `;`.
    Declarator,
    /// Return type: stops at `{` (function body), `=>`, `;` or `=`.
    Return,
    /// Cast: stops at any expression-level boundary.
    Cast,
}

/// Scans a type expression starting at `from`; returns the index of the
/// terminator token (not part of the type). `<>`-groups, parens, brackets and
/// a leading object-type brace group all nest.
fn scan_type(tokens: &[Token], from: usize, stop: TypeStop) -> Option<usize> {
    let mut depth = 0i32;
    let mut angle = 0i32;
    let mut j = from;
    let mut first = true;
    while j < tokens.len() {
        let t = tokens[j];
        if depth == 0 && angle == 0 && !first {
            let done = match stop {
                TypeStop::Param => matches!(t.kind, TokenKind::Punct(',' | ')' | '=')),
                TypeStop::Declarator => matches!(t.kind, TokenKind::Punct('=' | ',' | ';')),
                TypeStop::Return => {
                    matches!(t.kind, TokenKind::Punct('{' | ';' | '=')) || t.kind == TokenKind::Arrow
                }
                TypeStop::Cast => matches!(
                    t.kind,
                    TokenKind::Punct(
                        ',' | ';' | ')' | ']' | '}' | '=' | ':' | '?' | '+' | '-' | '*' | '/'
                            | '&' | '|' | '!' | '>'
                    )
                ),
            };
            if done {
                return Some(j);
            }
        }
        match t.kind {
            TokenKind::Punct('(' | '[') => depth += 1,
            TokenKind::Punct('{') if first || depth > 0 || angle > 0 => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => {
                if depth == 0 {
                    return Some(j);
                }
                depth -= 1;
            }
            TokenKind::Punct('<') => angle += 1,
            TokenKind::Punct('>') if angle > 0 => angle -= 1,
            TokenKind::Punct(';') if depth == 0 => return Some(j),
            _ => {}
        }
        first = false;
        j += 1;
    }
    Some(tokens.len())
}

fn is_keyword_head(word: &str) -> bool {
    matches!(
        word,
        "if" | "for" | "while" | "switch" | "catch" | "return" | "typeof" | "with" | "do"
    )
}

/// Classifies `(open..close)` as a parameter list: function declarations and
/// expressions, arrows (including typed-return arrows), and object/class
/// method shorthands.
fn is_param_list(
    tokens: &[Token],
    source: &str,
    open: usize,
    close: usize,
) -> bool {
    // function (…)  /  function name(…)
    if open >= 1 && tokens[open - 1].is_ident(source, "function") {
        return true;
    }
    if open >= 2
        && tokens[open - 1].kind == TokenKind::Ident
        && tokens[open - 2].is_ident(source, "function")
    {
        return true;
    }
    // (…) =>
    if tokens
        .get(close + 1)
        .map(|t| t.kind == TokenKind::Arrow)
        .unwrap_or(false)
    {
        return true;
    }
    // (…): T =>
    if tokens
        .get(close + 1)
        .map(|t| t.is_punct(':'))
        .unwrap_or(false)
    {
        if let Some(end) = scan_type(tokens, close + 2, TypeStop::Return) {
            if tokens.get(end).map(|t| t.kind == TokenKind::Arrow).unwrap_or(false) {
                return true;
            }
        }
    }
    // method shorthand: name(...) followed by a body brace, where name is
    // not a call target
    if open >= 1
        && tokens[open - 1].kind == TokenKind::Ident
        && !is_keyword_head(tokens[open - 1].text(source))
    {
        let body = tokens
            .get(close + 1)
            .map(|t| t.is_punct('{'))
            .unwrap_or(false)
            || (tokens.get(close + 1).map(|t| t.is_punct(':')).unwrap_or(false)
                && scan_type(tokens, close + 2, TypeStop::Return)
                    .and_then(|end| tokens.get(end))
                    .map(|t| t.is_punct('{'))
                    .unwrap_or(false));
        if body {
            let before = open.checked_sub(2).map(|k| &tokens[k]);
            let call_target = before
                .map(|t| is_value_end(t) || t.is_punct('.'))
                .unwrap_or(false);
            if !call_target {
                return true;
            }
        }
    }
    false
}

fn strip_param_annotations(
    tokens: &[Token],
    source: &str,
    open: usize,
    close: usize,
    removals: &mut Vec<(usize, usize)>,
) {
    let mut depth = 0i32;
    let mut j = open + 1;
    while j < close {
        match tokens[j].kind {
            TokenKind::Punct('(' | '[' | '{') => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => depth -= 1,
            // Optional marker: x?: T
            TokenKind::Punct('?') if depth == 0
                && tokens.get(j + 1).map(|t| t.is_punct(':')).unwrap_or(false) =>
            {
                removals.push((tokens[j].start, tokens[j + 1].start));
            }
            TokenKind::Punct(':') if depth == 0 => {
                if let Some(end) = scan_type(tokens, j + 1, TypeStop::Param) {
                    removals.push((tokens[j].start, type_end(tokens, end, source)));
                    j = end;
                    continue;
                }
            }
            _ => {}
        }
        j += 1;
    }
}

fn match_pairs(
    tokens: &[Token],
    open: char,
    close: char,
    source: &str,
    file: &str,
) -> Result<hashbrown::HashMap<usize, usize>, BuildError> {
    let mut map = hashbrown::HashMap::new();
    let mut stack: Vec<usize> = Vec::new();
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct(open) {
            stack.push(i);
        } else if t.is_punct(close) {
            if let Some(o) = stack.pop() {
                map.insert(o, i);
            } else {
                return Err(BuildError::syntax(file, source, t.start, "unbalanced delimiter"));
            }
        }
    }
    Ok(map)
}

fn apply_removals(source: &str, mut removals: Vec<(usize, usize)>) -> String {
    removals.sort_by_key(|r| r.0);
    let mut out = String::with_capacity(source.len());
    let mut copied = 0usize;
    for (start, end) in removals {
        if start < copied {
            continue; // nested inside an earlier removal
        }
        out.push_str(&source[copied..start]);
        copied = end.max(start);
    }
    out.push_str(&source[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(src: &str) -> String {
        run(src, "test.tsx").unwrap()
    }

    #[test]
    fn lowers_self_closing_element() {
        let out = strip("var el = <App />;");
        assert!(out.contains("var el = __jsx(App, null);"), "{out}");
        assert!(out.starts_with(JSX_RUNTIME_IMPORT), "{out}");
    }

    #[test]
    fn lowers_intrinsic_with_attrs_and_children() {
        let out = strip(r#"var el = <h1 className="big" id={x}>Hello {name}</h1>;"#);
        assert!(
            out.contains(
                r#"__jsx("h1", { "className": "big", "id": x }, "Hello", name)"#
            ),
            "{out}"
        );
    }

    #[test]
    fn lowers_nested_elements_inside_expressions() {
        let out = strip("var list = <ul>{items.map(function (i) { return <li>{i}</li>; })}</ul>;");
        assert!(out.contains(r#"__jsx("ul", null,"#), "{out}");
        assert!(out.contains(r#"__jsx("li", null, i)"#), "{out}");
    }

    #[test]
    fn spread_props_become_object_assign() {
        let out = strip("var el = <App {...rest} id={1} />;");
        assert!(
            out.contains("__jsx(App, Object.assign({}, rest, { \"id\": 1 }))"),
            "{out}"
        );
    }

    #[test]
    fn closing_tags_never_reach_the_lexer() {
        let out = strip(r#"export var App = () => <div title="app">hi</div>;"#);
        assert!(
            out.contains(r#"__jsx("div", { "title": "app" }, "hi")"#),
            "{out}"
        );
    }

    #[test]
    fn self_closing_after_spread_lexes_cleanly() {
        let out = strip("var el = <App {...rest} />;");
        assert!(out.contains("__jsx(App, Object.assign({}, rest))"), "{out}");
    }

    #[test]
    fn division_after_markup_stays_division() {
        let out = strip("var el = <b>x</b>;\nvar half = total / 2;");
        assert!(out.contains("var half = total / 2;"), "{out}");
    }

    #[test]
    fn mismatched_closing_tag_is_a_syntax_error() {
        let err = run("var el = <div>text</span>;", "bad.tsx").unwrap_err();
        assert!(matches!(err, BuildError::Syntax { .. }), "{err}");
        assert!(err.to_string().contains("bad.tsx"), "{err}");
    }

    #[test]
    fn strips_interface_and_type_statements() {
        let out = strip("interface A { x: number; }\ntype B = A | null;\nvar ok = 1;");
        assert_eq!(out.trim(), "var ok = 1;");
    }

    #[test]
    fn strips_annotations_from_functions() {
        let out = strip("function add(a: number, b: number): number { return a + b; }");
        assert_eq!(out, "function add(a, b) { return a + b; }");
    }

    #[test]
    fn strips_arrow_param_and_return_annotations() {
        let out = strip("var f = (x: string, y?: number): string => x;");
        assert_eq!(out, "var f = (x, y) => x;");
    }

    #[test]
    fn strips_declarator_annotation_and_cast() {
        let out = strip("var n: number = compute() as number;");
        assert_eq!(out, "var n = compute() ;");
    }

    #[test]
    fn leaves_import_aliases_alone() {
        let out = strip("import { a as b } from \"./x\";\nvar y = b;");
        assert!(out.contains("import { a as b } from \"./x\";"), "{out}");
    }

    #[test]
    fn removes_type_only_imports() {
        let out = strip("import type { Props } from \"./types\";\nvar x = 1;");
        assert_eq!(out.trim(), "var x = 1;");
    }

    #[test]
    fn removes_type_only_re_exports() {
        let out = strip("export type { Props } from \"./types\";\nvar x = 1;");
        assert_eq!(out.trim(), "var x = 1;");
    }

    #[test]
    fn plain_js_passes_through() {
        let src = "var obj = { key: 1, fn: function (a) { return a ? 1 : 2; } };";
        assert_eq!(strip(src), src);
    }
}
