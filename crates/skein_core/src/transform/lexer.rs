use crate::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Str,
    Template,
    Number,
    Regex,
    /// The two-character `=>` token.
    Arrow,
    Punct(char),
}

/// A span into the original source. Whitespace and comments are skipped and
/// never produce tokens, so neighbouring tokens are always significant.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_ident(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text(source) == word
    }

    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct(ch)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphanumeric()
}

/// Keywords after which a `/` starts a regex and a `<` may start markup.
fn is_prefix_keyword(word: &str) -> bool {
    matches!(
        word,
        "return"
            | "typeof"
            | "instanceof"
            | "in"
            | "of"
            | "new"
            | "delete"
            | "void"
            | "case"
            | "do"
            | "else"
            | "await"
            | "yield"
            | "throw"
    )
}

/// Coarse source scanner shared by every pass: splits code into identifier,
/// literal and punctuation spans while skipping whitespace and comments.
/// It does not parse; passes interpret the token stream themselves.
pub struct Lexer<'a> {
    source: &'a str,
    file: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: &'a str) -> Self {
        Self {
            source,
            file,
            chars: source.char_indices().collect(),
            idx: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, BuildError> {
        let mut tokens: Vec<Token> = Vec::new();
        while let Some(token) = self.next_token(tokens.last())? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Lexes the next token, or `None` at end of input. `prev` drives the
    /// regex-vs-division decision, so a caller pulling tokens one at a time
    /// must thread the last token it kept through.
    pub fn next_token(&mut self, prev: Option<&Token>) -> Result<Option<Token>, BuildError> {
        while let Some(&(pos, ch)) = self.chars.get(self.idx) {
            if ch.is_whitespace() {
                self.idx += 1;
                continue;
            }
            let token = match ch {
                '/' => match self.peek_char(1) {
                    Some('/') => {
                        self.skip_line_comment();
                        continue;
                    }
                    Some('*') => {
                        self.skip_block_comment(pos)?;
                        continue;
                    }
                    _ => {
                        if regex_allowed(prev, self.source) {
                            self.read_regex(pos)?
                        } else {
                            self.idx += 1;
                            Token {
                                kind: TokenKind::Punct('/'),
                                start: pos,
                                end: pos + 1,
                            }
                        }
                    }
                },
                '"' | '\'' => self.read_string(pos, ch)?,
                '`' => self.read_template(pos)?,
                '=' if self.peek_char(1) == Some('>') => {
                    self.idx += 2;
                    Token {
                        kind: TokenKind::Arrow,
                        start: pos,
                        end: pos + 2,
                    }
                }
                '0'..='9' => self.read_number(pos),
                _ if is_ident_start(ch) => self.read_ident(pos),
                _ => {
                    self.idx += 1;
                    Token {
                        kind: TokenKind::Punct(ch),
                        start: pos,
                        end: pos + ch.len_utf8(),
                    }
                }
            };
            return Ok(Some(token));
        }
        Ok(None)
    }

    /// Advances the cursor to byte offset `pos`. Used after a source region
    /// has been consumed by a different parser.
    pub fn seek(&mut self, pos: usize) {
        while self
            .chars
            .get(self.idx)
            .map(|&(p, _)| p < pos)
            .unwrap_or(false)
        {
            self.idx += 1;
        }
    }

    fn peek_char(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).map(|&(_, c)| c)
    }

    fn cur_pos(&self) -> usize {
        self.chars
            .get(self.idx)
            .map(|&(p, _)| p)
            .unwrap_or(self.source.len())
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek_char(0) {
            if c == '\n' {
                break;
            }
            self.idx += 1;
        }
    }

    fn skip_block_comment(&mut self, start: usize) -> Result<(), BuildError> {
        self.idx += 2;
        while let Some(c) = self.peek_char(0) {
            if c == '*' && self.peek_char(1) == Some('/') {
                self.idx += 2;
                return Ok(());
            }
            self.idx += 1;
        }
        Err(BuildError::syntax(
            self.file,
            self.source,
            start,
            "unterminated block comment",
        ))
    }

    fn read_string(&mut self, start: usize, quote: char) -> Result<Token, BuildError> {
        self.idx += 1;
        while let Some(c) = self.peek_char(0) {
            if c == '\\' {
                self.idx += 2;
                continue;
            }
            if c == quote {
                self.idx += 1;
                return Ok(Token {
                    kind: TokenKind::Str,
                    start,
                    end: self.cur_pos(),
                });
            }
            self.idx += 1;
        }
        Err(BuildError::syntax(
            self.file,
            self.source,
            start,
            "unterminated string literal",
        ))
    }

    /// Reads a template literal including `${}` interpolations, which may
    /// themselves contain strings, braces and nested templates.
    fn read_template(&mut self, start: usize) -> Result<Token, BuildError> {
        self.idx += 1;
        while let Some(c) = self.peek_char(0) {
            match c {
                '\\' => self.idx += 2,
                '`' => {
                    self.idx += 1;
                    return Ok(Token {
                        kind: TokenKind::Template,
                        start,
                        end: self.cur_pos(),
                    });
                }
                '$' if self.peek_char(1) == Some('{') => {
                    self.idx += 2;
                    self.skip_interpolation(start)?;
                }
                _ => self.idx += 1,
            }
        }
        Err(BuildError::syntax(
            self.file,
            self.source,
            start,
            "unterminated template literal",
        ))
    }

    fn skip_interpolation(&mut self, template_start: usize) -> Result<(), BuildError> {
        let mut depth = 1usize;
        while let Some(c) = self.peek_char(0) {
            match c {
                '{' => {
                    depth += 1;
                    self.idx += 1;
                }
                '}' => {
                    depth -= 1;
                    self.idx += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                '"' | '\'' => {
                    let pos = self.cur_pos();
                    self.read_string(pos, c)?;
                }
                '`' => {
                    let pos = self.cur_pos();
                    self.read_template(pos)?;
                }
                _ => self.idx += 1,
            }
        }
        Err(BuildError::syntax(
            self.file,
            self.source,
            template_start,
            "unterminated template interpolation",
        ))
    }

    fn read_regex(&mut self, start: usize) -> Result<Token, BuildError> {
        self.idx += 1;
        let mut in_class = false;
        while let Some(c) = self.peek_char(0) {
            match c {
                '\\' => self.idx += 2,
                '[' => {
                    in_class = true;
                    self.idx += 1;
                }
                ']' => {
                    in_class = false;
                    self.idx += 1;
                }
                '/' if !in_class => {
                    self.idx += 1;
                    while let Some(f) = self.peek_char(0) {
                        if is_ident_continue(f) {
                            self.idx += 1;
                        } else {
                            break;
                        }
                    }
                    return Ok(Token {
                        kind: TokenKind::Regex,
                        start,
                        end: self.cur_pos(),
                    });
                }
                '\n' => break,
                _ => self.idx += 1,
            }
        }
        Err(BuildError::syntax(
            self.file,
            self.source,
            start,
            "unterminated regular expression",
        ))
    }

    fn read_number(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek_char(0) {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                self.idx += 1;
            } else {
                break;
            }
        }
        Token {
            kind: TokenKind::Number,
            start,
            end: self.cur_pos(),
        }
    }

    fn read_ident(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek_char(0) {
            if is_ident_continue(c) {
                self.idx += 1;
            } else {
                break;
            }
        }
        Token {
            kind: TokenKind::Ident,
            start,
            end: self.cur_pos(),
        }
    }
}

/// After a value-producing token `/` is division; everywhere else it opens a
/// regex literal.
fn regex_allowed(prev: Option<&Token>, source: &str) -> bool {
    match prev {
        None => true,
        Some(t) => match t.kind {
            TokenKind::Punct(c) => !matches!(c, ')' | ']'),
            TokenKind::Arrow => true,
            TokenKind::Ident => is_prefix_keyword(t.text(source)),
            _ => false,
        },
    }
}

/// True when a `<` at this position may open markup rather than compare.
pub fn markup_allowed(prev: Option<&Token>, source: &str) -> bool {
    match prev {
        None => true,
        Some(t) => match t.kind {
            TokenKind::Punct(c) => !matches!(c, ')' | ']'),
            TokenKind::Arrow => true,
            TokenKind::Ident => is_prefix_keyword(t.text(source)),
            _ => false,
        },
    }
}

pub fn tokenize(source: &str, file: &str) -> Result<Vec<Token>, BuildError> {
    Lexer::new(source, file).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, "test.js")
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn skips_comments_and_whitespace() {
        let toks = kinds("a // line\n/* block */ b");
        assert_eq!(toks, vec![TokenKind::Ident, TokenKind::Ident]);
    }

    #[test]
    fn arrow_is_one_token() {
        let toks = kinds("x => y");
        assert_eq!(
            toks,
            vec![TokenKind::Ident, TokenKind::Arrow, TokenKind::Ident]
        );
    }

    #[test]
    fn template_with_interpolation_is_one_token() {
        let toks = kinds("`a ${ {b: `${c}`} } d`");
        assert_eq!(toks, vec![TokenKind::Template]);
    }

    #[test]
    fn regex_vs_division() {
        assert_eq!(
            kinds("a / b"),
            vec![TokenKind::Ident, TokenKind::Punct('/'), TokenKind::Ident]
        );
        assert_eq!(
            kinds("return /ab+/g.test(s)"),
            vec![
                TokenKind::Ident,
                TokenKind::Regex,
                TokenKind::Punct('.'),
                TokenKind::Ident,
                TokenKind::Punct('('),
                TokenKind::Ident,
                TokenKind::Punct(')'),
            ]
        );
    }

    #[test]
    fn next_token_resumes_after_seek() {
        let src = "a </div> b";
        let mut lexer = Lexer::new(src, "x.js");
        let first = lexer.next_token(None).unwrap().unwrap();
        assert_eq!(first.text(src), "a");
        lexer.seek(8);
        let next = lexer.next_token(None).unwrap().unwrap();
        assert_eq!(next.text(src), "b");
    }

    #[test]
    fn unterminated_string_reports_location() {
        let err = tokenize("var a = 'oops", "x.js").unwrap_err();
        assert!(err.to_string().contains("x.js:1:9"), "{err}");
    }
}
