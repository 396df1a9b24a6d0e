use crate::transform::lexer::{tokenize, Token, TokenKind};
use crate::BuildError;

/// Downgrade pass: rewrites newer-syntax constructs into older-syntax
/// equivalents. Arrow functions become `function` expressions, `let`/`const`
/// become `var`, flat destructuring declarations become sequential member
/// reads. Shapes outside that set pass through unchanged.
pub fn run(source: &str, file: &str) -> Result<String, BuildError> {
    let code = rewrite_decl_keywords(source, file)?;
    let code = rewrite_arrows(&code, file)?;
    let code = rewrite_destructuring(&code, file)?;
    Ok(code)
}

fn rewrite_decl_keywords(source: &str, file: &str) -> Result<String, BuildError> {
    let tokens = tokenize(source, file)?;
    let mut out = String::with_capacity(source.len());
    let mut copied = 0usize;
    for (i, t) in tokens.iter().enumerate() {
        if t.kind == TokenKind::Ident
            && matches!(t.text(source), "let" | "const")
            && (i == 0 || !tokens[i - 1].is_punct('.'))
            && !tokens.get(i + 1).map(|n| n.is_punct(':')).unwrap_or(false)
        {
            out.push_str(&source[copied..t.start]);
            out.push_str("var");
            copied = t.end;
        }
    }
    out.push_str(&source[copied..]);
    Ok(out)
}

/// Rewrites arrows innermost-last: each round takes the rightmost `=>`,
/// splices in a `function` form and re-tokenizes. Every round removes one
/// arrow and introduces none, so the loop terminates.
fn rewrite_arrows(source: &str, file: &str) -> Result<String, BuildError> {
    let mut code = source.to_string();
    loop {
        let tokens = tokenize(&code, file)?;
        let Some(idx) = tokens.iter().rposition(|t| t.kind == TokenKind::Arrow) else {
            break;
        };
        let Some(rewritten) = rewrite_one_arrow(&code, &tokens, idx) else {
            // Malformed shape; leave remaining arrows untouched.
            break;
        };
        code = rewritten;
    }
    Ok(code)
}

fn rewrite_one_arrow(code: &str, tokens: &[Token], arrow: usize) -> Option<String> {
    // Parameters end at the token just before the arrow.
    let prev = tokens.get(arrow.checked_sub(1)?)?;
    let (params_text, params_start, before_params) = if prev.is_punct(')') {
        let mut depth = 0i32;
        let mut open = None;
        for j in (0..arrow - 1).rev() {
            match tokens[j].kind {
                TokenKind::Punct(')') => depth += 1,
                TokenKind::Punct('(') => {
                    if depth == 0 {
                        open = Some(j);
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        let open = open?;
        (
            code[tokens[open].start..prev.end].to_string(),
            tokens[open].start,
            open.checked_sub(1),
        )
    } else if prev.kind == TokenKind::Ident {
        (
            format!("({})", prev.text(code)),
            prev.start,
            (arrow - 1).checked_sub(1),
        )
    } else {
        return None;
    };

    let (prefix, splice_start) = match before_params.map(|j| &tokens[j]) {
        Some(t) if t.is_ident(code, "async") => ("async function ", t.start),
        _ => ("function ", params_start),
    };

    let body_tok = tokens.get(arrow + 1)?;
    if body_tok.is_punct('{') {
        let mut depth = 0i32;
        for j in arrow + 1..tokens.len() {
            match tokens[j].kind {
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &code[body_tok.start..tokens[j].end];
                        return Some(format!(
                            "{}{}{}{}{}",
                            &code[..splice_start],
                            prefix,
                            params_text,
                            format_args!(" {body}"),
                            &code[tokens[j].end..]
                        ));
                    }
                }
                _ => {}
            }
        }
        None
    } else {
        // Expression body: runs to a top-level `,`, `;`, a closing delimiter
        // of the surrounding context, or the `:` of an enclosing conditional.
        // A `:` matching a `?` seen inside the body belongs to the body.
        let mut depth = 0i32;
        let mut ternary = 0i32;
        let mut end = code.len();
        for j in arrow + 1..tokens.len() {
            match tokens[j].kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    if depth == 0 {
                        end = tokens[j].start;
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Punct('?') if depth == 0 => ternary += 1,
                TokenKind::Punct(':') if depth == 0 => {
                    if ternary == 0 {
                        end = tokens[j].start;
                        break;
                    }
                    ternary -= 1;
                }
                TokenKind::Punct(',' | ';') if depth == 0 => {
                    end = tokens[j].start;
                    break;
                }
                _ => {}
            }
        }
        let expr = code[body_tok.start..end].trim_end();
        Some(format!(
            "{}{}{}{}{}",
            &code[..splice_start],
            prefix,
            params_text,
            format_args!(" {{ return {expr}; }}"),
            &code[end..]
        ))
    }
}

/// `var {a, b: c, d = 1} = expr;` and `var [x, , y] = expr;` become a temp
/// assignment plus one `var` per binding. Nested or rest patterns are left
/// unchanged.
fn rewrite_destructuring(source: &str, file: &str) -> Result<String, BuildError> {
    let tokens = tokenize(source, file)?;
    let mut out = String::with_capacity(source.len());
    let mut copied = 0usize;
    let mut counter = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        let t = &tokens[i];
        let stmt_head = i == 0
            || matches!(tokens[i - 1].kind, TokenKind::Punct(';' | '{' | '}'));
        if t.is_ident(source, "var")
            && stmt_head
            && matches!(
                tokens.get(i + 1).map(|n| n.kind),
                Some(TokenKind::Punct('{')) | Some(TokenKind::Punct('['))
            )
        {
            if let Some((replacement, after)) =
                rewrite_one_destructuring(source, &tokens, i, &mut counter)
            {
                out.push_str(&source[copied..t.start]);
                out.push_str(&replacement);
                copied = after;
                while i < tokens.len() && tokens[i].start < after {
                    i += 1;
                }
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&source[copied..]);
    Ok(out)
}

enum Binding {
    Object {
        key: String,
        local: String,
        default: Option<String>,
    },
    Array {
        index: usize,
        local: String,
        default: Option<String>,
    },
}

fn rewrite_one_destructuring(
    source: &str,
    tokens: &[Token],
    var_idx: usize,
    counter: &mut usize,
) -> Option<(String, usize)> {
    let open = var_idx + 1;
    let is_object = tokens[open].is_punct('{');
    let (close_ch, open_ch) = if is_object { ('}', '{') } else { (']', '[') };

    let mut close = None;
    let mut depth = 0i32;
    for j in open..tokens.len() {
        match tokens[j].kind {
            TokenKind::Punct(c) if c == open_ch => depth += 1,
            TokenKind::Punct(c) if c == close_ch => {
                depth -= 1;
                if depth == 0 {
                    close = Some(j);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    if !tokens.get(close + 1)?.is_punct('=') {
        return None;
    }

    let bindings = parse_flat_pattern(source, &tokens[open + 1..close], is_object)?;

    // Initializer runs to the statement-ending `;`.
    let init_start = tokens.get(close + 2)?.start;
    let mut init_end = source.len();
    let mut after = source.len();
    let mut depth = 0i32;
    for j in close + 2..tokens.len() {
        match tokens[j].kind {
            TokenKind::Punct('(' | '[' | '{') => depth += 1,
            TokenKind::Punct(')' | ']' | '}') => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            TokenKind::Punct(';') if depth == 0 => {
                init_end = tokens[j].start;
                after = tokens[j].end;
                break;
            }
            _ => {}
        }
    }
    let init = source[init_start..init_end].trim_end();

    let tmp = format!("__skein_d{counter}");
    *counter += 1;
    let mut text = format!("var {tmp} = {init};");
    for binding in bindings {
        let (local, target, default) = match binding {
            Binding::Object { key, local, default } => {
                (local, format!("{tmp}.{key}"), default)
            }
            Binding::Array { index, local, default } => {
                (local, format!("{tmp}[{index}]"), default)
            }
        };
        match default {
            Some(default) => text.push_str(&format!(
                " var {local} = {target} === undefined ? {default} : {target};"
            )),
            None => text.push_str(&format!(" var {local} = {target};")),
        }
    }
    Some((text, after))
}

/// Parses the tokens between the pattern delimiters; `None` means the
/// pattern has a shape this pass does not rewrite.
fn parse_flat_pattern(source: &str, tokens: &[Token], is_object: bool) -> Option<Vec<Binding>> {
    let mut bindings = Vec::new();
    let mut index = 0usize;
    let mut i = 0usize;
    while i < tokens.len() {
        if tokens[i].is_punct(',') {
            index += 1;
            i += 1;
            continue;
        }
        if tokens[i].kind != TokenKind::Ident {
            return None;
        }
        let first = tokens[i].text(source).to_string();
        i += 1;

        let key = first.clone();
        let mut local = first;
        if is_object && tokens.get(i).map(|t| t.is_punct(':')).unwrap_or(false) {
            let renamed = tokens.get(i + 1)?;
            if renamed.kind != TokenKind::Ident {
                return None;
            }
            local = renamed.text(source).to_string();
            i += 2;
        }

        let mut default = None;
        if tokens.get(i).map(|t| t.is_punct('=')).unwrap_or(false) {
            // Default expression: tokens until a top-level comma.
            let start = tokens.get(i + 1)?.start;
            let mut depth = 0i32;
            let mut j = i + 1;
            let mut end = tokens.last()?.end;
            while j < tokens.len() {
                match tokens[j].kind {
                    TokenKind::Punct('(' | '[' | '{') => depth += 1,
                    TokenKind::Punct(')' | ']' | '}') => depth -= 1,
                    TokenKind::Punct(',') if depth == 0 => {
                        end = tokens[j].start;
                        break;
                    }
                    _ => {}
                }
                j += 1;
            }
            default = Some(source[start..end].trim_end().to_string());
            i = j;
        }

        if is_object {
            bindings.push(Binding::Object {
                key,
                local,
                default,
            });
        } else {
            bindings.push(Binding::Array {
                index,
                local,
                default,
            });
        }

        match tokens.get(i) {
            None => break,
            Some(t) if t.is_punct(',') => {
                index += 1;
                i += 1;
            }
            _ => return None,
        }
    }
    Some(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(src: &str) -> String {
        run(src, "test.js").unwrap()
    }

    #[test]
    fn let_and_const_become_var() {
        assert_eq!(down("let a = 1; const b = 2;"), "var a = 1; var b = 2;");
    }

    #[test]
    fn member_named_const_is_untouched() {
        assert_eq!(down("obj.const = 1;"), "obj.const = 1;");
    }

    #[test]
    fn block_body_arrow() {
        assert_eq!(
            down("var f = (a, b) => { return a + b; };"),
            "var f = function (a, b) { return a + b; };"
        );
    }

    #[test]
    fn expression_body_arrow() {
        assert_eq!(
            down("var double = x => x * 2;"),
            "var double = function (x) { return x * 2; };"
        );
    }

    #[test]
    fn arrow_argument_ends_at_call_paren() {
        assert_eq!(
            down("items.map(x => x + 1);"),
            "items.map(function (x) { return x + 1; });"
        );
    }

    #[test]
    fn nested_arrows() {
        assert_eq!(
            down("var add = a => b => a + b;"),
            "var add = function (a) { return function (b) { return a + b; }; };"
        );
    }

    #[test]
    fn arrows_in_both_conditional_branches() {
        assert_eq!(
            down("var pick = cond ? x => 1 : y => 2;"),
            "var pick = cond ? function (x) { return 1; } : function (y) { return 2; };"
        );
    }

    #[test]
    fn conditional_inside_arrow_body_is_kept_whole() {
        assert_eq!(
            down("var f = x => x ? 1 : 2;"),
            "var f = function (x) { return x ? 1 : 2; };"
        );
    }

    #[test]
    fn async_arrow_keeps_async() {
        assert_eq!(
            down("var go = async () => { await x; };"),
            "var go = async function () { await x; };"
        );
    }

    #[test]
    fn object_destructuring_becomes_member_reads() {
        assert_eq!(
            down("var {a, b: c, d = 1} = src;"),
            "var __skein_d0 = src; var a = __skein_d0.a; \
             var c = __skein_d0.b; \
             var d = __skein_d0.d === undefined ? 1 : __skein_d0.d;"
        );
    }

    #[test]
    fn array_destructuring_uses_indices() {
        assert_eq!(
            down("var [x, , y] = pair;"),
            "var __skein_d0 = pair; var x = __skein_d0[0]; var y = __skein_d0[2];"
        );
    }

    #[test]
    fn nested_pattern_passes_through() {
        let src = "var {a: {b}} = src;";
        assert_eq!(down(src), src);
    }

    #[test]
    fn arrows_inside_template_literals_are_untouched() {
        let src = "var s = `x => y`;";
        assert_eq!(down(src), src);
    }
}
