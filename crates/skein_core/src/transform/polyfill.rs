use crate::transform::lexer::{tokenize, Token, TokenKind};
use crate::{BuildError, TargetEnv};

/// How a feature is detected in the token stream.
enum Pattern {
    /// `.name(` on some receiver.
    MemberCall(&'static str),
    /// A bare global identifier, not preceded by `.`.
    Global(&'static str),
    /// `Receiver.member` on a known global.
    GlobalMember(&'static str, &'static str),
}

struct Feature {
    pattern: Pattern,
    /// Oldest environment that ships the feature natively.
    native_since: TargetEnv,
    specifier: &'static str,
}

const FEATURES: &[Feature] = &[
    Feature {
        pattern: Pattern::MemberCall("find"),
        native_since: TargetEnv::Es2015,
        specifier: "polyfill/array-find",
    },
    Feature {
        pattern: Pattern::MemberCall("includes"),
        native_since: TargetEnv::Es2016,
        specifier: "polyfill/array-includes",
    },
    Feature {
        pattern: Pattern::GlobalMember("Object", "assign"),
        native_since: TargetEnv::Es2015,
        specifier: "polyfill/object-assign",
    },
    Feature {
        pattern: Pattern::Global("Promise"),
        native_since: TargetEnv::Es2015,
        specifier: "polyfill/promise",
    },
    Feature {
        pattern: Pattern::MemberCall("padStart"),
        native_since: TargetEnv::Es2017,
        specifier: "polyfill/string-pad",
    },
    Feature {
        pattern: Pattern::MemberCall("padEnd"),
        native_since: TargetEnv::Es2017,
        specifier: "polyfill/string-pad",
    },
];

/// Polyfill pass: scans for feature usage and prepends a side-effect import
/// per feature the oldest target environment lacks. Runs after the downgrade
/// pass so it sees the final shape of the code. Idempotent: an import already
/// present is never added twice.
pub fn run(source: &str, file: &str, targets: &[TargetEnv]) -> Result<String, BuildError> {
    let Some(baseline) = targets.iter().min().copied() else {
        return Ok(source.to_string());
    };
    let tokens = tokenize(source, file)?;

    let mut needed: Vec<&'static str> = Vec::new();
    for feature in FEATURES {
        if baseline >= feature.native_since {
            continue;
        }
        if needed.contains(&feature.specifier) {
            continue;
        }
        if matches(&tokens, source, &feature.pattern) {
            needed.push(feature.specifier);
        }
    }
    needed.retain(|spec| !has_import(&tokens, source, spec));
    if needed.is_empty() {
        return Ok(source.to_string());
    }

    let mut out = String::with_capacity(source.len() + needed.len() * 32);
    for spec in &needed {
        out.push_str(&format!("import \"{spec}\";\n"));
    }
    out.push_str(source);
    Ok(out)
}

fn matches(tokens: &[Token], source: &str, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::MemberCall(name) => tokens.iter().enumerate().any(|(i, t)| {
            t.is_ident(source, name)
                && i > 0
                && tokens[i - 1].is_punct('.')
                && tokens.get(i + 1).map(|n| n.is_punct('(')).unwrap_or(false)
        }),
        Pattern::Global(name) => tokens.iter().enumerate().any(|(i, t)| {
            t.is_ident(source, name) && (i == 0 || !tokens[i - 1].is_punct('.'))
        }),
        Pattern::GlobalMember(recv, member) => tokens.iter().enumerate().any(|(i, t)| {
            t.is_ident(source, recv)
                && (i == 0 || !tokens[i - 1].is_punct('.'))
                && tokens.get(i + 1).map(|n| n.is_punct('.')).unwrap_or(false)
                && tokens
                    .get(i + 2)
                    .map(|n| n.is_ident(source, member))
                    .unwrap_or(false)
        }),
    }
}

/// True when `import "<spec>";` already appears in the module.
fn has_import(tokens: &[Token], source: &str, spec: &str) -> bool {
    tokens.iter().enumerate().any(|(i, t)| {
        t.is_ident(source, "import")
            && tokens
                .get(i + 1)
                .map(|n| {
                    n.kind == TokenKind::Str && {
                        let text = n.text(source);
                        &text[1..text.len() - 1] == spec
                    }
                })
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inject(src: &str, target: TargetEnv) -> String {
        run(src, "test.js", &[target]).unwrap()
    }

    #[test]
    fn find_call_injects_for_es5() {
        let out = inject("var x = items.find(f);", TargetEnv::Es5);
        assert!(out.starts_with("import \"polyfill/array-find\";\n"));
    }

    #[test]
    fn modern_target_skips_injection() {
        let src = "var x = items.find(f);";
        assert_eq!(inject(src, TargetEnv::Es2015), src);
    }

    #[test]
    fn baseline_is_oldest_target() {
        let src = "var x = items.find(f);";
        let out = run(src, "test.js", &[TargetEnv::Es2017, TargetEnv::Es5]).unwrap();
        assert!(out.contains("polyfill/array-find"));
    }

    #[test]
    fn bare_promise_detected_member_promise_not() {
        assert!(inject("new Promise(f);", TargetEnv::Es5).contains("polyfill/promise"));
        assert!(!inject("api.Promise(f);", TargetEnv::Es5).contains("polyfill/promise"));
    }

    #[test]
    fn object_assign_needs_the_global_receiver() {
        assert!(inject("Object.assign({}, a);", TargetEnv::Es5)
            .contains("polyfill/object-assign"));
        assert!(!inject("ns.Object.assign({}, a);", TargetEnv::Es5)
            .contains("polyfill/object-assign"));
    }

    #[test]
    fn pad_variants_share_one_import() {
        let out = inject("s.padStart(2); s.padEnd(2);", TargetEnv::Es5);
        assert_eq!(out.matches("polyfill/string-pad").count(), 1);
    }

    #[test]
    fn injection_is_idempotent() {
        let once = inject("var x = items.find(f);", TargetEnv::Es5);
        let twice = inject(&once, TargetEnv::Es5);
        assert_eq!(once, twice);
    }

    #[test]
    fn feature_name_in_string_literal_is_ignored() {
        let out = inject("var s = \"items.find(\";", TargetEnv::Es5);
        assert!(!out.contains("polyfill"));
    }
}
