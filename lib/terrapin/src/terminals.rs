//! The Turtle terminal patterns from the W3C grammar, written for the
//! [`regex`] crate. The composed productions are built once at grammar
//! construction; the serializer reuses the name productions to validate the
//! QNames it prints.

/// IRIREF with embedded numeric escapes; unescaping happens in the lexer.
pub(crate) const IRIREF: &str =
    r#"<(?:[^\x00-\x20<>"{}|^`\\]|\\u[0-9A-Fa-f]{4}|\\U[0-9A-Fa-f]{8})*>"#;

pub(crate) const LANGTAG: &str = r"@[a-zA-Z]+(?:-[a-zA-Z0-9]+)*";
pub(crate) const INTEGER: &str = r"[+-]?[0-9]+";
pub(crate) const DECIMAL: &str = r"[+-]?[0-9]*\.[0-9]+";
pub(crate) const DOUBLE: &str =
    r"[+-]?(?:[0-9]+\.[0-9]*[eE][+-]?[0-9]+|\.[0-9]+[eE][+-]?[0-9]+|[0-9]+[eE][+-]?[0-9]+)";
pub(crate) const ANON: &str = r"\[\s*\]";

/// The anonymous punctuation and keyword terminal. The `@`-directives come
/// before `LANGTAG` in the registration order, so `@prefix` is never read as
/// a language tag.
pub(crate) const PUNCTUATION: &str = r"@base|@prefix|\^\^|true|false|[(),.;\[\]a]";

/// SPARQL-style directives are case-insensitive.
pub(crate) const SPARQL_PREFIX: &str = r"(?i:PREFIX)";
pub(crate) const SPARQL_BASE: &str = r"(?i:BASE)";

const ECHAR: &str = r#"\\[tbnrf"'\\]"#;
const UCHAR: &str = r"\\u[0-9A-Fa-f]{4}|\\U[0-9A-Fa-f]{8}";
const PLX: &str = r"%[0-9A-Fa-f]{2}|\\[_~.\-!$&'()*+,;=/?#@%]";

const PN_CHARS_BASE: &str = r"A-Za-z\u{00C0}-\u{00D6}\u{00D8}-\u{00F6}\u{00F8}-\u{02FF}\u{0370}-\u{037D}\u{037F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}\u{10000}-\u{EFFFF}";

fn pn_chars_u() -> String {
    format!("{PN_CHARS_BASE}_")
}

fn pn_chars() -> String {
    format!(
        r"{}\-0-9\u{{00B7}}\u{{0300}}-\u{{036F}}\u{{203F}}-\u{{2040}}",
        pn_chars_u()
    )
}

pub(crate) fn pn_prefix() -> String {
    let chars = pn_chars();
    format!(r"[{PN_CHARS_BASE}](?:[{chars}.]*[{chars}])?")
}

pub(crate) fn pname_ns() -> String {
    format!("(?:{})?:", pn_prefix())
}

pub(crate) fn pn_local() -> String {
    let u = pn_chars_u();
    let chars = pn_chars();
    format!(
        r"(?:[{u}:0-9]|{PLX})(?:(?:[{chars}.:]|{PLX})*(?:[{chars}:]|{PLX}))?"
    )
}

pub(crate) fn pname_ln() -> String {
    format!("{}{}", pname_ns(), pn_local())
}

pub(crate) fn blank_node_label() -> String {
    let u = pn_chars_u();
    let chars = pn_chars();
    format!(r"_:[{u}0-9](?:[{chars}.]*[{chars}])?")
}

pub(crate) fn string_literal_quote() -> String {
    format!(r#""(?:[^\x22\x5C\x0A\x0D]|{ECHAR}|{UCHAR})*""#)
}

pub(crate) fn string_literal_single_quote() -> String {
    format!(r"'(?:[^\x27\x5C\x0A\x0D]|{ECHAR}|{UCHAR})*'")
}

pub(crate) fn string_literal_long_quote() -> String {
    format!(r#""""(?:(?:""|")?(?:[^"\\]|{ECHAR}|{UCHAR}))*""""#)
}

pub(crate) fn string_literal_long_single_quote() -> String {
    format!(r"'''(?:(?:''|')?(?:[^'\\]|{ECHAR}|{UCHAR}))*'''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn full(pattern: &str) -> Regex {
        Regex::new(&format!(r"\A(?:{pattern})\z")).unwrap()
    }

    #[test]
    fn iriref_accepts_escapes_and_rejects_spaces() {
        let re = full(IRIREF);
        assert!(re.is_match("<http://example.com/a>"));
        assert!(re.is_match(r"<http://e/A\U00000042>"));
        assert!(!re.is_match("<http://e/a b>"));
        assert!(!re.is_match("<http://e/<>>"));
    }

    #[test]
    fn prefixed_names() {
        assert!(full(&pname_ns()).is_match("ex:"));
        assert!(full(&pname_ns()).is_match(":"));
        let ln = full(&pname_ln());
        assert!(ln.is_match("ex:a"));
        assert!(ln.is_match(":a.b"));
        assert!(ln.is_match("ex:a:b"));
        assert!(ln.is_match(r"ex:with\,escape"));
        assert!(ln.is_match("ex:%41two"));
        // A local name may not end with a dot.
        assert!(!ln.is_match("ex:a."));
    }

    #[test]
    fn blank_node_labels() {
        let re = full(&blank_node_label());
        assert!(re.is_match("_:b0"));
        assert!(re.is_match("_:0"));
        assert!(re.is_match("_:a.b"));
        assert!(!re.is_match("_:a."));
        assert!(!re.is_match("_:"));
    }

    #[test]
    fn numeric_shapes() {
        assert!(full(INTEGER).is_match("-5"));
        assert!(full(DECIMAL).is_match("-5.0"));
        assert!(!full(DECIMAL).is_match("5."));
        assert!(full(DOUBLE).is_match("4.2e9"));
        assert!(full(DOUBLE).is_match(".2E-1"));
        assert!(full(DOUBLE).is_match("5e0"));
        assert!(!full(DOUBLE).is_match("4.2"));
    }

    #[test]
    fn string_literals_span_lines_only_in_long_form() {
        assert!(full(&string_literal_quote()).is_match(r#""a\"b""#));
        assert!(!full(&string_literal_quote()).is_match("\"a\nb\""));
        let long = full(&string_literal_long_quote());
        assert!(long.is_match("\"\"\"a\nb\"\"\""));
        assert!(long.is_match(r#"""""quoted" inside""""#));
        assert!(long.is_match("\"\"\"a\"\"b\"\"\""));
    }

    #[test]
    fn anon_allows_inner_whitespace() {
        let re = full(ANON);
        assert!(re.is_match("[]"));
        assert!(re.is_match("[ \t ]"));
        assert!(!re.is_match("[a]"));
    }
}
