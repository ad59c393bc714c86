#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;

use smarthttp::script::{parse, LexerError, ParseError, RuntimeError, SmartScriptEngine};
use smarthttp::{ContextError, Cookie, RequestContext};

/// Render `source` and return the body that follows the header block.
fn render(source: &str) -> Result<String, RuntimeError> {
    render_with(source, BTreeMap::new())
}

fn render_with(source: &str, params: BTreeMap<String, String>) -> Result<String, RuntimeError> {
    let document = parse(source).unwrap();
    let mut out = Vec::new();
    let result = {
        let mut context = RequestContext::new(&mut out).with_parameters(params);
        SmartScriptEngine::new(&document, &mut context).execute()
    };
    result.map(|()| body_of(&out))
}

fn body_of(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match text.split_once("\r\n\r\n") {
        Some((_, body)) => body.to_string(),
        None => String::new(),
    }
}

#[test]
fn test_counting_loops() {
    assert_eq!(render("{$FOR i 1 3 1$}{$=i$}{$END$}").unwrap(), "123");
    assert_eq!(render("{$FOR i 3 1 -1$}{$=i$}{$END$}").unwrap(), "321");
    assert_eq!(render("{$FOR i 3 1$}x{$END$}").unwrap(), "");
    assert_eq!(render("{$ for i 0 1 0.5 $}{$= i $} {$ end $}").unwrap(), "0 0.5 1.0 ");
}

#[test]
fn test_loop_bounds_from_strings_and_variables() {
    assert_eq!(
        render("{$ FOR n 2 2 $}{$ FOR i \"1\" n $}{$= i $}{$END$}{$END$}").unwrap(),
        "12"
    );
}

#[test]
fn test_echo_keeps_written_order() {
    assert_eq!(render("{$= 1 2 + $}").unwrap(), "3");
    assert_eq!(render("{$= \"a\" \"b\" $}").unwrap(), "ab");
    assert_eq!(render("{$= 1 \"x\" 2 3 * $}").unwrap(), "1x6");
    assert_eq!(render("{$= 7 2 / 7 2.0 / $}").unwrap(), "33.5");
}

#[test]
fn test_nested_loop_shadowing_restores_outer_value() {
    assert_eq!(
        render("{$ FOR i 1 2 $}[{$ FOR i 5 6 $}{$= i $}{$END$}{$= i $}]{$END$}").unwrap(),
        "[561][562]"
    );
}

#[test]
fn test_functions() {
    assert_eq!(render("{$= 0 @sin $}").unwrap(), "0.0");
    assert_eq!(render("{$= 1234567.891 \"#,##0.00\" @decfmt $}").unwrap(), "1,234,567.89");
    assert_eq!(render("{$= 4 @dup * $}").unwrap(), "16");
    assert_eq!(render("{$= 1 2 @swap - $}").unwrap(), "1");
}

#[test]
fn test_parameter_functions() {
    let params = BTreeMap::from([("x".to_string(), "41".to_string())]);
    assert_eq!(
        render_with("{$= \"x\" 0 @paramGet 1 + \"y\" \"-\" @paramGet $}", params).unwrap(),
        "42-"
    );
    assert_eq!(
        render(
            "{$= \"v\" \"k\" @tparamSet \"k\" \"\" @tparamGet \"k\" @tparamDel \"k\" \"gone\" @tparamGet $}"
        )
        .unwrap(),
        "vgone"
    );
    assert_eq!(
        render("{$= 9 \"p\" @pparamSet \"p\" 0 @pparamGet \"p\" @pparamDel \"p\" 0 @pparamGet $}")
            .unwrap(),
        "90"
    );
}

#[test]
fn test_escaped_text_is_written_unescaped() {
    assert_eq!(render(r"a\\b \{$ c").unwrap(), r"a\b {$ c");
}

#[test]
fn test_runtime_errors() {
    assert!(matches!(
        render("{$= nope $}"),
        Err(RuntimeError::UndefinedVariable { .. })
    ));
    assert!(matches!(
        render("{$= 1 + $}"),
        Err(RuntimeError::StackUnderflow { .. })
    ));
    assert!(matches!(
        render("{$= 1 0 / $}"),
        Err(RuntimeError::DivisionByZero)
    ));
    assert!(matches!(
        render("{$= \"abc\" 1 + $}"),
        Err(RuntimeError::NotANumber { .. })
    ));
    assert!(matches!(
        render("{$= @dup $}"),
        Err(RuntimeError::StackUnderflow { .. })
    ));
}

#[test]
fn test_mime_change_after_output_is_a_state_error() {
    let err = render("body{$= \"text/plain\" @setMimeType $}").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Context(ContextError::HeadersAlreadySent)
    ));
}

#[test]
fn test_mime_type_with_line_break_is_rejected() {
    let err = render("{$= \"text/plain\\r\\nX-Injected: 1\" @setMimeType $}").unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Context(ContextError::InvalidHeaderValue(_))
    ));
}

#[test]
fn test_parse_errors_wrap_lexer_errors() {
    assert!(matches!(
        parse(r"bad \n escape"),
        Err(ParseError::Lexical(LexerError::InvalidEscape { .. }))
    ));
    assert!(matches!(
        parse("{$= \"open $}"),
        Err(ParseError::Lexical(LexerError::UnterminatedString { .. }))
    ));
    assert!(matches!(
        parse("{$= 1.2.3 $}"),
        Err(ParseError::Lexical(LexerError::MalformedNumber { .. }))
    ));
}

#[test]
fn test_grammar_errors() {
    assert!(matches!(parse("{$END$}"), Err(ParseError::UnmatchedEnd)));
    assert!(matches!(
        parse("{$FOR i 1 2$}"),
        Err(ParseError::UnclosedLoop { .. })
    ));
    assert!(matches!(
        parse("{$FOR i 1 2 3 4$}{$END$}"),
        Err(ParseError::TooManyLoopArguments { .. })
    ));
    assert!(matches!(
        parse("{$FOR 1 1 2$}{$END$}"),
        Err(ParseError::InvalidLoopVariable { .. })
    ));
    assert!(matches!(
        parse("{$FOR i 1 +$}{$END$}"),
        Err(ParseError::InvalidLoopBound { .. })
    ));
    assert!(matches!(
        parse("{$= @nosuch $}"),
        Err(ParseError::UnknownFunction { .. })
    ));
}

#[test]
fn test_reconstructed_source_parses_to_same_tree() {
    let source = "Text \\\\ and \\{$ here {$ FOR i -1 10.5 2 $}{$= i \"q\\\"\\n\" * @sin $}{$END$}";
    let first = parse(source).unwrap();
    let second = parse(&first.to_string()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_context_headers_and_cookies() {
    let mut out = Vec::new();
    {
        let mut context = RequestContext::new(&mut out);
        context.set_status_code(404).unwrap();
        context.set_status_text("Not Found").unwrap();
        context.set_mime_type("text/plain").unwrap();
        context.set_content_length(Some(2)).unwrap();
        context
            .add_cookie(Cookie::new("korisnik", "perica").with_path("/").with_max_age(60))
            .unwrap();
        context.write(b"ok").unwrap();
        context.write(b"").unwrap();
        assert!(matches!(
            context.set_status_code(200),
            Err(ContextError::HeadersAlreadySent)
        ));
        assert!(matches!(
            context.add_cookie(Cookie::new("late", "x")),
            Err(ContextError::HeadersAlreadySent)
        ));
    }
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "HTTP/1.1 404 Not Found\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         Content-Length: 2\r\n\
         Set-Cookie: korisnik=\"perica\"; Path=/; Max-Age=60\r\n\
         \r\n\
         ok"
    );
}
