use std::fmt;

use chumsky::{prelude::*, span::SimpleSpan};

use crate::position::{FileId, Span};

use super::ParseError;

pub type Spanned<T> = (T, Span);
pub type Tokens<'src> = Vec<Spanned<Token<'src>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `&`
    And,
    /// `|`
    Or,
    LAnd,
    LOr,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
    /// `=~`
    Mat,
    /// `!~`
    NMat,
    Add,
    Sub,
    Mul,
    Quo,
    Not,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Op::And => "&",
            Op::Or => "|",
            Op::LAnd => "&&",
            Op::LOr => "||",
            Op::Eql => "==",
            Op::Neq => "!=",
            Op::Lss => "<",
            Op::Leq => "<=",
            Op::Gtr => ">",
            Op::Geq => ">=",
            Op::Mat => "=~",
            Op::NMat => "!~",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Quo => "/",
            Op::Not => "!",
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token<'src> {
    Ident(&'src str),
    Int(&'src str),
    Float(&'src str),
    /// A string or bytes literal, quotes included.
    Str(&'src str),
    /// A string with `\(..)` parts, together with the spans of the part bodies.
    Interp(&'src str, Vec<Span>),
    /// An unterminated string; already reported by the lexer.
    Error(&'src str),
    /// `_|_`
    Bottom,
    Op(Op),
    Colon,
    Comma,
    Question,
    Dot,
    Ellipsis,
    /// `=`
    Bind,
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    /// Automatic separator, kept only after tokens that may end a declaration.
    Newline,
}

impl Token<'_> {
    pub fn ends_statement(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Interp(..)
                | Token::Error(_)
                | Token::Bottom
                | Token::RParen
                | Token::RBrack
                | Token::RBrace
        )
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(text)
            | Token::Int(text)
            | Token::Float(text)
            | Token::Str(text)
            | Token::Interp(text, _)
            | Token::Error(text) => f.write_str(text),
            Token::Bottom => f.write_str("_|_"),
            Token::Op(op) => write!(f, "{op}"),
            Token::Colon => f.write_str(":"),
            Token::Comma => f.write_str(","),
            Token::Question => f.write_str("?"),
            Token::Dot => f.write_str("."),
            Token::Ellipsis => f.write_str("..."),
            Token::Bind => f.write_str("="),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBrack => f.write_str("["),
            Token::RBrack => f.write_str("]"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::Newline => f.write_str("newline"),
        }
    }
}

pub type Extra<'src> = extra::Err<Rich<'src, char, SimpleSpan>>;

/// Tokenizes `input`, which starts at byte `offset` of `file`. Newlines that
/// cannot end a declaration are dropped here so the parser only ever sees
/// meaningful separators.
pub fn tokenize(file: FileId, offset: usize, input: &str) -> (Tokens<'_>, Vec<ParseError>) {
    let (tokens, errors) = lexer(file, offset).parse(input).into_output_errors();

    let errors = errors
        .into_iter()
        .map(|e| {
            let span = e.span();
            ParseError::new(e.to_string(), Span::new(file, offset + span.start, offset + span.end))
        })
        .collect();

    let mut kept: Tokens<'_> = Vec::new();
    for (token, span) in tokens.unwrap_or_default() {
        if token == Token::Newline && !kept.last().is_some_and(|(last, _)| last.ends_statement()) {
            continue;
        }
        kept.push((token, span));
    }
    (kept, errors)
}

pub fn lexer<'src>(file: FileId, offset: usize) -> impl Parser<'src, &'src str, Tokens<'src>, Extra<'src>> {
    let to_span = move |span: SimpleSpan| Span::new(file, offset + span.start, offset + span.end);

    let digit = any().filter(|c: &char| c.is_ascii_digit());
    let digits = digit.clone().then(digit.or(just('_')).repeated()).ignored();

    let radix = just('0')
        .then(one_of("xXoObB"))
        .then(any().filter(|c: &char| c.is_ascii_hexdigit() || *c == '_').repeated().at_least(1))
        .to_slice()
        .map(Token::Int);

    let exponent = one_of("eE").then(one_of("+-").or_not()).then(digits.clone());
    // 1K, 2Mi, 1.5G
    let multiplier = one_of("KMGTP").then(just('i').or_not());
    let decimal = choice((
        digits.clone().then(just('.').then(digits.clone()).or_not()).ignored(),
        just('.').then(digits).ignored(),
    ))
    .then(exponent.or_not())
    .then(multiplier.or_not())
    .to_slice()
    .map(number);

    let escape = just('\\').then(any()).ignored();

    // `\( .. )` bodies: balanced parentheses and nested simple strings
    let body_escape = escape.clone();
    let interpolation_body = recursive(move |body| {
        let quoted = just('"')
            .then(none_of("\"\\\n").ignored().or(body_escape).repeated())
            .then(just('"'))
            .ignored();
        choice((
            quoted,
            body.delimited_by(just('('), just(')')).ignored(),
            none_of("()\"\n").ignored(),
        ))
        .repeated()
    });
    let interpolation = just("\\(")
        .ignore_then(interpolation_body.map_with(move |_, e| to_span(e.span())))
        .then_ignore(just(')'));

    let single_line = |quote: char| {
        just(quote)
            .ignore_then(
                choice((
                    interpolation.clone().map(Some),
                    escape.clone().to(None),
                    none_of([quote, '\\', '\n']).to(None),
                ))
                .repeated()
                .collect::<Vec<_>>(),
            )
            .then_ignore(just(quote))
    };
    let multi_line = |quotes: &'static str| {
        just(quotes)
            .ignore_then(
                choice((
                    interpolation.clone().map(Some),
                    escape.clone().to(None),
                    any().and_is(just(quotes).not()).to(None),
                ))
                .repeated()
                .collect::<Vec<_>>(),
            )
            .then_ignore(just(quotes))
    };
    let string = choice((
        multi_line("\"\"\""),
        multi_line("'''"),
        single_line('"'),
        single_line('\''),
    ))
    .map_with(|parts, e| {
        let parts: Vec<Span> = parts.into_iter().flatten().collect();
        if parts.is_empty() {
            Token::Str(e.slice())
        } else {
            Token::Interp(e.slice(), parts)
        }
    });

    let raw_string = just("#\"")
        .then(any().and_is(just("\"#").not()).repeated())
        .then(just("\"#"))
        .to_slice()
        .map(Token::Str);

    let unterminated = one_of("\"'")
        .then(none_of("\n").repeated())
        .to_slice()
        .validate(|text, e, emitter| {
            emitter.emit(Rich::custom(e.span(), "string literal not terminated"));
            Token::Error(text)
        });

    let ident = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || matches!(c, '_' | '$' | '#'))
        .then(any().filter(|c: &char| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#')).repeated())
        .to_slice()
        .map(Token::Ident);

    // Lexer prioritizes the first defined token when ambiguous
    // therefore longer tokens must be defined before shorter ones
    let multi_op = choice((
        just("...").to(Token::Ellipsis),
        just("&&").to(Token::Op(Op::LAnd)),
        just("||").to(Token::Op(Op::LOr)),
        just("==").to(Token::Op(Op::Eql)),
        just("!=").to(Token::Op(Op::Neq)),
        just("<=").to(Token::Op(Op::Leq)),
        just(">=").to(Token::Op(Op::Geq)),
        just("=~").to(Token::Op(Op::Mat)),
        just("!~").to(Token::Op(Op::NMat)),
    ));

    let single_op = choice((
        just('&').to(Op::And),
        just('|').to(Op::Or),
        just('+').to(Op::Add),
        just('-').to(Op::Sub),
        just('*').to(Op::Mul),
        just('/').to(Op::Quo),
        just('<').to(Op::Lss),
        just('>').to(Op::Gtr),
        just('!').to(Op::Not),
    ))
    .map(Token::Op);

    let ctrl = choice((
        just(':').to(Token::Colon),
        just(',').to(Token::Comma),
        just('?').to(Token::Question),
        just('.').to(Token::Dot),
        just('=').to(Token::Bind),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBrack),
        just(']').to(Token::RBrack),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
    ));

    let token = choice((
        just('\n').to(Token::Newline),
        raw_string,
        string,
        unterminated,
        radix,
        decimal,
        just("_|_").to(Token::Bottom),
        ident,
        multi_op,
        single_op,
        ctrl,
    ));

    let comment = just("//").then(any().and_is(just('\n').not()).repeated());
    let padding = one_of(" \t\r").ignored().or(comment.ignored()).repeated();

    padding.clone().ignore_then(
        token
            .map_with(move |t, e| (t, to_span(e.span())))
            .then_ignore(padding)
            // If we encounter an error, skip and attempt to lex the next character as a token instead
            .recover_with(skip_then_retry_until(any().ignored(), end()))
            .repeated()
            .collect(),
    )
}

fn number(raw: &str) -> Token<'_> {
    if raw.ends_with(['K', 'M', 'G', 'T', 'P', 'i']) {
        Token::Int(raw)
    } else if raw.contains(['.', 'e', 'E']) {
        Token::Float(raw)
    } else {
        Token::Int(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Token as T;

    fn tokens(src: &str) -> Vec<Token<'_>> {
        let (tokens, errors) = tokenize(FileId(0), 0, src);
        assert!(errors.is_empty(), "{errors:?}");
        tokens.into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn test_field_tokens() {
        assert_eq!(tokens("a: 1\nb: a + 1"), vec![
            T::Ident("a"),
            T::Colon,
            T::Int("1"),
            T::Newline,
            T::Ident("b"),
            T::Colon,
            T::Ident("a"),
            T::Op(Op::Add),
            T::Int("1"),
        ]);
    }

    #[test]
    fn test_newline_only_after_statement_end() {
        assert_eq!(tokens("a: {\n\tb: 1\n}\n"), vec![
            T::Ident("a"),
            T::Colon,
            T::LBrace,
            T::Ident("b"),
            T::Colon,
            T::Int("1"),
            T::Newline,
            T::RBrace,
            T::Newline,
        ]);
        assert_eq!(tokens("a: 1 +\n 2"), vec![
            T::Ident("a"),
            T::Colon,
            T::Int("1"),
            T::Op(Op::Add),
            T::Int("2"),
        ]);
    }

    #[test]
    fn test_comments_and_definitions() {
        assert_eq!(tokens("// hi\n#Def: _|_ // tail"), vec![T::Ident("#Def"), T::Colon, T::Bottom]);
        assert_eq!(tokens("_#hidden: a / b"), vec![
            T::Ident("_#hidden"),
            T::Colon,
            T::Ident("a"),
            T::Op(Op::Quo),
            T::Ident("b"),
        ]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("1 1.5 1e3 0xFF 2Ki 1_000 .5"), vec![
            T::Int("1"),
            T::Float("1.5"),
            T::Float("1e3"),
            T::Int("0xFF"),
            T::Int("2Ki"),
            T::Int("1_000"),
            T::Float(".5"),
        ]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(tokens(r##"'b' #"raw\"# "a\"b""##), vec![
            T::Str("'b'"),
            T::Str(r##"#"raw\"#"##),
            T::Str(r#""a\"b""#),
        ]);
        assert_eq!(tokens("\"\"\"\n\tmulti\n\t\"\"\""), vec![T::Str("\"\"\"\n\tmulti\n\t\"\"\"")]);
    }

    #[test]
    fn test_interpolation_spans() {
        let src = r#"x: "a\(b + "c")d""#;
        let (tokens, errors) = tokenize(FileId(0), 0, src);
        assert!(errors.is_empty(), "{errors:?}");
        let Some((T::Interp(raw, parts), span)) = tokens.last() else {
            panic!("expected interpolation, got {tokens:?}");
        };
        assert_eq!(*raw, &src[3..]);
        assert_eq!(parts.len(), 1);
        assert_eq!(&src[parts[0].byte_range()], r#"b + "c""#);
        assert_eq!(span.end, src.len());
    }

    #[test]
    fn test_offset_spans() {
        let (tokens, _) = tokenize(FileId(3), 10, "y.z");
        let spans: Vec<_> = tokens.iter().map(|(_, span)| (span.file, span.start, span.end)).collect();
        assert_eq!(spans, vec![(FileId(3), 10, 11), (FileId(3), 11, 12), (FileId(3), 12, 13)]);
    }

    #[test]
    fn test_unterminated_string_is_reported() {
        let (tokens, errors) = tokenize(FileId(0), 0, "a: \"abc\nb: 1");
        let tokens: Vec<_> = tokens.into_iter().map(|(token, _)| token).collect();
        assert_eq!(tokens, vec![
            T::Ident("a"),
            T::Colon,
            T::Error("\"abc"),
            T::Newline,
            T::Ident("b"),
            T::Colon,
            T::Int("1"),
        ]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "string literal not terminated");
        assert_eq!((errors[0].span.start, errors[0].span.end), (3, 7));
    }

    #[test]
    fn test_illegal_character_is_skipped() {
        let (tokens, errors) = tokenize(FileId(0), 0, "a: 1 @ 2");
        assert!(!errors.is_empty());
        let tokens: Vec<_> = tokens.into_iter().map(|(token, _)| token).collect();
        assert_eq!(tokens, vec![T::Ident("a"), T::Colon, T::Int("1"), T::Int("2")]);
    }
}
