use chumsky::{
    input::{Checkpoint, Cursor, ValueInput},
    inspector::Inspector,
    prelude::*,
};

use crate::position::{FileId, Span};

use super::{
    lexer::{tokenize, Op, Token},
    BasicLit, BinaryOp, Decl, Expr, Field, File, Ident, ImportSpec, Label, LitKind, PackageClause, ParseError,
    StructLit, UnaryOp,
};

pub type Error<'src> = Rich<'src, Token<'src>, Span>;
pub type Extra<'src> = extra::Full<Error<'src>, State<'src>, ()>;

/// Parser state: the file being parsed and the errors of the string
/// interpolations parsed on the side.
#[derive(Debug)]
pub struct State<'src> {
    pub file: FileId,
    pub source: &'src str,
    pub errors: Vec<ParseError>,
}

impl<'src> State<'src> {
    pub fn new(file: FileId, source: &'src str) -> Self {
        Self {
            file,
            source,
            errors: Vec::new(),
        }
    }

    fn interpolation(&mut self, parts: Vec<Span>, span: Span) -> Expr {
        let elts = parts
            .into_iter()
            .map(|part| {
                let (expr, errors) = parse_expr(self.file, self.source, part);
                self.errors.extend(errors);
                expr
            })
            .collect();
        Expr::Interpolation { elts, span }
    }
}

impl<'src, I> Inspector<'src, I> for State<'src>
where
    I: Input<'src>,
{
    type Checkpoint = ();
    #[inline(always)]
    fn on_token(&mut self, _token: &<I as Input<'src>>::Token) {}

    #[inline(always)]
    fn on_save<'parse>(&self, _cursor: &Cursor<'src, 'parse, I>) -> Self::Checkpoint {}

    #[inline(always)]
    fn on_rewind<'parse>(&mut self, _marker: &Checkpoint<'src, 'parse, I, Self::Checkpoint>) {}
}

impl<'src> From<Error<'src>> for ParseError {
    fn from(e: Error<'src>) -> Self {
        ParseError::new(e.to_string(), *e.span())
    }
}

/// Parses the file body of `source`.
pub fn parse_source(file: FileId, source: &str) -> (File, Vec<ParseError>) {
    let (tokens, mut errors) = tokenize(file, 0, source);
    let eoi = Span::new(file, source.len(), source.len());

    let mut state = State::new(file, source);
    let input = tokens.as_slice().map(eoi, |(t, s)| (t, s));
    let (output, parse_errors) = file_parser()
        .parse_with_state(input, &mut state)
        .into_output_errors();

    errors.extend(parse_errors.into_iter().map(ParseError::from));
    errors.append(&mut state.errors);
    finish_errors(&mut errors);

    let (package, imports, decls) = output.unwrap_or_default();
    let file = File {
        id: file,
        package,
        imports,
        decls,
        span: Span::new(file, 0, source.len()),
    };
    (file, errors)
}

/// Parses the single expression covered by `span`, the body of a string
/// interpolation.
pub fn parse_expr(file: FileId, source: &str, span: Span) -> (Expr, Vec<ParseError>) {
    let text = source.get(span.byte_range()).unwrap_or("");
    let (tokens, mut errors) = tokenize(file, span.start, text);
    let eoi = Span::new(file, span.end, span.end);

    let mut state = State::new(file, source);
    let input = tokens.as_slice().map(eoi, |(t, s)| (t, s));
    let (output, parse_errors) = expr_parser()
        .padded_by(just(Token::Newline).repeated())
        .then_ignore(end())
        .parse_with_state(input, &mut state)
        .into_output_errors();

    errors.extend(parse_errors.into_iter().map(ParseError::from));
    errors.append(&mut state.errors);
    (output.unwrap_or(Expr::Bad(span)), errors)
}

// Alternatives are parsed again after backtracking, interpolations with them
fn finish_errors(errors: &mut Vec<ParseError>) {
    errors.sort_by_key(|e| (e.span.start, e.span.end));
    errors.dedup();
}

type FileOutput = (Option<PackageClause>, Vec<ImportSpec>, Vec<Decl>);

/// Parser for a whole file.
///
/// Grammar:
/// ```bnf
/// file    ::= sep* package? import* decls
/// package ::= 'package' ident sep*
/// import  ::= 'import' (spec | '(' sep* (spec sep+)* ')') sep*
/// spec    ::= ident? string
/// decls   ::= (decl (sep+ | &close))*
/// sep     ::= ',' | newline
/// ```
pub fn file_parser<'src, I>() -> impl Parser<'src, I, FileOutput, Extra<'src>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    let package = just(Token::Ident("package"))
        .ignore_then(ident_parser())
        .map_with(|name, e| PackageClause { name, span: e.span() })
        .then_ignore(sep().repeated())
        .or_not();

    let spec = ident_parser()
        .or_not()
        .then(select! { Token::Str(raw) => raw }.map_with(|raw, e| BasicLit {
            kind: LitKind::String,
            value: raw.to_string(),
            span: e.span(),
        }))
        .map_with(|(name, path), e| ImportSpec {
            name,
            path,
            span: e.span(),
        });

    let close = just(Token::RParen).ignored().rewind();
    let terminator = sep()
        .repeated()
        .at_least(1)
        .ignored()
        .or(close.clone())
        .recover_with(via_parser(skip_until(close.clone()).then_ignore(sep().repeated())));
    let spec_item = spec
        .clone()
        .map(Some)
        .recover_with(via_parser(skip_until(close).to(None)))
        .then_ignore(terminator);
    let group = sep()
        .repeated()
        .ignore_then(spec_item.repeated().collect::<Vec<_>>())
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map(|specs| specs.into_iter().flatten().collect::<Vec<_>>());

    let import = just(Token::Ident("import"))
        .ignore_then(choice((group, spec.map(|spec| vec![spec]))))
        .then_ignore(sep().repeated());
    let imports = import
        .repeated()
        .collect::<Vec<_>>()
        .map(|groups| groups.into_iter().flatten().collect::<Vec<_>>());

    let decls = decl_list(decl_parser(expr_parser()), end());

    sep()
        .repeated()
        .ignore_then(package)
        .then(imports)
        .then(decls)
        .map(|((package, imports), decls)| (package, imports, decls))
        .then_ignore(end())
}

/// Declarations up to `close`, which is not consumed. A declaration that
/// cannot be parsed becomes [`Decl::Bad`] covering the tokens up to the next
/// separator.
fn decl_list<'src, I, D, C>(decl: D, close: C) -> impl Parser<'src, I, Vec<Decl>, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    D: Parser<'src, I, Decl, Extra<'src>> + Clone,
    C: Parser<'src, I, (), Extra<'src>> + Clone,
{
    let bad = skip_until(close.clone())
        .map_with(|_, e| Decl::Bad(e.span()))
        .then_ignore(sep().repeated());
    let item = decl
        .then_ignore(sep().repeated().at_least(1).ignored().or(close))
        .recover_with(via_parser(bad));

    sep().repeated().ignore_then(item.repeated().collect())
}

/// Skips at least one token, balanced groups as a whole, up to the next
/// separator or `close`.
fn skip_until<'src, I, C>(close: C) -> impl Parser<'src, I, (), Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    C: Parser<'src, I, (), Extra<'src>> + Clone,
{
    let balanced = recursive(|balanced| {
        let inner = balanced
            .or(none_of([
                Token::LParen,
                Token::RParen,
                Token::LBrack,
                Token::RBrack,
                Token::LBrace,
                Token::RBrace,
            ])
            .ignored())
            .repeated();
        choice((
            inner.clone().delimited_by(just(Token::LParen), just(Token::RParen)),
            inner.clone().delimited_by(just(Token::LBrack), just(Token::RBrack)),
            inner.delimited_by(just(Token::LBrace), just(Token::RBrace)),
        ))
    });

    choice((balanced, any().and_is(sep().not()).and_is(close.not()).ignored()))
        .repeated()
        .at_least(1)
}

fn sep<'src, I>() -> impl Parser<'src, I, (), Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    one_of([Token::Comma, Token::Newline]).ignored()
}

fn newlines<'src, I>() -> impl Parser<'src, I, (), Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    just(Token::Newline).repeated()
}

pub fn ident_parser<'src, I>() -> impl Parser<'src, I, Ident, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    select! { Token::Ident(name) => name }.map_with(|name, e| Ident {
        name: name.to_string(),
        span: e.span(),
    })
}

fn interpolation_parser<'src, I>() -> impl Parser<'src, I, Expr, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    select! { Token::Interp(_, parts) => parts }.map_with(|parts, e| {
        let span = e.span();
        let state: &mut State = e.state();
        state.interpolation(parts, span)
    })
}

/// Parser for field labels.
///
/// Grammar:
/// ```bnf
/// label ::= ident | string | interpolation | '(' expr ')'
/// ```
fn label_parser<'src, I, E>(expr: E) -> impl Parser<'src, I, Label, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    E: Parser<'src, I, Expr, Extra<'src>> + Clone + 'src,
{
    let string = select! { Token::Str(raw) => raw }.map_with(|raw, e| {
        Label::String(BasicLit {
            kind: LitKind::String,
            value: raw.to_string(),
            span: e.span(),
        })
    });
    let dynamic = expr
        .padded_by(newlines())
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .map_with(|x, e| Expr::Paren {
            x: Box::new(x),
            span: e.span(),
        })
        .or(interpolation_parser())
        .map(|x| Label::Dynamic(Box::new(x)));

    choice((ident_parser().map(Label::Ident), string, dynamic))
}

/// Parser for fields; `a: b: c` is shorthand for `a: {b: c}`.
///
/// Grammar:
/// ```bnf
/// field ::= label '?'? ':' (field | expr)
/// ```
fn field_parser<'src, I, E>(expr: E) -> impl Parser<'src, I, Field, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    E: Parser<'src, I, Expr, Extra<'src>> + Clone + 'src,
{
    recursive(|field| {
        let nested = field.map(|nested: Field| {
            Expr::Struct(StructLit {
                span: nested.span,
                elts: vec![Decl::Field(nested)],
            })
        });

        label_parser(expr.clone())
            .then(just(Token::Question).or_not().map(|q| q.is_some()))
            .then_ignore(just(Token::Colon))
            .then(nested.or(expr))
            .map_with(|((label, optional), value), e| Field {
                label,
                optional,
                value,
                span: e.span(),
            })
    })
}

fn decl_parser<'src, I, E>(expr: E) -> impl Parser<'src, I, Decl, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    E: Parser<'src, I, Expr, Extra<'src>> + Clone + 'src,
{
    choice((field_parser(expr.clone()).map(Decl::Field), expr.map(Decl::Embed)))
}

fn binary_parser<'src, I, P, O>(operand: P, op: O) -> impl Parser<'src, I, Expr, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
    P: Parser<'src, I, Expr, Extra<'src>> + Clone,
    O: Parser<'src, I, BinaryOp, Extra<'src>> + Clone,
{
    operand
        .clone()
        .foldl(op.then(operand).repeated(), |x, (op, y)| {
            let span = x.span().join(y.span());
            Expr::Binary {
                op,
                x: Box::new(x),
                y: Box::new(y),
                span,
            }
        })
}

enum Postfix {
    Selector(Ident),
    Call(Vec<Expr>, Span),
    Index(Expr, Span),
}

/// Parser for expressions.
///
/// Grammar, loosest binding first:
/// ```bnf
/// expr    ::= expr '|' expr | expr '&' expr
///           | expr '||' expr | expr '&&' expr
///           | expr relop expr | expr ('+' | '-') expr | expr ('*' | '/') expr
///           | unary
/// unary   ::= unop unary | primary
/// primary ::= operand ('.' ident | '(' exprs ')' | '[' expr ']')*
/// operand ::= literal | ident | interpolation | struct | list | '(' expr ')'
/// ```
pub fn expr_parser<'src, I>() -> impl Parser<'src, I, Expr, Extra<'src>> + Clone
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Int(raw) => (LitKind::Int, raw),
            Token::Float(raw) => (LitKind::Float, raw),
            Token::Str(raw) => (LitKind::String, raw),
            Token::Bottom => (LitKind::Bottom, "_|_"),
            Token::Ident("true") => (LitKind::Bool, "true"),
            Token::Ident("false") => (LitKind::Bool, "false"),
            Token::Ident("null") => (LitKind::Null, "null"),
        }
        .map_with(|(kind, raw), e| {
            Expr::Lit(BasicLit {
                kind,
                value: raw.to_string(),
                span: e.span(),
            })
        });

        // reported by the lexer
        let unterminated = select! { Token::Error(_) => () }.map_with(|_, e| Expr::Bad(e.span()));

        let elts = |close: Token<'src>| {
            // `...` opens a list; its element type, if any, is kept
            let elt = choice((
                just(Token::Ellipsis).ignore_then(expr.clone().or_not()),
                expr.clone().map(Some),
            ));
            elt.separated_by(sep().repeated().at_least(1))
                .allow_leading()
                .allow_trailing()
                .collect::<Vec<_>>()
                .map(|elts| elts.into_iter().flatten().collect::<Vec<_>>())
                .then_ignore(just(close))
        };

        let list = just(Token::LBrack)
            .ignore_then(elts(Token::RBrack))
            .map_with(|elts, e| Expr::List { elts, span: e.span() })
            .recover_with(via_parser(nested_delimiters(
                Token::LBrack,
                Token::RBrack,
                [(Token::LParen, Token::RParen), (Token::LBrace, Token::RBrace)],
                Expr::Bad,
            )));

        let paren = expr
            .clone()
            .padded_by(newlines())
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|x, e| Expr::Paren {
                x: Box::new(x),
                span: e.span(),
            })
            .recover_with(via_parser(nested_delimiters(
                Token::LParen,
                Token::RParen,
                [(Token::LBrack, Token::RBrack), (Token::LBrace, Token::RBrace)],
                Expr::Bad,
            )));

        // an unclosed struct keeps its declarations
        let struct_lit = just(Token::LBrace)
            .ignore_then(decl_list(
                decl_parser(expr.clone()),
                just(Token::RBrace).ignored().rewind(),
            ))
            .then(just(Token::RBrace).or_not())
            .validate(|(elts, close), e, emitter| {
                let span: Span = e.span();
                if close.is_none() {
                    let at = Span::new(span.file, span.end, span.end);
                    emitter.emit(Rich::custom(at, "expected '}' to close the struct"));
                }
                Expr::Struct(StructLit { elts, span })
            });

        let operand = choice((
            literal,
            ident_parser().map(Expr::Ident),
            interpolation_parser(),
            unterminated,
            struct_lit,
            list,
            paren,
        ));

        let postfix = choice((
            just(Token::Dot).ignore_then(ident_parser()).map(Postfix::Selector),
            just(Token::LParen)
                .ignore_then(elts(Token::RParen))
                .map_with(|args, e| Postfix::Call(args, e.span())),
            expr.clone()
                .padded_by(newlines())
                .delimited_by(just(Token::LBrack), just(Token::RBrack))
                .map_with(|index, e| Postfix::Index(index, e.span())),
        ));

        let primary = operand.foldl(postfix.repeated(), |x, postfix| match postfix {
            Postfix::Selector(sel) => {
                let span = x.span().join(sel.span);
                Expr::Selector {
                    x: Box::new(x),
                    sel,
                    span,
                }
            }
            Postfix::Call(args, span) => Expr::Call {
                span: x.span().join(span),
                fun: Box::new(x),
                args,
            },
            Postfix::Index(index, span) => Expr::Index {
                span: x.span().join(span),
                x: Box::new(x),
                index: Box::new(index),
            },
        });

        let unary_op = select! {
            Token::Op(Op::Sub) => UnaryOp::Neg,
            Token::Op(Op::Add) => UnaryOp::Pos,
            Token::Op(Op::Not) => UnaryOp::Not,
            Token::Op(Op::Mul) => UnaryOp::Default,
            Token::Op(Op::Lss) => UnaryOp::Lss,
            Token::Op(Op::Leq) => UnaryOp::Leq,
            Token::Op(Op::Gtr) => UnaryOp::Gtr,
            Token::Op(Op::Geq) => UnaryOp::Geq,
            Token::Op(Op::Neq) => UnaryOp::Neq,
            Token::Op(Op::Mat) => UnaryOp::Mat,
            Token::Op(Op::NMat) => UnaryOp::NMat,
        };
        let unary = unary_op
            .map_with(|op, e| (op, e.span()))
            .repeated()
            .foldr(primary, |(op, start): (UnaryOp, Span), x| Expr::Unary {
                op,
                span: start.join(x.span()),
                x: Box::new(x),
            })
            .boxed();

        let product = binary_parser(
            unary,
            select! {
                Token::Op(Op::Mul) => BinaryOp::Mul,
                Token::Op(Op::Quo) => BinaryOp::Quo,
            },
        )
        .boxed();
        let sum = binary_parser(
            product,
            select! {
                Token::Op(Op::Add) => BinaryOp::Add,
                Token::Op(Op::Sub) => BinaryOp::Sub,
            },
        )
        .boxed();
        let relation = binary_parser(
            sum,
            select! {
                Token::Op(Op::Eql) => BinaryOp::Eql,
                Token::Op(Op::Neq) => BinaryOp::Neq,
                Token::Op(Op::Lss) => BinaryOp::Lss,
                Token::Op(Op::Leq) => BinaryOp::Leq,
                Token::Op(Op::Gtr) => BinaryOp::Gtr,
                Token::Op(Op::Geq) => BinaryOp::Geq,
                Token::Op(Op::Mat) => BinaryOp::Mat,
                Token::Op(Op::NMat) => BinaryOp::NMat,
            },
        )
        .boxed();
        let logical_and = binary_parser(relation, just(Token::Op(Op::LAnd)).to(BinaryOp::LAnd)).boxed();
        let logical_or = binary_parser(logical_and, just(Token::Op(Op::LOr)).to(BinaryOp::LOr)).boxed();
        let unification = binary_parser(logical_or, just(Token::Op(Op::And)).to(BinaryOp::And)).boxed();
        binary_parser(unification, just(Token::Op(Op::Or)).to(BinaryOp::Or))
    })
    .boxed()
}
