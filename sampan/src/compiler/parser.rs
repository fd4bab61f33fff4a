use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::compiler::ast::{
    BinOpKind, Body, Expr, ForLoop, Handler, Stmt, StmtKind, TryBlock, UnaryOpKind, WhileLoop,
};
use crate::compiler::lexer::{Chunk, ExprTokenizer, Scanner};
use crate::compiler::tokens::{Pos, Span, Token};
use crate::error::{Error, ErrorKind};
use crate::utils::AutoEscape;
use crate::value::{ops, Value};

const MAX_RECURSION: usize = 150;
const RESERVED_NAMES: [&str; 10] = [
    "true", "True", "false", "False", "none", "None", "and", "or", "not", "in",
];

fn unexpected<D: fmt::Display>(unexpected: D, expected: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("unexpected {unexpected}, expected {expected}"),
    )
}

fn unexpected_eof(expected: &str) -> Error {
    unexpected("end of expression", expected)
}

fn syntax_error(msg: Cow<'static, str>) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(syntax_error(Cow::Borrowed($msg)));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(syntax_error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(rv) => rv,
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(($match, span)) => ($target, span),
            Some((token, _)) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some((token @ $match, span)) => (token, span),
            Some((token, _)) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
}

macro_rules! skip_token {
    ($p:expr, $match:pat) => {
        match $p.stream.current() {
            Err(err) => return Err(err),
            Ok(Some(($match, _))) => {
                let _ = $p.stream.next();
                true
            }
            _ => false,
        }
    };
}

macro_rules! with_recursion_guard {
    ($parser:expr, $expr:expr) => {{
        $parser.depth += 1;
        if $parser.depth > MAX_RECURSION {
            syntax_error!("template exceeds maximum recursion limits");
        }
        let rv = $expr;
        $parser.depth -= 1;
        rv
    }};
}

struct TokenStream<'s> {
    tokenizer: ExprTokenizer<'s>,
    current: Option<Result<(Token<'s>, Span), Error>>,
    last_span: Span,
}

impl<'s> TokenStream<'s> {
    fn new(mut tokenizer: ExprTokenizer<'s>) -> TokenStream<'s> {
        let start = tokenizer.pos();
        let current = tokenizer.next_token().transpose();
        TokenStream {
            tokenizer,
            current,
            last_span: Span {
                start_line: start.line,
                start_col: start.col,
                end_line: start.line,
                end_col: start.col,
            },
        }
    }

    /// Advance the stream.
    fn next(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        let rv = self.current.take();
        self.current = self.tokenizer.next_token().transpose();
        if let Some(Ok((_, span))) = rv {
            self.last_span = span;
        }
        rv.transpose()
    }

    /// Look at the current token.
    fn current(&mut self) -> Result<Option<(&Token<'s>, Span)>, Error> {
        if let Some(Err(_)) = self.current {
            if let Some(Err(err)) = self.current.take() {
                return Err(err);
            }
        }
        match self.current {
            Some(Ok(ref tok)) => Ok(Some((&tok.0, tok.1))),
            _ => Ok(None),
        }
    }

    fn current_span(&self) -> Span {
        if let Some(Ok((_, span))) = self.current {
            span
        } else {
            self.last_span
        }
    }
}

/// Recursive descent parser for the expression language.
struct ExprParser<'s> {
    stream: TokenStream<'s>,
    depth: usize,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<Expr, Error> {
            let mut left = ok!(self.$next());
            loop {
                let op = match ok!(self.stream.current()) {
                    $($tok)*
                    _ => break,
                };
                ok!(self.stream.next());
                let right = ok!(self.$next());
                left = Expr::BinOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
            Ok(left)
        }
    };
}

impl<'s> ExprParser<'s> {
    fn new(name: &'s str, source: &'s str, pos: Pos) -> ExprParser<'s> {
        ExprParser {
            stream: TokenStream::new(ExprTokenizer::new(name, source, pos)),
            depth: 0,
        }
    }

    fn attach_location(&self, mut err: Error) -> Error {
        if err.name().is_none() {
            let span = self.stream.current_span();
            err.set_location(
                self.stream.tokenizer.name(),
                span.start_line as usize,
                span.start_col as usize,
            );
        }
        err
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        match ok!(self.stream.next()) {
            None => Ok(()),
            Some((token, _)) => Err(unexpected(token, "end of expression")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        with_recursion_guard!(self, self.parse_or())
    }

    binop!(parse_or, parse_and, {
        Some((Token::Ident("or"), _)) => BinOpKind::ScOr,
    });
    binop!(parse_and, parse_not, {
        Some((Token::Ident("and"), _)) => BinOpKind::ScAnd,
    });

    fn parse_not(&mut self) -> Result<Expr, Error> {
        if skip_token!(self, Token::Ident("not")) {
            let expr = ok!(with_recursion_guard!(self, self.parse_not()));
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, Error> {
        let left = ok!(self.parse_math1());
        let mut ops = Vec::new();
        loop {
            let op = match ok!(self.stream.current()) {
                Some((Token::Eq, _)) => BinOpKind::Eq,
                Some((Token::Ne, _)) => BinOpKind::Ne,
                Some((Token::Lt, _)) => BinOpKind::Lt,
                Some((Token::Lte, _)) => BinOpKind::Lte,
                Some((Token::Gt, _)) => BinOpKind::Gt,
                Some((Token::Gte, _)) => BinOpKind::Gte,
                Some((Token::Ident("in"), _)) => BinOpKind::In,
                Some((Token::Ident("not"), _)) => BinOpKind::NotIn,
                _ => break,
            };
            ok!(self.stream.next());
            if op == BinOpKind::NotIn {
                expect_token!(self, Token::Ident("in"), "in");
            }
            ops.push((op, ok!(self.parse_math1())));
        }
        Ok(match ops.len() {
            0 => left,
            1 => {
                let (op, right) = ops.swap_remove(0);
                Expr::BinOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            _ => Expr::Compare {
                left: Box::new(left),
                ops,
            },
        })
    }

    binop!(parse_math1, parse_math2, {
        Some((Token::Plus, _)) => BinOpKind::Add,
        Some((Token::Minus, _)) => BinOpKind::Sub,
    });
    binop!(parse_math2, parse_unary, {
        Some((Token::Mul, _)) => BinOpKind::Mul,
        Some((Token::Div, _)) => BinOpKind::Div,
        Some((Token::FloorDiv, _)) => BinOpKind::FloorDiv,
        Some((Token::Mod, _)) => BinOpKind::Rem,
    });

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        if skip_token!(self, Token::Minus) {
            let expr = ok!(with_recursion_guard!(self, self.parse_unary()));
            if let Expr::Const(ref value) = expr {
                if let Ok(value) = ops::neg(value) {
                    return Ok(Expr::Const(value));
                }
            }
            return Ok(Expr::UnaryOp {
                op: UnaryOpKind::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let mut expr = ok!(with_recursion_guard!(self, self.parse_primary()));
        loop {
            match ok!(self.stream.current()) {
                Some((Token::Dot, _)) => {
                    ok!(self.stream.next());
                    let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier");
                    expr = Expr::GetAttr {
                        expr: Box::new(expr),
                        name: name.to_string(),
                    };
                }
                Some((Token::BracketOpen, _)) => {
                    ok!(self.stream.next());
                    let subscript = ok!(self.parse_expr());
                    expect_token!(self, Token::BracketClose, "`]`");
                    expr = Expr::GetItem {
                        expr: Box::new(expr),
                        subscript: Box::new(subscript),
                    };
                }
                Some((Token::ParenOpen, _)) => {
                    ok!(self.stream.next());
                    let args = ok!(self.parse_list(Token::ParenClose, "`)`"));
                    expr = Expr::Call {
                        expr: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses comma separated expressions up to and including `end`.
    fn parse_list(&mut self, end: Token<'static>, expected: &str) -> Result<Vec<Expr>, Error> {
        let mut items = Vec::new();
        loop {
            if let Some((token, _)) = ok!(self.stream.current()) {
                if *token == end {
                    break;
                }
            }
            if !items.is_empty() {
                expect_token!(self, Token::Comma, "`,`");
                if let Some((token, _)) = ok!(self.stream.current()) {
                    if *token == end {
                        break;
                    }
                }
            }
            items.push(ok!(self.parse_expr()));
        }
        match ok!(self.stream.next()) {
            Some((token, _)) if token == end => Ok(items),
            Some((token, _)) => Err(unexpected(token, expected)),
            None => Err(unexpected_eof(expected)),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let (token, _) = expect_token!(self, "expression");
        match token {
            Token::Ident("true" | "True") => Ok(Expr::Const(Value::from(true))),
            Token::Ident("false" | "False") => Ok(Expr::Const(Value::from(false))),
            Token::Ident("none" | "None") => Ok(Expr::Const(Value::from(()))),
            Token::Ident(name) if RESERVED_NAMES.contains(&name) => {
                Err(unexpected(format!("keyword `{name}`"), "expression"))
            }
            Token::Ident(name) => Ok(Expr::Var(name.to_string())),
            Token::Str(s) => Ok(Expr::Const(Value::from(s))),
            Token::Int(i) => Ok(Expr::Const(Value::from(i))),
            Token::Float(f) => Ok(Expr::Const(Value::from(f))),
            Token::ParenOpen => {
                let expr = ok!(self.parse_expr());
                expect_token!(self, Token::ParenClose, "`)`");
                Ok(expr)
            }
            Token::BracketOpen => {
                let items = ok!(self.parse_list(Token::BracketClose, "`]`"));
                Ok(Expr::List(items))
            }
            Token::BraceOpen => self.parse_map(),
            token => Err(unexpected(token, "expression")),
        }
    }

    fn parse_map(&mut self) -> Result<Expr, Error> {
        let mut pairs = Vec::new();
        loop {
            if skip_token!(self, Token::BraceClose) {
                break;
            }
            if !pairs.is_empty() {
                expect_token!(self, Token::Comma, "`,`");
                if skip_token!(self, Token::BraceClose) {
                    break;
                }
            }
            let key = ok!(self.parse_expr());
            expect_token!(self, Token::Colon, "`:`");
            let value = ok!(self.parse_expr());
            pairs.push((key, value));
        }
        Ok(Expr::Map(pairs))
    }

    fn parse_ident(&mut self) -> Result<&'s str, Error> {
        let (name, _) = expect_token!(self, Token::Ident(name) => name, "identifier");
        if RESERVED_NAMES.contains(&name) {
            syntax_error!("cannot assign to reserved name `{}`", name);
        }
        Ok(name)
    }

    /// `name = expr`
    fn parse_set(&mut self) -> Result<StmtKind, Error> {
        let target = ok!(self.parse_ident()).to_string();
        expect_token!(self, Token::Assign, "`=`");
        let expr = ok!(self.parse_expr());
        ok!(self.expect_end());
        Ok(StmtKind::Set { target, expr })
    }

    /// `a, b in expr`
    fn parse_for_head(&mut self) -> Result<(Vec<String>, Expr), Error> {
        let parens = skip_token!(self, Token::ParenOpen);
        let mut targets = vec![ok!(self.parse_ident()).to_string()];
        while skip_token!(self, Token::Comma) {
            targets.push(ok!(self.parse_ident()).to_string());
        }
        if parens {
            expect_token!(self, Token::ParenClose, "`)`");
        }
        expect_token!(self, Token::Ident("in"), "in");
        let iter = ok!(self.parse_expr());
        ok!(self.expect_end());
        Ok((targets, iter))
    }

    /// `name` or `name as alias`
    fn parse_import(&mut self) -> Result<StmtKind, Error> {
        let module = ok!(self.parse_ident()).to_string();
        let alias = if skip_token!(self, Token::Ident("as")) {
            ok!(self.parse_ident()).to_string()
        } else {
            module.clone()
        };
        ok!(self.expect_end());
        Ok(StmtKind::Import { module, alias })
    }

    /// `module import a, b as c`
    fn parse_from_import(&mut self) -> Result<StmtKind, Error> {
        let module = ok!(self.parse_ident()).to_string();
        expect_token!(self, Token::Ident("import"), "import");
        let mut names = Vec::new();
        loop {
            let name = ok!(self.parse_ident()).to_string();
            let alias = if skip_token!(self, Token::Ident("as")) {
                ok!(self.parse_ident()).to_string()
            } else {
                name.clone()
            };
            names.push((name, alias));
            if !skip_token!(self, Token::Comma) {
                break;
            }
        }
        ok!(self.expect_end());
        Ok(StmtKind::FromImport { module, names })
    }

    /// The suffix of an `except` tag.  Anything before `as` is accepted
    /// and ignored as errors are not matched by type.
    fn parse_except(&mut self) -> Result<Option<String>, Error> {
        loop {
            match ok!(self.stream.next()) {
                None => return Ok(None),
                Some((Token::Ident("as"), _)) => {
                    let name = ok!(self.parse_ident()).to_string();
                    ok!(self.expect_end());
                    return Ok(Some(name));
                }
                Some(_) => {}
            }
        }
    }
}

/// Where parsing of a body stopped.
enum Terminator<'s> {
    Eof,
    End,
    Intermediate {
        operator: &'s str,
        suffix: &'s str,
        suffix_pos: Pos,
        span: Span,
    },
}

fn allowed_parents(operator: &str) -> Option<&'static [&'static str]> {
    match operator {
        "else" => Some(&["if", "for", "while", "try"]),
        "elif" => Some(&["if"]),
        "except" | "finally" => Some(&["try"]),
        _ => None,
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"').trim_matches('\'')
}

/// Turns the chunks of a template into statements.
struct Parser<'s> {
    scanner: Scanner<'s>,
    blocks: BTreeSet<&'s str>,
    seen_extends: bool,
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(name: &'s str, source: &'s str) -> Parser<'s> {
        Parser {
            scanner: Scanner::new(name, source),
            blocks: BTreeSet::new(),
            seen_extends: false,
            depth: 0,
        }
    }

    fn name(&self) -> &'s str {
        self.scanner.name()
    }

    fn error_at<D: Into<Cow<'static, str>>>(&self, msg: D, pos: Pos) -> Error {
        let mut err = syntax_error(msg.into());
        err.set_location(self.name(), pos.line as usize, pos.col as usize);
        err
    }

    fn parse_expr(&self, source: &'s str, pos: Pos) -> Result<Expr, Error> {
        let mut parser = ExprParser::new(self.name(), source, pos);
        parser
            .parse_expr()
            .and_then(|expr| parser.expect_end().map(|_| expr))
            .map_err(|err| parser.attach_location(err))
    }

    fn with_expr_parser<R, F>(&self, source: &'s str, pos: Pos, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut ExprParser<'s>) -> Result<R, Error>,
    {
        let mut parser = ExprParser::new(self.name(), source, pos);
        f(&mut parser).map_err(|err| parser.attach_location(err))
    }

    fn parse(&mut self) -> Result<Body, Error> {
        let (body, _) = ok!(self.subparse(None, false));
        Ok(body)
    }

    fn subparse(
        &mut self,
        in_block: Option<&'static str>,
        in_loop: bool,
    ) -> Result<(Body, Terminator<'s>), Error> {
        self.depth += 1;
        if self.depth > MAX_RECURSION {
            return Err(self.error_at(
                "template exceeds maximum recursion limits",
                self.scanner.pos(),
            ));
        }
        let rv = self.subparse_impl(in_block, in_loop);
        self.depth -= 1;
        rv
    }

    fn subparse_impl(
        &mut self,
        in_block: Option<&'static str>,
        in_loop: bool,
    ) -> Result<(Body, Terminator<'s>), Error> {
        let mut body = Vec::new();
        loop {
            let (chunk, span) = match self.scanner.next() {
                Some(rv) => ok!(rv),
                None => {
                    if let Some(kind) = in_block {
                        return Err(self.error_at(
                            format!("missing end tag for {kind} block"),
                            self.scanner.pos(),
                        ));
                    }
                    return Ok((body, Terminator::Eof));
                }
            };
            match chunk {
                Chunk::Text(text) => {
                    if let Some(Stmt {
                        kind: StmtKind::Text(prev),
                        span: prev_span,
                    }) = body.last_mut()
                    {
                        prev.push_str(text);
                        prev_span.end_line = span.end_line;
                        prev_span.end_col = span.end_col;
                    } else {
                        body.push(Stmt {
                            kind: StmtKind::Text(text.to_string()),
                            span,
                        });
                    }
                }
                Chunk::Expr { source, pos } => {
                    let expr = ok!(self.parse_expr(source, pos));
                    body.push(Stmt {
                        kind: StmtKind::Emit { expr, raw: false },
                        span,
                    });
                }
                Chunk::Stmt {
                    operator,
                    suffix,
                    suffix_pos,
                } => {
                    if let Some(parents) = allowed_parents(operator) {
                        return match in_block {
                            None => Err(self.error_at(
                                format!("{operator} outside of {} block", parents.join("/")),
                                span.start(),
                            )),
                            Some(kind) if !parents.contains(&kind) => Err(self.error_at(
                                format!("{operator} cannot be attached to {kind} block"),
                                span.start(),
                            )),
                            Some(_) => Ok((
                                body,
                                Terminator::Intermediate {
                                    operator,
                                    suffix,
                                    suffix_pos,
                                    span,
                                },
                            )),
                        };
                    }
                    if operator == "end" {
                        if in_block.is_none() {
                            return Err(self.error_at("unexpected end tag", span.start()));
                        }
                        return Ok((body, Terminator::End));
                    }
                    if let Some(kind) =
                        ok!(self.parse_stmt(operator, suffix, suffix_pos, span, in_loop))
                    {
                        body.push(Stmt { kind, span });
                    }
                }
            }
        }
    }

    fn parse_stmt(
        &mut self,
        operator: &'s str,
        suffix: &'s str,
        suffix_pos: Pos,
        span: Span,
        in_loop: bool,
    ) -> Result<Option<StmtKind>, Error> {
        let kind = match operator {
            "comment" => return Ok(None),
            "extends" => {
                let name = strip_quotes(suffix);
                if name.is_empty() {
                    return Err(self.error_at("extends is missing a template name", span.start()));
                }
                if self.seen_extends {
                    return Err(self.error_at("tried to extend a second time", span.start()));
                }
                self.seen_extends = true;
                StmtKind::Extends(name.to_string())
            }
            "include" => {
                let name = strip_quotes(suffix);
                if name.is_empty() {
                    return Err(self.error_at("include is missing a template name", span.start()));
                }
                StmtKind::Include(name.to_string())
            }
            "set" => {
                if suffix.is_empty() {
                    return Err(self.error_at("set is missing a statement", span.start()));
                }
                ok!(self.with_expr_parser(suffix, suffix_pos, |p| p.parse_set()))
            }
            "import" => ok!(self.with_expr_parser(suffix, suffix_pos, |p| p.parse_import())),
            "from" => ok!(self.with_expr_parser(suffix, suffix_pos, |p| p.parse_from_import())),
            "autoescape" | "auto_escape" => {
                if suffix.is_empty() {
                    return Err(self.error_at(
                        "autoescape is missing a function name",
                        span.start(),
                    ));
                }
                StmtKind::AutoEscape(AutoEscape::from_name(suffix))
            }
            "raw" => StmtKind::Emit {
                expr: ok!(self.parse_expr(suffix, suffix_pos)),
                raw: true,
            },
            "module" => StmtKind::Module(ok!(self.parse_expr(suffix, suffix_pos))),
            "break" | "continue" => {
                if !in_loop {
                    return Err(self.error_at(
                        format!("{operator} outside of loop"),
                        span.start(),
                    ));
                }
                if !suffix.is_empty() {
                    return Err(self.error_at(
                        format!("unexpected arguments to {operator}"),
                        suffix_pos,
                    ));
                }
                if operator == "break" {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            "if" => ok!(self.parse_if(suffix, suffix_pos, in_loop)),
            "for" => {
                let (targets, iter) =
                    ok!(self.with_expr_parser(suffix, suffix_pos, |p| p.parse_for_head()));
                let (body, else_body) = ok!(self.parse_loop_body("for", in_loop));
                StmtKind::For(Box::new(ForLoop {
                    targets,
                    iter,
                    body,
                    else_body,
                }))
            }
            "while" => {
                let cond = ok!(self.parse_expr(suffix, suffix_pos));
                let (body, else_body) = ok!(self.parse_loop_body("while", in_loop));
                StmtKind::While(Box::new(WhileLoop {
                    cond,
                    body,
                    else_body,
                }))
            }
            "try" => ok!(self.parse_try(span, in_loop)),
            "block" => {
                let name = suffix;
                if name.is_empty() {
                    return Err(self.error_at("block is missing a name", span.start()));
                }
                if !self.blocks.insert(name) {
                    return Err(self.error_at(
                        format!("block '{name}' defined twice"),
                        span.start(),
                    ));
                }
                let body = ok!(self.parse_closed_body("block", in_loop));
                StmtKind::Block {
                    name: name.to_string(),
                    body: Arc::from(body),
                }
            }
            "apply" => {
                let func = ok!(self.parse_expr(suffix, suffix_pos));
                let body = ok!(self.parse_closed_body("apply", false));
                StmtKind::Apply { func, body }
            }
            _ => {
                return Err(self.error_at(format!("unknown operator: {operator}"), span.start()));
            }
        };
        Ok(Some(kind))
    }

    /// Parses a body that must be closed by `end` without intermediate tags.
    fn parse_closed_body(&mut self, kind: &'static str, in_loop: bool) -> Result<Body, Error> {
        match ok!(self.subparse(Some(kind), in_loop)) {
            (body, Terminator::End) => Ok(body),
            (_, Terminator::Intermediate { operator, span, .. }) => Err(self.error_at(
                format!("{operator} cannot be attached to {kind} block"),
                span.start(),
            )),
            (_, Terminator::Eof) => Err(self.error_at(
                format!("missing end tag for {kind} block"),
                self.scanner.pos(),
            )),
        }
    }

    fn parse_if(&mut self, cond: &'s str, cond_pos: Pos, in_loop: bool) -> Result<StmtKind, Error> {
        let mut arms = Vec::new();
        let mut cond = ok!(self.parse_expr(cond, cond_pos));
        loop {
            let (body, terminator) = ok!(self.subparse(Some("if"), in_loop));
            arms.push((cond, body));
            match terminator {
                Terminator::Intermediate {
                    operator: "elif",
                    suffix,
                    suffix_pos,
                    ..
                } => {
                    cond = ok!(self.parse_expr(suffix, suffix_pos));
                }
                Terminator::Intermediate {
                    operator: "else",
                    suffix,
                    suffix_pos,
                    ..
                } => {
                    if !suffix.is_empty() {
                        return Err(self.error_at("unexpected arguments to else", suffix_pos));
                    }
                    let else_body = ok!(self.parse_closed_body("if", in_loop));
                    return Ok(StmtKind::If {
                        arms,
                        else_body: Some(else_body),
                    });
                }
                _ => {
                    return Ok(StmtKind::If {
                        arms,
                        else_body: None,
                    })
                }
            }
        }
    }

    fn parse_loop_body(
        &mut self,
        kind: &'static str,
        in_loop: bool,
    ) -> Result<(Body, Option<Body>), Error> {
        let (body, terminator) = ok!(self.subparse(Some(kind), true));
        match terminator {
            Terminator::Intermediate { suffix_pos, suffix, .. } => {
                if !suffix.is_empty() {
                    return Err(self.error_at("unexpected arguments to else", suffix_pos));
                }
                let else_body = ok!(self.parse_closed_body(kind, in_loop));
                Ok((body, Some(else_body)))
            }
            _ => Ok((body, None)),
        }
    }

    fn parse_try(&mut self, span: Span, in_loop: bool) -> Result<StmtKind, Error> {
        let (body, mut terminator) = ok!(self.subparse(Some("try"), in_loop));
        let mut handlers = Vec::new();
        let mut else_body = None;
        let mut finally_body = None;
        loop {
            let (operator, suffix, suffix_pos, arm_span) = match terminator {
                Terminator::Intermediate {
                    operator,
                    suffix,
                    suffix_pos,
                    span,
                } => (operator, suffix, suffix_pos, span),
                _ => break,
            };
            if finally_body.is_some() {
                return Err(self.error_at(
                    format!("{operator} after finally in try block"),
                    arm_span.start(),
                ));
            }
            let (arm_body, next) = ok!(self.subparse(Some("try"), in_loop));
            match operator {
                "except" => {
                    if else_body.is_some() {
                        return Err(self.error_at("except after else in try block", arm_span.start()));
                    }
                    let bind = ok!(self.with_expr_parser(suffix, suffix_pos, |p| p.parse_except()));
                    handlers.push(Handler {
                        bind,
                        body: arm_body,
                    });
                }
                "else" => {
                    if handlers.is_empty() {
                        return Err(self.error_at("else without except in try block", arm_span.start()));
                    }
                    if else_body.is_some() {
                        return Err(self.error_at("duplicate else in try block", arm_span.start()));
                    }
                    else_body = Some(arm_body);
                }
                _ => finally_body = Some(arm_body),
            }
            terminator = next;
        }
        if handlers.is_empty() && finally_body.is_none() {
            return Err(self.error_at("try block requires except or finally", span.start()));
        }
        Ok(StmtKind::Try(Box::new(TryBlock {
            body,
            handlers,
            else_body,
            finally_body,
        })))
    }
}

/// Parses a template into its statements.
pub fn parse(name: &str, source: &str) -> Result<Body, Error> {
    Parser::new(name, source).parse()
}

/// Parses a standalone expression.
pub fn parse_expr(source: &str) -> Result<Expr, Error> {
    let mut parser = ExprParser::new("<expression>", source, Pos::default());
    parser
        .parse_expr()
        .and_then(|expr| parser.expect_end().map(|_| expr))
        .map_err(|err| parser.attach_location(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expr("1 + 2 * 3 == 7 and not x").unwrap();
        match expr {
            Expr::BinOp {
                op: BinOpKind::ScAnd,
                left,
                right,
            } => {
                assert!(matches!(*left, Expr::BinOp { op: BinOpKind::Eq, .. }));
                assert!(matches!(
                    *right,
                    Expr::UnaryOp {
                        op: UnaryOpKind::Not,
                        ..
                    }
                ));
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn test_comparison_chain() {
        let expr = parse_expr("a < b <= c").unwrap();
        match expr {
            Expr::Compare { ops, .. } => {
                let kinds: Vec<_> = ops.iter().map(|x| x.0).collect();
                assert_eq!(kinds, vec![BinOpKind::Lt, BinOpKind::Lte]);
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn test_not_in() {
        let expr = parse_expr("a not in b").unwrap();
        assert!(matches!(expr, Expr::BinOp { op: BinOpKind::NotIn, .. }));
    }

    #[test]
    fn test_negative_literal() {
        let expr = parse_expr("-42").unwrap();
        assert_eq!(expr.as_const(), Some(&Value::from(-42)));
    }

    #[test]
    fn test_recursion_limit() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_expr(&source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_text_merging() {
        let body = parse("t", "a{{! b").unwrap();
        assert_eq!(body.len(), 1);
        assert!(matches!(&body[0].kind, StmtKind::Text(text) if text == "a{{ b"));
    }
}
