use std::any::Any;
use std::rc::Rc;

use super::ast::*;
use super::error::CompileError;
use super::lexer::{lex, SpannedToken, Token};
use super::registry::EVAL;
use super::source_map::{LineIndex, SourceMap};

/// Parse `source` into statements, registering every node's location in
/// `source_map`. Syntax errors are collected; a non-empty error list means
/// the statements must not be lowered.
pub fn parse(source: &str, source_map: &mut SourceMap) -> (Vec<Stmt>, Vec<CompileError>) {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => return (Vec::new(), errors),
    };
    let mut parser = Parser::new(tokens, LineIndex::new(source), source_map);
    let statements = parser.parse_program();
    (statements, parser.errors)
}

type Parsed<T> = Result<(T, Span), CompileError>;

struct Parser<'a> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    errors: Vec<CompileError>,
    lines: LineIndex,
    source_map: &'a mut SourceMap,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<SpannedToken>, lines: LineIndex, source_map: &'a mut SourceMap) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            lines,
            source_map,
        }
    }

    fn parse_program(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        self.skip_terminators();

        while !self.at_eof() {
            match self.parse_statement(true) {
                Ok(stmts) => statements.extend(stmts),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_to_terminator();
                }
            }
            self.skip_terminators();
        }

        statements
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |t| &t.token)
    }

    fn peek_next(&self) -> &Token {
        self.tokens.get(self.pos + 1).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map_or(Span::new(0, 0), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> SpannedToken {
        let tok = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>, span: Span) -> CompileError {
        CompileError::parser(message, self.lines.location(span))
    }

    fn unexpected(&self) -> CompileError {
        self.error(format!("Unexpected token {}", self.peek().describe()), self.span())
    }

    fn expect(&mut self, expected: &Token) -> Result<Span, CompileError> {
        if self.peek() == expected {
            let sp = self.span();
            self.advance();
            Ok(sp)
        } else {
            Err(self.error(
                format!("Expected {}, got {}", expected.describe(), self.peek().describe()),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Parsed<Ident> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((self.node(Identifier::new(name), sp), sp))
        } else {
            Err(self.error(
                format!("Expected identifier, got {}", self.peek().describe()),
                self.span(),
            ))
        }
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    /// A statement ends at a newline or `;`, or right before a token that
    /// closes the enclosing block.
    fn expect_terminator(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Token::Newline | Token::Semicolon => {
                self.advance();
                Ok(())
            }
            Token::Eof | Token::End | Token::Else => Ok(()),
            other => Err(self.error(
                format!("Expected end of statement, got {}", other.describe()),
                self.span(),
            )),
        }
    }

    fn recover_to_terminator(&mut self) {
        while !matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof) {
            self.advance();
        }
        self.skip_terminators();
    }

    /// Like `recover_to_terminator`, but leaves any of `closers` for the
    /// enclosing block.
    fn recover_in_block(&mut self, closers: &[Token]) {
        while !matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof)
            && !closers.contains(self.peek())
        {
            self.advance();
        }
        self.skip_terminators();
    }

    /// Skip the rest of a broken block header, through `opener` when it is
    /// on the same line, so the body is still parsed as part of the block.
    fn recover_header(&mut self, opener: &Token) {
        while !matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof)
            && self.peek() != opener
        {
            self.advance();
        }
        if self.peek() == opener {
            self.advance();
        }
    }

    /// Allocate a node and record where it came from.
    fn node<T: Any>(&mut self, value: T, span: Span) -> Rc<T> {
        let node = Rc::new(value);
        let location = self.lines.location(span);
        self.source_map.locate(&node, location);
        node
    }

    fn compound(&mut self, operator: Operator, args: Vec<(Expr, Span)>) -> (Expr, Span) {
        let span = args
            .iter()
            .map(|(_, sp)| *sp)
            .reduce(Span::merge)
            .unwrap_or_else(|| self.span());
        let args = args.into_iter().map(|(e, _)| e).collect();
        (self.node(Expression::Compound { operator, args }, span), span)
    }

    // ── Statements ────────────────────────────────────────────────

    fn parse_statement(&mut self, top_level: bool) -> Result<Vec<Stmt>, CompileError> {
        match self.peek() {
            Token::If => self.parse_condition_block(),
            Token::When => self.parse_trigger_block(),
            Token::Def => {
                let start = self.span();
                let def = self.parse_macro_definition()?;
                if top_level {
                    Ok(vec![def])
                } else {
                    Err(self.error("Macros can only be defined at the top level", start))
                }
            }
            Token::Use => {
                let start = self.advance().span;
                let (name, name_span) = self.expect_ident()?;
                self.expect_terminator()?;
                Ok(vec![self.node(Statement::MacroUse { name }, start.merge(name_span))])
            }
            Token::Ident(_) => {
                if matches!(self.peek_next(), Token::Ident(_)) {
                    self.parse_inline_trigger().map(|s| vec![s])
                } else {
                    self.parse_assignment().map(|s| vec![s])
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Statements up to (not including) `end`, `else` or end of input.
    /// Errors inside the block are recorded and skipped.
    fn parse_block_body(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        loop {
            self.skip_terminators();
            if matches!(self.peek(), Token::End | Token::Else | Token::Eof) {
                break;
            }
            match self.parse_statement(false) {
                Ok(stmts) => body.extend(stmts),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_in_block(&[Token::End, Token::Else]);
                }
            }
        }
        body
    }

    /// `<target> = <value> [if <condition>]`
    fn parse_assignment(&mut self) -> Result<Stmt, CompileError> {
        let (setting, start) = self.parse_setting_target()?;
        self.expect(&Token::Eq)?;
        let (value, mut span) = self.parse_expr()?;
        span = start.merge(span);

        let condition = if matches!(self.peek(), Token::If) {
            self.advance();
            let (condition, cond_span) = self.parse_expr()?;
            span = span.merge(cond_span);
            Some(condition)
        } else {
            None
        };
        self.expect_terminator()?;

        Ok(self.node(
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            },
            span,
        ))
    }

    fn parse_setting_target(&mut self) -> Parsed<Expr> {
        let (base, base_span) = self.expect_ident()?;
        self.parse_subscript_suffix(base, base_span)
    }

    /// `if <cond> then <body> [else <body>] end`
    ///
    /// A broken header is recorded and the body is still parsed, so the
    /// block's `end` doesn't surface as a second error.
    fn parse_condition_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let if_span = self.advance().span;
        let header = self.parse_expr().and_then(|(condition, cond_span)| {
            self.expect(&Token::Then)?;
            Ok((condition, cond_span))
        });
        let (condition, cond_span) = match header {
            Ok(header) => header,
            Err(e) => {
                self.errors.push(e);
                self.recover_header(&Token::Then);
                return self.skip_broken_condition_block();
            }
        };

        let mut statements = vec![self.node(
            Statement::ConditionPush {
                condition: Rc::clone(&condition),
            },
            if_span.merge(cond_span),
        )];
        statements.extend(self.parse_block_body());

        if matches!(self.peek(), Token::Else) {
            let else_span = self.advance().span;
            statements.push(self.node(Statement::ConditionPop, else_span));

            let negated = Rc::new(Expression::Compound {
                operator: Operator::Not,
                args: vec![Rc::clone(&condition)],
            });
            self.source_map.derive(&negated, &condition);
            statements.push(self.node(Statement::ConditionPush { condition: negated }, else_span));
            statements.extend(self.parse_block_body());
        }

        let end_span = self.expect(&Token::End)?;
        statements.push(self.node(Statement::ConditionPop, end_span));
        self.expect_terminator()?;
        Ok(statements)
    }

    /// Parse and drop the rest of a block whose header was rejected.
    fn skip_broken_condition_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.parse_block_body();
        if matches!(self.peek(), Token::Else) {
            self.advance();
            self.parse_block_body();
        }
        self.expect(&Token::End)?;
        self.expect_terminator()?;
        Ok(Vec::new())
    }

    /// `def Name = <expr>` or `def Name do <statements> end`
    fn parse_macro_definition(&mut self) -> Result<Stmt, CompileError> {
        let start = self.advance().span;
        let (name, name_span) = self.expect_ident()?;

        match self.peek() {
            Token::Eq => {
                self.advance();
                let (body, body_span) = self.parse_expr()?;
                self.expect_terminator()?;
                Ok(self.node(
                    Statement::MacroDefinition {
                        name,
                        body: MacroBody::Expression(body),
                    },
                    start.merge(body_span),
                ))
            }
            Token::Do => {
                self.advance();
                let body = self.parse_block_body();
                let end_span = self.expect(&Token::End)?;
                self.expect_terminator()?;
                Ok(self.node(
                    Statement::MacroDefinition {
                        name,
                        body: MacroBody::Statements(body),
                    },
                    start.merge(end_span),
                ))
            }
            other => Err(self.error(
                format!("Expected '=' or 'do' after macro name, got {}", other.describe()),
                name_span.merge(self.span()),
            )),
        }
    }

    // ── Triggers ──────────────────────────────────────────────────

    /// `<Action> <id> [(n)] when <Condition> <id> [(n)]`
    fn parse_inline_trigger(&mut self) -> Result<Stmt, CompileError> {
        let (action, action_span) = self.parse_trigger_argument()?;
        self.expect(&Token::When)?;
        let (condition, cond_span) = self.parse_trigger_argument()?;
        self.expect_terminator()?;
        Ok(self.node(
            Statement::Trigger {
                condition,
                actions: vec![action],
            },
            action_span.merge(cond_span),
        ))
    }

    /// `when <Condition> <id> [(n)] do <action>; ... end`
    ///
    /// Errors in the header or in single actions are recorded and parsing
    /// continues up to the block's `end`.
    fn parse_trigger_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let errors_before = self.errors.len();
        let start = self.advance().span;
        let header = self
            .parse_trigger_argument()
            .and_then(|(condition, _)| Ok((condition, self.expect(&Token::Do)?)));
        let header = match header {
            Ok(header) => Some(header),
            Err(e) => {
                self.errors.push(e);
                self.recover_header(&Token::Do);
                None
            }
        };

        let mut actions = Vec::new();
        loop {
            self.skip_terminators();
            if matches!(self.peek(), Token::End | Token::Eof) {
                break;
            }
            let action = self.parse_trigger_argument().and_then(|(action, _)| {
                self.expect_terminator()?;
                Ok(action)
            });
            match action {
                Ok(action) => actions.push(action),
                Err(e) => {
                    self.errors.push(e);
                    self.recover_in_block(&[Token::End]);
                }
            }
        }
        let end_span = self.expect(&Token::End)?;
        let Some((condition, do_span)) = header else {
            self.expect_terminator()?;
            return Ok(Vec::new());
        };
        if self.errors.len() > errors_before {
            self.expect_terminator()?;
            return Ok(Vec::new());
        }
        if actions.is_empty() {
            return Err(self.error("Trigger block has no actions", do_span.merge(end_span)));
        }
        self.expect_terminator()?;

        Ok(vec![self.node(Statement::Trigger { condition, actions }, start.merge(end_span))])
    }

    fn parse_trigger_argument(&mut self) -> Parsed<TriggerArg> {
        let (kind, start) = self.expect_ident()?;
        let (id, mut span) = self.expect_ident()?;
        span = start.merge(span);

        let count = if matches!(self.peek(), Token::LParen) {
            self.advance();
            let count_span = self.span();
            let Token::Number(value) = *self.peek() else {
                return Err(self.error(
                    format!("Expected number, got {}", self.peek().describe()),
                    count_span,
                ));
            };
            self.advance();
            let count = self.node(Expression::Number(value), count_span);
            span = span.merge(self.expect(&Token::RParen)?);
            Some(count)
        } else {
            None
        };

        Ok((self.node(TriggerArgument { kind, id, count }, span), span))
    }

    // ── Expression parsing (precedence climbing) ──────────────────

    fn parse_expr(&mut self) -> Parsed<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = self.compound(Operator::Or, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = self.compound(Operator::And, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Parsed<Expr> {
        if matches!(self.peek(), Token::Not) {
            let not_span = self.advance().span;
            let (operand, operand_span) = self.parse_not()?;
            let span = not_span.merge(operand_span);
            let expr = self.node(
                Expression::Compound {
                    operator: Operator::Not,
                    args: vec![operand],
                },
                span,
            );
            return Ok((expr, span));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_add()?;
        loop {
            let operator = match self.peek() {
                Token::EqEq => Operator::Eq,
                Token::Ne => Operator::Ne,
                Token::Lt => Operator::Lt,
                Token::Le => Operator::Le,
                Token::Gt => Operator::Gt,
                Token::Ge => Operator::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_add()?;
            left = self.compound(operator, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let operator = match self.peek() {
                Token::Plus => Operator::Add,
                Token::Minus => Operator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul()?;
            left = self.compound(operator, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_primary()?;
        loop {
            let operator = match self.peek() {
                Token::Star => Operator::Mul,
                Token::Slash => Operator::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            left = self.compound(operator, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Parsed<Expr> {
        let span = self.span();
        match self.peek().clone() {
            Token::Number(v) => {
                self.advance();
                Ok((self.node(Expression::Number(v), span), span))
            }
            Token::Minus if matches!(self.peek_next(), Token::Number(_)) => {
                self.advance();
                let num = self.advance();
                let Token::Number(v) = num.token else {
                    unreachable!("lookahead guaranteed a number");
                };
                let span = span.merge(num.span);
                Ok((self.node(Expression::Number(-v), span), span))
            }
            Token::String(s) => {
                self.advance();
                Ok((self.node(Expression::String(s), span), span))
            }
            Token::On | Token::Off => {
                let value = matches!(self.advance().token, Token::On);
                Ok((self.node(Expression::Boolean(value), span), span))
            }
            Token::Eval(raw) => {
                self.advance();
                let base = self.node(Identifier::new(EVAL), span);
                let key = self.node(Identifier::new(raw), span);
                let key = self.node(Expression::Identifier(key), span);
                Ok((self.node(Expression::Subscript { base, key }, span), span))
            }
            Token::LParen => {
                self.advance();
                let (inner, _) = self.parse_expr()?;
                let close = self.expect(&Token::RParen)?;
                Ok((inner, span.merge(close)))
            }
            Token::LBracket => self.parse_list(),
            Token::Ident(_) => {
                let (base, base_span) = self.expect_ident()?;
                self.parse_subscript_suffix(base, base_span)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Turn `base` into `base.key` / `base[key]` when a subscript follows,
    /// or a bare identifier otherwise.
    fn parse_subscript_suffix(&mut self, base: Ident, base_span: Span) -> Parsed<Expr> {
        let (key, key_span) = match self.peek() {
            Token::Dot => {
                self.advance();
                let span = self.span();
                let key = match self.peek().clone() {
                    Token::Star => Expression::Wildcard,
                    Token::Ellipsis => Expression::Placeholder,
                    Token::Ident(name) => {
                        let ident = self.node(Identifier::new(name), span);
                        Expression::Identifier(ident)
                    }
                    other => {
                        return Err(self.error(
                            format!("Expected identifier, got {}", other.describe()),
                            span,
                        ))
                    }
                };
                self.advance();
                (self.node(key, span), span)
            }
            Token::LBracket => self.parse_list()?,
            _ => {
                let expr = Expression::Identifier(base);
                return Ok((self.node(expr, base_span), base_span));
            }
        };

        let span = base_span.merge(key_span);
        Ok((self.node(Expression::Subscript { base, key }, span), span))
    }

    /// `[a, b, c]`, `[a, b or c]`, `[a, b, c and]`. A single untagged
    /// element is returned as-is rather than as a list.
    fn parse_list(&mut self) -> Parsed<Expr> {
        let open = self.expect(&Token::LBracket)?;
        if matches!(self.peek(), Token::RBracket) {
            return Err(self.error("Empty list", open.merge(self.span())));
        }

        let mut values = Vec::new();
        let mut fold: Option<FoldOp> = None;
        let mut separators = 0;
        loop {
            values.push(self.parse_list_element()?.0);

            let tag = match self.peek() {
                Token::Comma => None,
                Token::And => Some(FoldOp::And),
                Token::Or => Some(FoldOp::Or),
                _ => break,
            };
            let sep_span = self.advance().span;
            separators += 1;
            if let Some(tag) = tag {
                if fold.is_some_and(|f| f != tag) {
                    return Err(self.error("Cannot mix 'and' and 'or' in one list", sep_span));
                }
                fold = Some(tag);
            }
            if matches!(self.peek(), Token::RBracket) {
                break;
            }
        }
        let close = self.expect(&Token::RBracket)?;
        let span = open.merge(close);

        if separators == 0 {
            if let [single] = values.as_slice() {
                return Ok((Rc::clone(single), span));
            }
        }
        Ok((self.node(Expression::List { values, fold }, span), span))
    }

    fn parse_list_element(&mut self) -> Parsed<Expr> {
        let span = self.span();
        match self.peek() {
            Token::Star => {
                self.advance();
                Ok((self.node(Expression::Wildcard, span), span))
            }
            Token::Ellipsis => {
                self.advance();
                Ok((self.node(Expression::Placeholder, span), span))
            }
            _ => self.parse_add(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Vec<Stmt> {
        let mut map = SourceMap::new();
        let (stmts, errors) = parse(s, &mut map);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        stmts
    }

    fn parse_errors(s: &str) -> Vec<CompileError> {
        let mut map = SourceMap::new();
        parse(s, &mut map).1
    }

    fn assignment(stmt: &Statement) -> (&Expr, &Expr, Option<&Expr>) {
        match stmt {
            Statement::SettingAssignment { setting, value, condition } => {
                (setting, value, condition.as_ref())
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parse_simple_assignment() {
        let stmts = parse_str("autoBuild = ON");
        assert_eq!(stmts.len(), 1);
        let (setting, value, condition) = assignment(&stmts[0]);
        assert_eq!(setting.as_identifier(), Some("autoBuild"));
        assert_eq!(**value, Expression::Boolean(true));
        assert!(condition.is_none());
    }

    #[test]
    fn parse_conditional_assignment() {
        let stmts = parse_str("sellCoal = ON if BrokenCars > 1");
        let (_, _, condition) = assignment(&stmts[0]);
        let Expression::Compound { operator, args } = &**condition.unwrap() else {
            panic!("expected compound");
        };
        assert_eq!(*operator, Operator::Gt);
        assert_eq!(args[0].as_identifier(), Some("BrokenCars"));
        assert_eq!(*args[1], Expression::Number(1.0));
    }

    #[test]
    fn parse_negative_and_fractional_numbers() {
        let stmts = parse_str("minimumMoney = -2.5\nx = 3 - 1");
        let (_, value, _) = assignment(&stmts[0]);
        assert_eq!(**value, Expression::Number(-2.5));
        let (_, value, _) = assignment(&stmts[1]);
        assert!(matches!(&**value, Expression::Compound { operator: Operator::Sub, .. }));
    }

    #[test]
    fn parse_precedence() {
        let stmts = parse_str("x = ON if not a and b or c == 1 + 2 * 3");
        let (_, _, condition) = assignment(&stmts[0]);
        let Expression::Compound { operator: Operator::Or, args } = &**condition.unwrap() else {
            panic!("expected or at the root");
        };
        assert!(matches!(&*args[0], Expression::Compound { operator: Operator::And, .. }));
        let Expression::Compound { operator: Operator::Eq, args: cmp } = &*args[1] else {
            panic!("expected ==");
        };
        let Expression::Compound { operator: Operator::Add, args: sum } = &*cmp[1] else {
            panic!("expected +");
        };
        assert!(matches!(&*sum[1], Expression::Compound { operator: Operator::Mul, .. }));
    }

    #[test]
    fn parse_subscript_forms() {
        let stmts = parse_str("Sell.Coal = ON\nSell[Iron] = OFF\nSell.* = ON\nSell[...] = ON");
        let keys: Vec<_> = stmts
            .iter()
            .map(|s| match &**assignment(s).0 {
                Expression::Subscript { base, key } => {
                    assert_eq!(base.value, "Sell");
                    key.variant_name()
                }
                other => panic!("expected subscript, got {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec!["identifier", "identifier", "wildcard", "placeholder"]);
    }

    #[test]
    fn parse_fold_tags() {
        let cases = [
            ("[A, B or C]", Some(FoldOp::Or), 3),
            ("[A, B, C and]", Some(FoldOp::And), 3),
            ("[A, B]", None, 2),
            ("[* and]", Some(FoldOp::And), 1),
        ];
        for (key, fold_tag, len) in cases {
            let stmts = parse_str(&format!("x = ON if ResourceDemanded{key}"));
            let (_, _, condition) = assignment(&stmts[0]);
            let Expression::Subscript { key, .. } = &**condition.unwrap() else {
                panic!("expected subscript");
            };
            let Expression::List { values, fold } = &**key else {
                panic!("expected list for {key:?}");
            };
            assert_eq!(*fold, fold_tag);
            assert_eq!(values.len(), len);
        }
    }

    #[test]
    fn mixed_fold_tags_are_rejected() {
        let errors = parse_errors("x = ON if ResourceDemanded[A and B or C]");
        assert_eq!(errors[0].message, "Cannot mix 'and' and 'or' in one list");
    }

    #[test]
    fn parse_eval_literal() {
        let stmts = parse_str("x = ON if {{ game.alevel() > 1 }}");
        let (_, _, condition) = assignment(&stmts[0]);
        let Expression::Subscript { base, key } = &**condition.unwrap() else {
            panic!("expected subscript");
        };
        assert_eq!(base.value, EVAL);
        assert_eq!(key.as_identifier(), Some("game.alevel() > 1"));
    }

    #[test]
    fn parse_condition_block_with_else() {
        let stmts = parse_str("if a then\n  x = 1\nelse\n  x = 2\nend");
        let kinds: Vec<_> = stmts
            .iter()
            .map(|s| match &**s {
                Statement::ConditionPush { .. } => "push",
                Statement::ConditionPop => "pop",
                Statement::SettingAssignment { .. } => "set",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["push", "set", "pop", "push", "set", "pop"]);
        let Statement::ConditionPush { condition } = &*stmts[3] else { panic!() };
        assert!(matches!(&**condition, Expression::Compound { operator: Operator::Not, .. }));
    }

    #[test]
    fn parse_single_line_block() {
        let stmts = parse_str("If a Then x = 1; y = 2 End");
        assert_eq!(stmts.len(), 4);
    }

    #[test]
    fn parse_inline_trigger() {
        let stmts = parse_str("Research tech-club when Built city-windmill (2)");
        let Statement::Trigger { condition, actions } = &*stmts[0] else {
            panic!("expected trigger");
        };
        assert_eq!(condition.kind.value, "Built");
        assert_eq!(condition.id.value, "city-windmill");
        assert_eq!(condition.count.as_deref(), Some(&Expression::Number(2.0)));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id.value, "tech-club");
        assert!(actions[0].count.is_none());
    }

    #[test]
    fn parse_trigger_block() {
        let stmts = parse_str("when Built city-windmill do Research tech-club; Build city-bank end");
        let Statement::Trigger { actions, .. } = &*stmts[0] else {
            panic!("expected trigger");
        };
        let kinds: Vec<_> = actions.iter().map(|a| a.kind.value.as_str()).collect();
        assert_eq!(kinds, vec!["Research", "Build"]);
    }

    #[test]
    fn empty_trigger_block_is_rejected() {
        let errors = parse_errors("when Built city-windmill do\nend");
        assert_eq!(errors[0].message, "Trigger block has no actions");
    }

    #[test]
    fn parse_macros() {
        let stmts = parse_str("def Rich = ResourceQuantity.Money > 1000\ndef Setup do\n  autoBuild = ON\nend\nuse Setup");
        assert!(matches!(&*stmts[0], Statement::MacroDefinition { body: MacroBody::Expression(_), .. }));
        let Statement::MacroDefinition { body: MacroBody::Statements(body), .. } = &*stmts[1] else {
            panic!("expected statement macro");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(&*stmts[2], Statement::MacroUse { name } if name.value == "Setup"));
    }

    #[test]
    fn nested_macro_definition_is_rejected() {
        let errors = parse_errors("if a then\n  def X = 1\nend");
        assert_eq!(errors[0].message, "Macros can only be defined at the top level");
    }

    #[test]
    fn recovers_and_collects_multiple_errors() {
        let errors = parse_errors("x = = 1\ny = 2\nz = )\n");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].location.unwrap().start.line, 1);
        assert_eq!(errors[1].location.unwrap().start.line, 3);
    }

    #[test]
    fn broken_if_header_keeps_its_block() {
        let mut map = SourceMap::new();
        let (stmts, errors) = parse(
            "if ResourceQuantity.Coal > then\n  autoBuild = ON\nelse\n  autoBuild = OFF\nend\nautoJobs = OFF",
            &mut map,
        );
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].message, "Unexpected token 'then'");
        assert_eq!(errors[0].location.unwrap().start.line, 1);
        assert_eq!(stmts.len(), 1);
        assert_eq!(assignment(&stmts[0]).0.as_identifier(), Some("autoJobs"));
    }

    #[test]
    fn broken_trigger_block_reports_once() {
        let errors = parse_errors("when Built city-windmill do\n  Research\n  Build city-bank\nend");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].location.unwrap().start.line, 2);

        let errors = parse_errors("when Built do\n  Research tech-club\nend\nx = 1");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].message, "Expected identifier, got 'do'");
    }

    #[test]
    fn broken_statement_in_block_leaves_end() {
        let errors = parse_errors("if a then\n  x = = 1\nend");
        assert_eq!(errors.len(), 1, "{errors:?}");
    }

    #[test]
    fn missing_end_is_reported() {
        let errors = parse_errors("if a then\n  x = 1\n");
        assert_eq!(errors[0].message, "Expected 'end', got end of input");
    }

    #[test]
    fn nodes_are_located() {
        let mut map = SourceMap::new();
        let (stmts, errors) = parse("x = 1\nsellCoal = ON if BrokenCars > 1", &mut map);
        assert!(errors.is_empty());
        let (_, _, condition) = assignment(&stmts[1]);
        let Expression::Compound { args, .. } = &**condition.unwrap() else { panic!() };
        let loc = map.location_of(&args[0]).unwrap();
        assert_eq!((loc.start.line, loc.start.column), (2, 18));
        assert_eq!((loc.stop.line, loc.stop.column), (2, 28));
        let whole = map.location_of(condition.unwrap()).unwrap();
        assert_eq!((whole.start.column, whole.stop.column), (18, 32));
    }
}
