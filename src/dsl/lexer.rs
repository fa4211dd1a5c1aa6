use super::ast::Span;
use super::error::CompileError;
use super::source_map::LineIndex;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    On,
    Off,
    /// `{{ raw }}` or `{ raw }`, trimmed.
    Eval(String),

    // Identifiers & keywords
    Ident(String),
    If,
    Then,
    Else,
    End,
    And,
    Or,
    Not,
    When,
    Do,
    Def,
    Use,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Ellipsis, // ...

    // Operators
    Star,
    Plus,
    Minus,
    Slash,
    Lt,
    Gt,
    Le,   // <=
    Ge,   // >=
    EqEq, // ==
    Ne,   // !=
    Eq,   // =

    // Special
    Newline,
    Semicolon,
    Eof,
}

impl Token {
    /// How the token reads in an error message.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(v) => super::ast::format_number(*v),
            Token::String(s) => format!("\"{s}\""),
            Token::On => "ON".into(),
            Token::Off => "OFF".into(),
            Token::Eval(s) => format!("{{{{{s}}}}}"),
            Token::Ident(s) => format!("'{s}'"),
            Token::If => "'if'".into(),
            Token::Then => "'then'".into(),
            Token::Else => "'else'".into(),
            Token::End => "'end'".into(),
            Token::And => "'and'".into(),
            Token::Or => "'or'".into(),
            Token::Not => "'not'".into(),
            Token::When => "'when'".into(),
            Token::Do => "'do'".into(),
            Token::Def => "'def'".into(),
            Token::Use => "'use'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Comma => "','".into(),
            Token::Dot => "'.'".into(),
            Token::Ellipsis => "'...'".into(),
            Token::Star => "'*'".into(),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Slash => "'/'".into(),
            Token::Lt => "'<'".into(),
            Token::Gt => "'>'".into(),
            Token::Le => "'<='".into(),
            Token::Ge => "'>='".into(),
            Token::EqEq => "'=='".into(),
            Token::Ne => "'!='".into(),
            Token::Eq => "'='".into(),
            Token::Newline => "end of line".into(),
            Token::Semicolon => "';'".into(),
            Token::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Open `(` / `[` count; newlines inside brackets are not terminators.
    depth: usize,
    lines: LineIndex,
    tokens: Vec<SpannedToken>,
    errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            depth: 0,
            lines: LineIndex::new(source),
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<CompileError>> {
        while self.pos < self.bytes.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'\n' | b'\r' => {
                    // Collapse multiple newlines
                    while self.pos < self.bytes.len()
                        && (self.bytes[self.pos] == b'\n' || self.bytes[self.pos] == b'\r')
                    {
                        self.pos += 1;
                    }
                    // Suppress newline after tokens that indicate a continuation
                    // and inside brackets.
                    if self.depth == 0 {
                        if let Some(last) = self.tokens.last() {
                            if !Self::continues_expression(&last.token) {
                                self.push(Token::Newline, start, self.pos);
                            }
                        }
                    }
                }
                b';' => { self.pos += 1; self.push(Token::Semicolon, start, self.pos); }
                b'(' => { self.pos += 1; self.depth += 1; self.push(Token::LParen, start, self.pos); }
                b')' => { self.pos += 1; self.depth = self.depth.saturating_sub(1); self.push(Token::RParen, start, self.pos); }
                b'[' => { self.pos += 1; self.depth += 1; self.push(Token::LBracket, start, self.pos); }
                b']' => { self.pos += 1; self.depth = self.depth.saturating_sub(1); self.push(Token::RBracket, start, self.pos); }
                b',' => { self.pos += 1; self.push(Token::Comma, start, self.pos); }
                b'*' => { self.pos += 1; self.push(Token::Star, start, self.pos); }
                b'+' => { self.pos += 1; self.push(Token::Plus, start, self.pos); }
                b'-' => { self.pos += 1; self.push(Token::Minus, start, self.pos); }
                b'/' => { self.pos += 1; self.push(Token::Slash, start, self.pos); }
                b'.' => {
                    if self.bytes.get(self.pos + 1) == Some(&b'.')
                        && self.bytes.get(self.pos + 2) == Some(&b'.')
                    {
                        self.pos += 3;
                        self.push(Token::Ellipsis, start, self.pos);
                    } else {
                        self.pos += 1;
                        self.push(Token::Dot, start, self.pos);
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Le, start, self.pos);
                    } else {
                        self.push(Token::Lt, start, self.pos);
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Ge, start, self.pos);
                    } else {
                        self.push(Token::Gt, start, self.pos);
                    }
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::EqEq, start, self.pos);
                    } else {
                        self.push(Token::Eq, start, self.pos);
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.push(Token::Ne, start, self.pos);
                    } else {
                        self.error("Expected '!=' (use 'not' for negation)", start, self.pos);
                    }
                }
                b'{' => self.lex_eval(start),
                b'"' | b'\'' => {
                    self.pos += 1;
                    self.lex_string(start, ch);
                }
                b'0'..=b'9' => self.lex_number(start),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(start),
                _ => {
                    let ch = self.source[start..].chars().next().unwrap_or('?');
                    self.pos += ch.len_utf8();
                    self.error(format!("Unexpected character: '{ch}'"), start, self.pos);
                }
            }
        }

        // Remove trailing newline
        if let Some(last) = self.tokens.last() {
            if matches!(last.token, Token::Newline) {
                self.tokens.pop();
            }
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: Span::new(self.pos, self.pos),
        });

        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&mut self, message: impl Into<String>, start: usize, end: usize) {
        let location = self.lines.location(Span::new(start, end));
        self.errors.push(CompileError::lexer(message, location));
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        // A leading infix operator continues the previous line:
        //   sellCoal = ON if ResourceQuantity.Coal > 100
        //       and ResourceDemanded.Coal
        if Self::continues_from_previous(&token) {
            if let Some(last) = self.tokens.last() {
                if matches!(last.token, Token::Newline) {
                    self.tokens.pop();
                }
            }
        }
        self.tokens.push(SpannedToken {
            token,
            span: Span::new(start, end),
        });
    }

    /// Returns true if a newline after this token should be suppressed,
    /// because the token indicates an expression continues on the next line.
    fn continues_expression(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::Slash
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
                | Token::Not
                | Token::Eq
                | Token::Comma
                | Token::Dot
                | Token::Newline
                | Token::Semicolon
        )
    }

    /// Returns true if this token at the START of a new line means the
    /// previous expression continues. Excludes `-`, which also starts a
    /// negative literal.
    fn continues_from_previous(token: &Token) -> bool {
        matches!(
            token,
            Token::Plus
                | Token::Star
                | Token::Slash
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::EqEq
                | Token::Ne
                | Token::And
                | Token::Or
        )
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' => self.pos += 1,
                b'/' | b'-' if self.bytes.get(self.pos + 1) == Some(&self.bytes[self.pos]) => {
                    // Line comment (`//` or `--`): skip to end of line
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_eval(&mut self, start: usize) {
        let double = self.bytes.get(self.pos + 1) == Some(&b'{');
        let (open, close) = if double { (2, "}}") } else { (1, "}") };
        let body_start = self.pos + open;
        match self.source.get(body_start..).and_then(|rest| rest.find(close)) {
            Some(len) => {
                let raw = self.source[body_start..body_start + len].trim().to_string();
                self.pos = body_start + len + close.len();
                self.push(Token::Eval(raw), start, self.pos);
            }
            None => {
                self.pos = self.bytes.len();
                self.error("Unterminated inline expression", start, self.pos);
            }
        }
    }

    fn lex_string(&mut self, start: usize, quote: u8) {
        let str_start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != quote && self.bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        let s = self.source[str_start..self.pos].to_string();
        if self.pos < self.bytes.len() && self.bytes[self.pos] == quote {
            self.pos += 1;
        } else {
            self.error("Unterminated string literal", start, self.pos);
        }
        self.push(Token::String(s), start, self.pos);
    }

    fn lex_number(&mut self, start: usize) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        // Check for decimal point
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'.'
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1; // skip '.'
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = &self.source[start..self.pos];
        match text.parse::<f64>() {
            Ok(v) => self.push(Token::Number(v), start, self.pos),
            Err(_) => self.error(format!("Invalid number: {text}"), start, self.pos),
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            let hyphenated = b == b'-'
                && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_alphabetic);
            if b.is_ascii_alphanumeric() || b == b'_' || hyphenated {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = &self.source[start..self.pos];
        let token = match word {
            "ON" => Token::On,
            "OFF" => Token::Off,
            _ => match word.to_ascii_lowercase().as_str() {
                "if" => Token::If,
                "then" => Token::Then,
                "else" => Token::Else,
                "end" => Token::End,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "when" => Token::When,
                "do" => Token::Do,
                "def" => Token::Def,
                "use" => Token::Use,
                _ => Token::Ident(word.to_string()),
            },
        };
        self.push(token, start, self.pos);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn simple_tokens() {
        let tokens = tok("1 + 2.5");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::Plus, Token::Number(2.5), Token::Eof]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tok("If then END and OR Not when DO def use else");
        assert_eq!(tokens, vec![
            Token::If, Token::Then, Token::End, Token::And, Token::Or, Token::Not,
            Token::When, Token::Do, Token::Def, Token::Use, Token::Else, Token::Eof,
        ]);
    }

    #[test]
    fn booleans_are_exact_case() {
        let tokens = tok("ON OFF on Off");
        assert_eq!(tokens, vec![
            Token::On, Token::Off, Token::Ident("on".into()), Token::Ident("Off".into()), Token::Eof,
        ]);
    }

    #[test]
    fn operators() {
        let tokens = tok("+ - * / < > <= >= == != =");
        assert_eq!(tokens, vec![
            Token::Plus, Token::Minus, Token::Star, Token::Slash,
            Token::Lt, Token::Gt, Token::Le, Token::Ge, Token::EqEq, Token::Ne, Token::Eq,
            Token::Eof,
        ]);
    }

    #[test]
    fn hyphenated_identifiers() {
        let tokens = tok("Research tech-club when Built city-windmill");
        assert_eq!(tokens, vec![
            Token::Ident("Research".into()), Token::Ident("tech-club".into()), Token::When,
            Token::Ident("Built".into()), Token::Ident("city-windmill".into()), Token::Eof,
        ]);
    }

    #[test]
    fn minus_before_digit_is_subtraction() {
        let tokens = tok("x-1");
        assert_eq!(tokens, vec![
            Token::Ident("x".into()), Token::Minus, Token::Number(1.0), Token::Eof,
        ]);
    }

    #[test]
    fn subscript_punctuation() {
        let tokens = tok("Sell[Coal, Iron or Copper] Sell.* X[...]");
        assert_eq!(tokens, vec![
            Token::Ident("Sell".into()), Token::LBracket, Token::Ident("Coal".into()), Token::Comma,
            Token::Ident("Iron".into()), Token::Or, Token::Ident("Copper".into()), Token::RBracket,
            Token::Ident("Sell".into()), Token::Dot, Token::Star,
            Token::Ident("X".into()), Token::LBracket, Token::Ellipsis, Token::RBracket,
            Token::Eof,
        ]);
    }

    #[test]
    fn inline_eval_double_and_single_braces() {
        let tokens = tok("{{ game.global.race.species }} { 1 + 2 }");
        assert_eq!(tokens, vec![
            Token::Eval("game.global.race.species".into()), Token::Eval("1 + 2".into()), Token::Eof,
        ]);
    }

    #[test]
    fn unterminated_eval_is_an_error() {
        let errors = lex("x = {{ 1 + 2").unwrap_err();
        assert_eq!(errors[0].message, "Unterminated inline expression");
    }

    #[test]
    fn strings_with_either_quote() {
        let tokens = tok("\"bioseed\" 'mad'");
        assert_eq!(tokens, vec![Token::String("bioseed".into()), Token::String("mad".into()), Token::Eof]);
    }

    #[test]
    fn newlines_as_terminators() {
        let tokens = tok("a = 1\nb = 2");
        assert_eq!(tokens, vec![
            Token::Ident("a".into()), Token::Eq, Token::Number(1.0),
            Token::Newline,
            Token::Ident("b".into()), Token::Eq, Token::Number(2.0),
            Token::Eof,
        ]);
    }

    #[test]
    fn comments_stripped() {
        let tokens = tok("a = 1 // first\nb = 2 -- second");
        assert_eq!(tokens, vec![
            Token::Ident("a".into()), Token::Eq, Token::Number(1.0),
            Token::Newline,
            Token::Ident("b".into()), Token::Eq, Token::Number(2.0),
            Token::Eof,
        ]);
    }

    #[test]
    fn no_newline_inside_brackets() {
        let tokens = tok("Sell[Coal,\nIron\n]");
        assert!(!tokens.contains(&Token::Newline));
    }

    #[test]
    fn leading_and_continues_previous_line() {
        let tokens = tok("a = ON if b\n  and c");
        assert!(!tokens.contains(&Token::Newline));
    }

    #[test]
    fn unexpected_character_location() {
        let errors = lex("a = 1\nb = @").unwrap_err();
        assert_eq!(errors[0].message, "Unexpected character: '@'");
        let loc = errors[0].location.unwrap();
        assert_eq!((loc.start.line, loc.start.column), (2, 5));
    }
}
