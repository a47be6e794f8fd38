//! Tokenizer for judge scripts.
//!
//! Produces a flat token stream with Python-style `Newline`, `Indent` and
//! `Dedent` markers. Newlines inside brackets are ignored.

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Str(String),

    If,
    Elif,
    Else,
    And,
    Or,
    Not,
    In,
    Raise,
    Assert,
    Pass,
    True,
    False,
    None,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,

    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("name '{name}'"),
            TokenKind::Int(value) => format!("integer {value}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of script".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::In => "in",
            TokenKind::Raise => "raise",
            TokenKind::Assert => "assert",
            TokenKind::Pass => "pass",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::None => "None",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::SlashSlash => "//",
            TokenKind::Percent => "%",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

/// Splits a script into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn run(&mut self) -> Result<(), ScriptError> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                if !self.indentation()? {
                    continue;
                }
                at_line_start = false;
                continue;
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.end_line();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '"' | '\'' => self.string(c)?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                _ => self.operator(c)?,
            }
        }

        self.end_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(())
    }

    /// Measures leading whitespace. Returns false when the line is blank or a
    /// comment and was consumed entirely.
    fn indentation(&mut self) -> Result<bool, ScriptError> {
        let mut column = 0;
        while let Some(c) = self.peek_at(0) {
            match c {
                ' ' => column += 1,
                '\t' => column = (column / 8 + 1) * 8,
                '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek_at(0) {
            None => return Ok(false),
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if column > current {
            self.indents.push(column);
            self.push(TokenKind::Indent);
        } else if column < current {
            while self.indents.last().is_some_and(|&level| level > column) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&column) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn end_line(&mut self) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline));
        if needs_newline {
            self.push(TokenKind::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while self.peek_at(0).is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<(), ScriptError> {
        let mut digits = String::new();
        while let Some(c) = self.peek_at(0) {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c != '_' {
                break;
            }
            self.pos += 1;
        }
        if self.peek_at(0).is_some_and(|c| c.is_alphabetic() || c == '.') {
            return Err(self.error("only integer literals are supported"));
        }
        let value = digits
            .parse::<i64>()
            .map_err(|_| self.error("integer literal is too large"))?;
        self.push(TokenKind::Int(value));
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), ScriptError> {
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek_at(0) else {
                return Err(self.error("unterminated string literal"));
            };
            self.pos += 1;
            match c {
                '\n' => return Err(self.error("unterminated string literal")),
                c if c == quote => break,
                '\\' => {
                    let Some(escaped) = self.peek_at(0) else {
                        return Err(self.error("unterminated string literal"));
                    };
                    self.pos += 1;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\n' => self.line += 1,
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c => value.push(c),
            }
        }
        self.push(TokenKind::Str(value));
        Ok(())
    }

    fn word(&mut self) {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let kind = match word.as_str() {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "raise" => TokenKind::Raise,
            "assert" => TokenKind::Assert,
            "pass" => TokenKind::Pass,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            _ => TokenKind::Name(word),
        };
        self.push(kind);
    }

    fn operator(&mut self, c: char) -> Result<(), ScriptError> {
        let next = self.peek_at(1);
        let (kind, width) = match (c, next) {
            ('/', Some('/')) => (TokenKind::SlashSlash, 2),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('+', Some('=')) => (TokenKind::PlusAssign, 2),
            ('-', Some('=')) => (TokenKind::MinusAssign, 2),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('/', _) => return Err(self.error("'/' is not supported, use '//'")),
            (other, _) => return Err(self.error(&format!("unexpected character '{other}'"))),
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.pos += width;
        self.push(kind);
        Ok(())
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("output = 'PASS'"),
            vec![
                TokenKind::Name("output".into()),
                TokenKind::Assign,
                TokenKind::Str("PASS".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let tokens = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
        let indent = tokens.iter().position(|t| *t == TokenKind::Indent).unwrap();
        assert_eq!(tokens[indent - 1], TokenKind::Newline);
    }

    #[test]
    fn test_blank_lines_and_comments_skipped() {
        let tokens = kinds("# header\n\n   \nx = 1  # trailing\n\n");
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn test_newlines_inside_brackets_ignored() {
        let tokens = kinds("x = [1,\n  2]\n");
        assert_eq!(tokens.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(kinds(r#""a\nb\"""#)[0], TokenKind::Str("a\nb\"".into()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a // b != c")[1..4],
            [
                TokenKind::SlashSlash,
                TokenKind::Name("b".into()),
                TokenKind::Ne
            ]
        );
    }

    #[test]
    fn test_errors_carry_line() {
        let err = tokenize("x = 1\ny = 'open").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Syntax {
                line: 2,
                message: "unterminated string literal".into()
            }
        );
        assert!(tokenize("x = 1 / 2").is_err());
        assert!(tokenize("x = 1.5").is_err());
    }

    #[test]
    fn test_bad_dedent() {
        assert!(tokenize("if x:\n    a = 1\n  b = 2\n").is_err());
    }
}
