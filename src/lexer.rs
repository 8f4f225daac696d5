use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    #[error("Empty character literal at index {position}")]
    EmptyCharacterLiteral { position: usize },
    #[error("Unterminated character literal at index {position}")]
    UnterminatedCharacter { position: usize },
    #[error("Invalid escape sequence at index {position}")]
    InvalidEscape { position: usize },
    #[error("Unterminated string literal at index {position}")]
    UnterminatedString { position: usize },
}

impl LexError {
    /// Zero-based byte offset at which lexing stopped.
    pub fn position(&self) -> usize {
        match *self {
            LexError::EmptyCharacterLiteral { position }
            | LexError::UnterminatedCharacter { position }
            | LexError::InvalidEscape { position }
            | LexError::UnterminatedString { position } => position,
        }
    }
}

pub type LexResult<T> = Result<T, LexError>;

/// Whitespace separates tokens but may not appear inside one.
fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\u{8}' | '\n' | '\r' | '\t')
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_escape_char(c: char) -> bool {
    matches!(c, 'b' | 'n' | 'r' | 't' | '\'' | '"' | '\\')
}

const TWO_CHAR_OPERATORS: [&str; 6] = ["<=", ">=", "==", "!=", "&&", "||"];

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn next_token(&mut self) -> LexResult<Option<Token<'a>>> {
        self.consume_while(is_whitespace);

        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        let start = self.pos;
        let token = if is_identifier_start(ch) {
            self.read_identifier(start)
        } else if ch.is_ascii_digit() {
            self.read_number(start)
        } else if (ch == '+' || ch == '-') && self.digit_follows_sign() {
            self.consume_char();
            self.read_number(start)
        } else if ch == '\'' {
            self.read_character(start)?
        } else if ch == '"' {
            self.read_string(start)?
        } else {
            self.read_operator(start)
        };
        Ok(Some(token))
    }

    fn digit_follows_sign(&self) -> bool {
        self.char_at(self.pos + 1)
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        self.consume_while(is_identifier_part);
        self.emit(TokenKind::Identifier, start)
    }

    fn read_number(&mut self, start: usize) -> Token<'a> {
        // A leading zero may not be followed by another digit, so "01" lexes
        // as the two integers "0" and "1". A fraction after "0" is still fine.
        if self.peek_char() == Some('0') {
            self.consume_char();
        } else {
            self.consume_while(|c| c.is_ascii_digit());
        }

        let mut kind = TokenKind::Integer;
        if self.peek_char() == Some('.')
            && self
                .char_at(self.pos + 1)
                .is_some_and(|c| c.is_ascii_digit())
        {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            kind = TokenKind::Decimal;
        }
        self.emit(kind, start)
    }

    fn read_character(&mut self, start: usize) -> LexResult<Token<'a>> {
        self.consume_char();
        match self.peek_char() {
            None => return Err(LexError::UnterminatedCharacter { position: self.pos }),
            Some('\'') => return Err(LexError::EmptyCharacterLiteral { position: self.pos }),
            Some('\\') => self.read_escape()?,
            Some(c) if c != '\n' && c != '\r' => {
                self.consume_char();
            }
            Some(_) => return Err(LexError::UnterminatedCharacter { position: self.pos }),
        }
        if self.peek_char() == Some('\'') {
            self.consume_char();
            Ok(self.emit(TokenKind::Character, start))
        } else {
            Err(LexError::UnterminatedCharacter { position: self.pos })
        }
    }

    fn read_string(&mut self, start: usize) -> LexResult<Token<'a>> {
        self.consume_char();
        loop {
            match self.peek_char() {
                None | Some('\n') | Some('\r') => {
                    return Err(LexError::UnterminatedString { position: self.pos });
                }
                Some('"') => {
                    self.consume_char();
                    return Ok(self.emit(TokenKind::String, start));
                }
                Some('\\') => self.read_escape()?,
                Some(_) => {
                    self.consume_char();
                }
            }
        }
    }

    fn read_escape(&mut self) -> LexResult<()> {
        self.consume_char();
        match self.peek_char() {
            Some(c) if is_escape_char(c) => {
                self.consume_char();
                Ok(())
            }
            _ => Err(LexError::InvalidEscape { position: self.pos }),
        }
    }

    fn read_operator(&mut self, start: usize) -> Token<'a> {
        for pair in TWO_CHAR_OPERATORS {
            if self.input[self.pos..].starts_with(pair) {
                self.pos += pair.len();
                return self.emit(TokenKind::Operator, start);
            }
        }
        self.consume_char();
        self.emit(TokenKind::Operator, start)
    }

    fn emit(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.pos], start)
    }

    fn consume_while<P>(&mut self, keep_predicate: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

/// Lexes the whole input, failing on the first malformed literal. No partial
/// token list is ever returned alongside an error.
pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(input: &str) -> Token<'_> {
        let tokens = tokenize(input).expect("tokenize should succeed");
        assert_eq!(tokens.len(), 1, "expected one token for {input:?}");
        tokens[0]
    }

    #[test]
    fn lexes_let_statement_with_offsets() {
        let tokens = tokenize("LET x = 5;").expect("tokenize should succeed");
        let expected = vec![
            Token::new(TokenKind::Identifier, "LET", 0),
            Token::new(TokenKind::Identifier, "x", 4),
            Token::new(TokenKind::Operator, "=", 6),
            Token::new(TokenKind::Integer, "5", 8),
            Token::new(TokenKind::Operator, ";", 9),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn lexes_print_call() {
        let tokens = tokenize("print(\"Hello, World!\");").expect("tokenize should succeed");
        let expected = vec![
            Token::new(TokenKind::Identifier, "print", 0),
            Token::new(TokenKind::Operator, "(", 5),
            Token::new(TokenKind::String, "\"Hello, World!\"", 6),
            Token::new(TokenKind::Operator, ")", 21),
            Token::new(TokenKind::Operator, ";", 22),
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn identifiers_may_contain_digits_underscores_and_hyphens() {
        assert_eq!(
            single("thelegend27"),
            Token::new(TokenKind::Identifier, "thelegend27", 0)
        );
        assert_eq!(single("x-5"), Token::new(TokenKind::Identifier, "x-5", 0));
        assert_eq!(
            single("_tmp"),
            Token::new(TokenKind::Identifier, "_tmp", 0)
        );
    }

    #[test]
    fn signed_numbers_keep_their_sign() {
        assert_eq!(single("+0"), Token::new(TokenKind::Integer, "+0", 0));
        assert_eq!(single("-0"), Token::new(TokenKind::Integer, "-0", 0));
        assert_eq!(single("-1000"), Token::new(TokenKind::Integer, "-1000", 0));
        assert_eq!(single("-1.0"), Token::new(TokenKind::Decimal, "-1.0", 0));
        assert_eq!(
            single("3.14159"),
            Token::new(TokenKind::Decimal, "3.14159", 0)
        );
    }

    #[test]
    fn sign_without_digit_is_an_operator() {
        let tokens = tokenize("-five").expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Operator, "-", 0),
                Token::new(TokenKind::Identifier, "five", 1),
            ]
        );
    }

    #[test]
    fn leading_zero_splits_into_two_integers() {
        let tokens = tokenize("01").expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Integer, "0", 0),
                Token::new(TokenKind::Integer, "1", 1),
            ]
        );
    }

    #[test]
    fn trailing_and_leading_dots_are_not_decimals() {
        let tokens = tokenize("1.").expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Integer, "1", 0),
                Token::new(TokenKind::Operator, ".", 1),
            ]
        );

        let tokens = tokenize(".5").expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Operator, ".", 0),
                Token::new(TokenKind::Integer, "5", 1),
            ]
        );
    }

    #[test]
    fn lexes_character_literals() {
        assert_eq!(single("'a'"), Token::new(TokenKind::Character, "'a'", 0));
        assert_eq!(
            single("'\\n'"),
            Token::new(TokenKind::Character, "'\\n'", 0)
        );
    }

    #[test]
    fn errors_on_empty_character_literal() {
        let err = tokenize("''").expect_err("expected failure");
        assert_eq!(err, LexError::EmptyCharacterLiteral { position: 1 });
    }

    #[test]
    fn errors_on_multi_character_literal() {
        let err = tokenize("'abc'").expect_err("expected failure");
        assert_eq!(err, LexError::UnterminatedCharacter { position: 2 });
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(single("\"\""), Token::new(TokenKind::String, "\"\"", 0));
        assert_eq!(
            single("\"str\\ning\""),
            Token::new(TokenKind::String, "\"str\\ning\"", 0)
        );
        assert_eq!(
            single("\"She said, \\\"Hello!\\\"\""),
            Token::new(TokenKind::String, "\"She said, \\\"Hello!\\\"\"", 0)
        );
    }

    #[test]
    fn unterminated_string_fails_past_the_consumed_prefix() {
        let err = tokenize("\"unterminated").expect_err("expected failure");
        assert_eq!(err, LexError::UnterminatedString { position: 13 });
    }

    #[test]
    fn errors_on_invalid_escape() {
        let err = tokenize("\"invalid\\escape\"").expect_err("expected failure");
        assert_eq!(err, LexError::InvalidEscape { position: 9 });

        let err = tokenize("'\\x'").expect_err("expected failure");
        assert_eq!(err, LexError::InvalidEscape { position: 2 });
    }

    #[test]
    fn lexes_two_character_operators_greedily() {
        for op in ["<=", ">=", "==", "!=", "&&", "||"] {
            assert_eq!(single(op), Token::new(TokenKind::Operator, op, 0));
        }
        let tokens = tokenize("&|").expect("tokenize should succeed");
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Operator, "&", 0),
                Token::new(TokenKind::Operator, "|", 1),
            ]
        );
    }

    #[test]
    fn any_non_whitespace_symbol_is_an_operator() {
        let tokens = tokenize("while(num!=5){return 0;}").expect("tokenize should succeed");
        let kinds_and_literals = tokens
            .iter()
            .map(|token| (token.kind, token.literal))
            .collect::<Vec<_>>();
        assert_eq!(
            kinds_and_literals,
            vec![
                (TokenKind::Identifier, "while"),
                (TokenKind::Operator, "("),
                (TokenKind::Identifier, "num"),
                (TokenKind::Operator, "!="),
                (TokenKind::Integer, "5"),
                (TokenKind::Operator, ")"),
                (TokenKind::Operator, "{"),
                (TokenKind::Identifier, "return"),
                (TokenKind::Integer, "0"),
                (TokenKind::Operator, ";"),
                (TokenKind::Operator, "}"),
            ]
        );
    }

    #[test]
    fn whitespace_only_input_produces_no_tokens() {
        assert_eq!(tokenize(" \t\r\n ").expect("tokenize should succeed"), vec![]);
        assert_eq!(tokenize("").expect("tokenize should succeed"), vec![]);
    }
}
