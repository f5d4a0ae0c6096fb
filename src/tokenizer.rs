//! Lexical analysis: turns the raw input string into a stream of tokens.
//!
//! The lexer knows nothing about semantics beyond recognising keywords,
//! operators, identifiers and numeric literals. Tokens only record where they
//! start and how long they are; text is recovered by slicing the source.
//! Multi-character punctuators are matched before single-character ones.

use std::fmt;

use tracing::trace;

use crate::error::{CompileResult, LexSnafu, Span};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Fn,
  Let,
  If,
  Else,
  Return,
  Identifier,
  Constant,
  LParen,
  RParen,
  LBrace,
  RBrace,
  Comma,
  Semicolon,
  Assign,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Bang,
  Tilde,
  Amp,
  Pipe,
  Caret,
  AmpAmp,
  PipePipe,
  Lt,
  Gt,
  Le,
  Ge,
  EqEq,
  Ne,
  Eof,
}

impl TokenKind {
  fn keyword(text: &str) -> Option<Self> {
    match text {
      "fn" => Some(Self::Fn),
      "let" => Some(Self::Let),
      "if" => Some(Self::If),
      "else" => Some(Self::Else),
      "return" => Some(Self::Return),
      _ => None,
    }
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      TokenKind::Fn => "'fn'",
      TokenKind::Let => "'let'",
      TokenKind::If => "'if'",
      TokenKind::Else => "'else'",
      TokenKind::Return => "'return'",
      TokenKind::Identifier => "identifier",
      TokenKind::Constant => "constant",
      TokenKind::LParen => "'('",
      TokenKind::RParen => "')'",
      TokenKind::LBrace => "'{'",
      TokenKind::RBrace => "'}'",
      TokenKind::Comma => "','",
      TokenKind::Semicolon => "';'",
      TokenKind::Assign => "'='",
      TokenKind::Plus => "'+'",
      TokenKind::Minus => "'-'",
      TokenKind::Star => "'*'",
      TokenKind::Slash => "'/'",
      TokenKind::Percent => "'%'",
      TokenKind::Bang => "'!'",
      TokenKind::Tilde => "'~'",
      TokenKind::Amp => "'&'",
      TokenKind::Pipe => "'|'",
      TokenKind::Caret => "'^'",
      TokenKind::AmpAmp => "'&&'",
      TokenKind::PipePipe => "'||'",
      TokenKind::Lt => "'<'",
      TokenKind::Gt => "'>'",
      TokenKind::Le => "'<='",
      TokenKind::Ge => "'>='",
      TokenKind::EqEq => "'=='",
      TokenKind::Ne => "'!='",
      TokenKind::Eof => "end of input",
    };
    f.write_str(text)
  }
}

const PUNCTUATORS: [(&str, TokenKind); 25] = [
  ("&&", TokenKind::AmpAmp),
  ("||", TokenKind::PipePipe),
  ("<=", TokenKind::Le),
  (">=", TokenKind::Ge),
  ("==", TokenKind::EqEq),
  ("!=", TokenKind::Ne),
  ("(", TokenKind::LParen),
  (")", TokenKind::RParen),
  ("{", TokenKind::LBrace),
  ("}", TokenKind::RBrace),
  (",", TokenKind::Comma),
  (";", TokenKind::Semicolon),
  ("=", TokenKind::Assign),
  ("+", TokenKind::Plus),
  ("-", TokenKind::Minus),
  ("*", TokenKind::Star),
  ("/", TokenKind::Slash),
  ("%", TokenKind::Percent),
  ("!", TokenKind::Bang),
  ("~", TokenKind::Tilde),
  ("&", TokenKind::Amp),
  ("|", TokenKind::Pipe),
  ("^", TokenKind::Caret),
  ("<", TokenKind::Lt),
  (">", TokenKind::Gt),
];

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  pub fn new(kind: TokenKind, loc: usize, len: usize) -> Self {
    Self { kind, loc, len }
  }

  pub fn span(&self) -> Span {
    Span::new(self.loc, self.len)
  }
}

/// On-demand lexer with a single pending-token slot.
///
/// `unget` re-queues the token most recently returned by `next_token`. The
/// slot holds at most one token: a second `unget` before the next read
/// leaves it as it is.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  last: Option<Token>,
  pending: Option<Token>,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      last: None,
      pending: None,
    }
  }

  pub fn source(&self) -> &'a str {
    self.source
  }

  /// Return the next token, draining the pushback slot first.
  pub fn next_token(&mut self) -> CompileResult<Token> {
    let token = match self.pending.take() {
      Some(token) => token,
      None => self.scan()?,
    };
    self.last = Some(token);
    Ok(token)
  }

  /// Push the last token back so the next `next_token` returns it again.
  pub fn unget(&mut self) {
    if self.pending.is_none() {
      self.pending = self.last.take();
    }
  }

  fn skip_whitespace_and_comments(&mut self) {
    let bytes = self.source.as_bytes();
    loop {
      while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
        self.pos += 1;
      }

      if self.source[self.pos..].starts_with("//") {
        while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
          self.pos += 1;
        }
        continue;
      }

      break;
    }
  }

  fn scan(&mut self) -> CompileResult<Token> {
    self.skip_whitespace_and_comments();

    let input = self.source;
    let bytes = input.as_bytes();
    let start = self.pos;
    if start >= bytes.len() {
      return Ok(Token::new(TokenKind::Eof, input.len(), 0));
    }

    let c = bytes[start];
    let token = if c.is_ascii_digit() {
      let mut i = start + 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      Token::new(TokenKind::Constant, start, i - start)
    } else if c.is_ascii_alphabetic() || c == b'_' {
      let mut i = start + 1;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let kind = TokenKind::keyword(&input[start..i]).unwrap_or(TokenKind::Identifier);
      Token::new(kind, start, i - start)
    } else if let Some((op, kind)) = PUNCTUATORS
      .into_iter()
      .find(|(op, _)| input[start..].starts_with(op))
    {
      Token::new(kind, start, op.len())
    } else {
      let invalid_char = input[start..].chars().next().unwrap_or('\0');
      return LexSnafu {
        message: format!("invalid token: '{invalid_char}'"),
        span: Span::new(start, invalid_char.len_utf8()),
      }
      .fail();
    };

    self.pos = token.loc + token.len;
    trace!(kind = ?token.kind, loc = token.loc, "token");
    Ok(token)
  }
}

/// Lex the whole input into a vector terminated by an `Eof` token.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut lexer = Lexer::new(input);
  let mut tokens = Vec::new();
  loop {
    let token = lexer.next_token()?;
    tokens.push(token);
    if token.kind == TokenKind::Eof {
      return Ok(tokens);
    }
  }
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token, source: &str) -> String {
  match token.kind {
    TokenKind::Eof => "end of input".to_string(),
    TokenKind::Identifier | TokenKind::Constant => {
      format!("{} '{}'", token.kind, token_text(token, source))
    }
    _ => token.kind.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input)
      .expect("input should lex")
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn keywords_and_identifiers() {
    assert_eq!(
      kinds("fn let if else return lettuce _x1"),
      vec![
        TokenKind::Fn,
        TokenKind::Let,
        TokenKind::If,
        TokenKind::Else,
        TokenKind::Return,
        TokenKind::Identifier,
        TokenKind::Identifier,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn two_character_punctuators_win() {
    assert_eq!(
      kinds("a<=b&&c||d!=e==f>=g"),
      vec![
        TokenKind::Identifier,
        TokenKind::Le,
        TokenKind::Identifier,
        TokenKind::AmpAmp,
        TokenKind::Identifier,
        TokenKind::PipePipe,
        TokenKind::Identifier,
        TokenKind::Ne,
        TokenKind::Identifier,
        TokenKind::EqEq,
        TokenKind::Identifier,
        TokenKind::Ge,
        TokenKind::Identifier,
        TokenKind::Eof,
      ]
    );
    assert_eq!(
      kinds("& | ^ ~ !"),
      vec![
        TokenKind::Amp,
        TokenKind::Pipe,
        TokenKind::Caret,
        TokenKind::Tilde,
        TokenKind::Bang,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn comments_are_skipped() {
    let source = "// header\nreturn 42; // trailing\n";
    let tokens = tokenize(source).expect("input should lex");
    assert_eq!(tokens[0].kind, TokenKind::Return);
    assert_eq!(token_text(&tokens[1], source), "42");
    assert_eq!(tokens[2].kind, TokenKind::Semicolon);
    assert_eq!(tokens[3].kind, TokenKind::Eof);
  }

  #[test]
  fn tokens_borrow_their_text_from_the_source() {
    let source = "  counter ";
    let tokens = tokenize(source).expect("input should lex");
    assert_eq!(tokens[0].loc, 2);
    assert_eq!(tokens[0].len, 7);
    assert_eq!(token_text(&tokens[0], source), "counter");
  }

  #[test]
  fn unget_replays_exactly_one_token() {
    let mut lexer = Lexer::new("a b");
    let a = lexer.next_token().unwrap();
    lexer.unget();
    lexer.unget();
    assert_eq!(lexer.next_token().unwrap(), a);
    let b = lexer.next_token().unwrap();
    assert_eq!(token_text(&b, "a b"), "b");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
  }

  #[test]
  fn invalid_character_is_reported_with_its_location() {
    let err = tokenize("let x = 1 @ 2;").unwrap_err();
    assert_eq!(err.to_string(), "invalid token: '@'");
    assert_eq!(err.span(), Some(Span::new(10, 1)));
  }
}
