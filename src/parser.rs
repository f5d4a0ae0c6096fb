//! Recursive-descent parser producing the translation-unit AST.
//!
//! Expressions use one helper per precedence level, each parsing an operand
//! at the next tighter level and then looping on its own operators, so every
//! level is left-associative. All lookahead goes through the lexer's single
//! pushback slot: read a token, and if it does not fit, put it back.
//!
//! The first unexpected token ends the parse with a `Syntax` error.
//! Blocks, parentheses, unary operators and call arguments may nest at most
//! [`MAX_NESTING`] levels deep.

use std::fmt;

use tracing::debug;

use crate::ast::{AstNode, BinaryOp, Identifier, UnaryOp};
use crate::error::{CompileError, CompileResult, Span};
use crate::tokenizer::{Lexer, Token, TokenKind, describe_token, token_text};

/// Deepest nesting of blocks and sub-expressions the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Parse a whole source buffer into an `AstNode::TranslationUnit`.
pub fn parse(source: &str) -> CompileResult<AstNode> {
  let mut stream = TokenStream::new(Lexer::new(source));
  let mut functions = Vec::new();

  loop {
    let token = stream.next()?;
    match token.kind {
      TokenKind::Eof => break,
      TokenKind::Fn => functions.push(parse_function(&mut stream)?),
      _ => return Err(stream.unexpected(&token, TokenKind::Fn)),
    }
  }

  debug!(functions = functions.len(), "parsed translation unit");
  Ok(AstNode::TranslationUnit { functions })
}

/// `fn` has already been consumed.
fn parse_function(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let name = stream.expect_ident()?;
  stream.expect(TokenKind::LParen)?;

  let mut params = Vec::new();
  let token = stream.next()?;
  match token.kind {
    TokenKind::RParen => {}
    TokenKind::Identifier => {
      params.push(stream.identifier(&token));
      loop {
        let token = stream.next()?;
        match token.kind {
          TokenKind::RParen => break,
          TokenKind::Comma => params.push(stream.expect_ident()?),
          _ => return Err(stream.unexpected(&token, "',' or ')'")),
        }
      }
    }
    _ => return Err(stream.unexpected(&token, "identifier or ')'")),
  }

  let body = parse_block(stream)?;
  Ok(AstNode::FunctionDefinition {
    name,
    params,
    body,
    scope: None,
  })
}

/// `{ statement* }`
fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<AstNode>> {
  let open = stream.expect(TokenKind::LBrace)?;
  stream.enter(&open)?;

  let mut stmts = Vec::new();
  loop {
    let token = stream.next()?;
    let stmt = match token.kind {
      TokenKind::RBrace => {
        stream.leave();
        return Ok(stmts);
      }
      TokenKind::Let => parse_declaration(stream, &token)?,
      TokenKind::If => parse_if(stream, &token)?,
      TokenKind::Return => parse_return(stream, &token)?,
      TokenKind::LBrace => {
        stream.unget();
        let stmts = parse_block(stream)?;
        AstNode::BlockStatement {
          stmts,
          scope: None,
          span: token.span(),
        }
      }
      TokenKind::Identifier
      | TokenKind::Constant
      | TokenKind::Bang
      | TokenKind::Tilde
      | TokenKind::LParen => {
        stream.unget();
        let expr = parse_expr(stream)?;
        stream.expect(TokenKind::Semicolon)?;
        AstNode::ExpressionStatement {
          expr: Box::new(expr),
          span: token.span(),
        }
      }
      _ => return Err(stream.unexpected(&token, "statement or '}'")),
    };
    stmts.push(stmt);
  }
}

/// `let ident = expr;` with `let` consumed.
fn parse_declaration(stream: &mut TokenStream, let_token: &Token) -> CompileResult<AstNode> {
  let target = stream.expect_ident()?;
  stream.expect(TokenKind::Assign)?;
  let init = parse_expr(stream)?;
  stream.expect(TokenKind::Semicolon)?;
  Ok(AstNode::Declaration {
    target,
    init: Box::new(init),
    span: let_token.span(),
  })
}

/// `if expr { ... } [else ({ ... } | if ...)]` with `if` consumed.
fn parse_if(stream: &mut TokenStream, if_token: &Token) -> CompileResult<AstNode> {
  stream.enter(if_token)?;
  let condition = parse_expr(stream)?;
  let then_branch = parse_block(stream)?;

  let mut else_branch = Vec::new();
  let token = stream.next()?;
  if token.kind == TokenKind::Else {
    let token = stream.next()?;
    match token.kind {
      TokenKind::If => else_branch.push(parse_if(stream, &token)?),
      TokenKind::LBrace => {
        stream.unget();
        else_branch = parse_block(stream)?;
      }
      _ => return Err(stream.unexpected(&token, "'if' or '{'")),
    }
  } else {
    stream.unget();
  }

  stream.leave();
  Ok(AstNode::IfStatement {
    condition: Box::new(condition),
    then_branch,
    else_branch,
    then_scope: None,
    else_scope: None,
    span: if_token.span(),
  })
}

/// `return expr;` with `return` consumed.
fn parse_return(stream: &mut TokenStream, return_token: &Token) -> CompileResult<AstNode> {
  let expr = parse_expr(stream)?;
  stream.expect(TokenKind::Semicolon)?;
  Ok(AstNode::ReturnStatement {
    expr: Box::new(expr),
    span: return_token.span(),
  })
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<AstNode> {
  parse_logical_or(stream)
}

fn parse_logical_or(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[(TokenKind::PipePipe, BinaryOp::LogicalOr)],
    parse_logical_and,
  )
}

fn parse_logical_and(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[(TokenKind::AmpAmp, BinaryOp::LogicalAnd)],
    parse_bit_or,
  )
}

fn parse_bit_or(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(stream, &[(TokenKind::Pipe, BinaryOp::BitOr)], parse_bit_xor)
}

fn parse_bit_xor(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(stream, &[(TokenKind::Caret, BinaryOp::BitXor)], parse_bit_and)
}

fn parse_bit_and(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(stream, &[(TokenKind::Amp, BinaryOp::BitAnd)], parse_equality)
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::Ne, BinaryOp::Ne)],
    parse_relational,
  )
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[
      (TokenKind::Lt, BinaryOp::Lt),
      (TokenKind::Gt, BinaryOp::Gt),
      (TokenKind::Le, BinaryOp::Le),
      (TokenKind::Ge, BinaryOp::Ge),
    ],
    parse_add,
  )
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
    parse_mul,
  )
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<AstNode> {
  binary_level(
    stream,
    &[
      (TokenKind::Star, BinaryOp::Mul),
      (TokenKind::Slash, BinaryOp::Div),
      (TokenKind::Percent, BinaryOp::Mod),
    ],
    parse_unary,
  )
}

/// One left-associative level: `operand (op operand)*`.
fn binary_level(
  stream: &mut TokenStream,
  ops: &[(TokenKind, BinaryOp)],
  operand: fn(&mut TokenStream) -> CompileResult<AstNode>,
) -> CompileResult<AstNode> {
  let mut node = operand(stream)?;

  loop {
    let token = stream.next()?;
    let Some(&(_, op)) = ops.iter().find(|(kind, _)| *kind == token.kind) else {
      stream.unget();
      return Ok(node);
    };
    let rhs = operand(stream)?;
    node = AstNode::binary(op, node, rhs, token.span());
  }
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let token = stream.next()?;
  let op = match token.kind {
    TokenKind::Bang => UnaryOp::LogicalNot,
    TokenKind::Tilde => UnaryOp::BitNot,
    _ => {
      stream.unget();
      return parse_postfix(stream);
    }
  };

  stream.enter(&token)?;
  let operand = parse_unary(stream)?;
  stream.leave();
  Ok(AstNode::unary(op, operand, token.span()))
}

/// Primary expressions; a call is the only postfix form.
fn parse_postfix(stream: &mut TokenStream) -> CompileResult<AstNode> {
  let token = stream.next()?;
  match token.kind {
    TokenKind::Constant => {
      let text = token_text(&token, stream.source());
      let value = text.parse::<i64>().map_err(|err| CompileError::Syntax {
        message: format!("invalid constant '{text}': {err}"),
        span: token.span(),
      })?;
      Ok(AstNode::constant(value, token.span()))
    }
    TokenKind::LParen => {
      stream.enter(&token)?;
      let node = parse_expr(stream)?;
      stream.expect(TokenKind::RParen)?;
      stream.leave();
      Ok(node)
    }
    TokenKind::Identifier => {
      let callee = stream.identifier(&token);
      if stream.next()?.kind != TokenKind::LParen {
        stream.unget();
        return Ok(AstNode::Identifier(callee));
      }
      stream.enter(&token)?;
      let args = parse_call_args(stream)?;
      stream.leave();
      Ok(AstNode::call(callee, args))
    }
    _ => Err(stream.unexpected(&token, "constant, identifier or '('")),
  }
}

/// Arguments after the opening parenthesis, through the closing one.
fn parse_call_args(stream: &mut TokenStream) -> CompileResult<Vec<AstNode>> {
  let mut args = Vec::new();
  if stream.next()?.kind == TokenKind::RParen {
    return Ok(args);
  }
  stream.unget();

  args.push(parse_expr(stream)?);
  loop {
    let token = stream.next()?;
    match token.kind {
      TokenKind::RParen => return Ok(args),
      TokenKind::Comma => args.push(parse_expr(stream)?),
      _ => return Err(stream.unexpected(&token, "',' or ')'")),
    }
  }
}

/// Cursor over the lexer with helpers for the expect/report patterns.
struct TokenStream<'a> {
  lexer: Lexer<'a>,
  depth: usize,
}

impl<'a> TokenStream<'a> {
  fn new(lexer: Lexer<'a>) -> Self {
    Self { lexer, depth: 0 }
  }

  /// Open one nesting level at `token`. The count is not unwound on error;
  /// the stream is dropped with it.
  fn enter(&mut self, token: &Token) -> CompileResult<()> {
    self.depth += 1;
    if self.depth > MAX_NESTING {
      return Err(CompileError::Syntax {
        message: format!("nesting exceeds {MAX_NESTING} levels"),
        span: token.span(),
      });
    }
    Ok(())
  }

  fn leave(&mut self) {
    self.depth -= 1;
  }

  fn source(&self) -> &'a str {
    self.lexer.source()
  }

  fn next(&mut self) -> CompileResult<Token> {
    self.lexer.next_token()
  }

  fn unget(&mut self) {
    self.lexer.unget();
  }

  /// Consume a token of the given kind or fail naming both kinds.
  fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
    let token = self.next()?;
    if token.kind == kind {
      Ok(token)
    } else {
      Err(self.unexpected(&token, kind))
    }
  }

  fn expect_ident(&mut self) -> CompileResult<Identifier> {
    let token = self.expect(TokenKind::Identifier)?;
    Ok(self.identifier(&token))
  }

  fn identifier(&self, token: &Token) -> Identifier {
    Identifier::new(token_text(token, self.source()), token.span())
  }

  fn unexpected(&self, token: &Token, expected: impl fmt::Display) -> CompileError {
    let got = describe_token(token, self.source());
    CompileError::Syntax {
      message: format!("expected {expected}, but got {got}"),
      span: Span::new(token.loc, token.len),
    }
  }
}
