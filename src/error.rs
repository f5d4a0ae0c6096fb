//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage returns a [`CompileResult`] and stops at the first fault. The
//! error carries the stage that raised it and, where one exists, the source
//! span, so the driver can point at the offending byte with a caret.

use std::fmt;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Byte range in the source buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
  pub start: usize,
  pub len: usize,
}

impl Span {
  pub fn new(start: usize, len: usize) -> Self {
    Self { start, len }
  }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Lex,
  Parse,
  Resolve,
  Lower,
  Emit,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Lex => "lex",
      Stage::Parse => "parse",
      Stage::Resolve => "resolve",
      Stage::Lower => "lower",
      Stage::Emit => "emit",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{message}"))]
  Lex { message: String, span: Span },

  #[snafu(display("{message}"))]
  Syntax { message: String, span: Span },

  #[snafu(display("undefined reference to variable '{name}'"))]
  UndefinedVariable { name: String, span: Span },

  #[snafu(display("undefined reference to function '{name}'"))]
  UndefinedFunction { name: String, span: Span },

  #[snafu(display("function '{name}' is already defined"))]
  DuplicateFunction { name: String, span: Span },

  #[snafu(display(
    "function '{name}' takes {expected} argument(s) but {found} were supplied"
  ))]
  ArityMismatch {
    name: String,
    expected: usize,
    found: usize,
    span: Span,
  },

  #[snafu(display("{kind} found where a statement was expected"))]
  MalformedStatement {
    stage: Stage,
    kind: &'static str,
    span: Span,
  },

  #[snafu(display("{kind} found where an expression was expected"))]
  MalformedExpression {
    stage: Stage,
    kind: &'static str,
    span: Span,
  },

  #[snafu(display("{kind} reached lowering without resolver annotations"))]
  Unresolved { kind: &'static str, span: Span },

  #[snafu(display("instruction '{instruction}' is not supported by the backend"))]
  UnsupportedInstruction { instruction: String },
}

impl CompileError {
  pub fn stage(&self) -> Stage {
    match self {
      Self::Lex { .. } => Stage::Lex,
      Self::Syntax { .. } => Stage::Parse,
      Self::UndefinedVariable { .. }
      | Self::UndefinedFunction { .. }
      | Self::DuplicateFunction { .. }
      | Self::ArityMismatch { .. } => Stage::Resolve,
      Self::MalformedStatement { stage, .. } | Self::MalformedExpression { stage, .. } => *stage,
      Self::Unresolved { .. } => Stage::Lower,
      Self::UnsupportedInstruction { .. } => Stage::Emit,
    }
  }

  pub fn span(&self) -> Option<Span> {
    match self {
      Self::Lex { span, .. }
      | Self::Syntax { span, .. }
      | Self::UndefinedVariable { span, .. }
      | Self::UndefinedFunction { span, .. }
      | Self::DuplicateFunction { span, .. }
      | Self::ArityMismatch { span, .. }
      | Self::MalformedStatement { span, .. }
      | Self::MalformedExpression { span, .. }
      | Self::Unresolved { span, .. } => Some(*span),
      Self::UnsupportedInstruction { .. } => None,
    }
  }

  /// Render the diagnostic against the source it was produced from: a
  /// `line:column` header, the offending line, and a caret under the span.
  pub fn render(&self, source: &str) -> String {
    let Some(span) = self.span() else {
      return format!("{} error: {self}", self.stage());
    };

    let mut loc = span.start.min(source.len());
    while !source.is_char_boundary(loc) {
      loc -= 1;
    }
    let line_start = source[..loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[loc..].find('\n').map_or(source.len(), |i| loc + i);
    let line_no = source[..line_start].matches('\n').count() + 1;
    let column = source[line_start..loc].chars().count();
    let marker = format!("{}^", " ".repeat(column));

    format!(
      "{line_no}:{}: {} error\n{}\n{marker} {self}",
      column + 1,
      self.stage(),
      &source[line_start..line_end],
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn render_points_at_the_offending_column() {
    let source = "fn main() {\n  return @;\n}\n";
    let err = CompileError::Lex {
      message: "invalid token: '@'".to_string(),
      span: Span::new(21, 1),
    };
    let rendered = err.render(source);
    assert_eq!(
      rendered,
      "2:10: lex error\n  return @;\n         ^ invalid token: '@'"
    );
  }

  #[test]
  fn render_without_span_names_the_stage() {
    let err = CompileError::UnsupportedInstruction {
      instruction: "POP 1".to_string(),
    };
    assert_eq!(err.stage(), Stage::Emit);
    assert_eq!(
      err.render(""),
      "emit error: instruction 'POP 1' is not supported by the backend"
    );
  }

  #[test]
  fn malformed_nodes_report_their_own_stage() {
    let err = CompileError::MalformedExpression {
      stage: Stage::Lower,
      kind: "ReturnStatement",
      span: Span::default(),
    };
    assert_eq!(err.stage(), Stage::Lower);
    assert_eq!(
      err.to_string(),
      "ReturnStatement found where an expression was expected"
    );
  }
}
