//! Syntax tree shared by the parser, the resolver and the IR generator.
//!
//! Nodes form one closed enum so every stage matches exhaustively. Parents
//! own their children outright. The `Option` annotation slots start empty and
//! are filled in place by the resolver.

use std::fmt;

use crate::error::Span;
use crate::resolver::{Binding, FunctionSignature, ScopeId};

/// Binary operators, loosest binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  LogicalOr,
  LogicalAnd,
  BitOr,
  BitXor,
  BitAnd,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::LogicalOr => "||",
      BinaryOp::LogicalAnd => "&&",
      BinaryOp::BitOr => "|",
      BinaryOp::BitXor => "^",
      BinaryOp::BitAnd => "&",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Gt => ">",
      BinaryOp::Le => "<=",
      BinaryOp::Ge => ">=",
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Mod => "%",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  LogicalNot,
  BitNot,
}

impl UnaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      UnaryOp::LogicalNot => "!",
      UnaryOp::BitNot => "~",
    }
  }
}

/// A name as written in the source, plus the binding the resolver found for
/// it when it names a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
  pub name: String,
  pub span: Span,
  pub binding: Option<Binding>,
}

impl Identifier {
  pub fn new(name: impl Into<String>, span: Span) -> Self {
    Self {
      name: name.into(),
      span,
      binding: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  TranslationUnit {
    functions: Vec<AstNode>,
  },
  FunctionDefinition {
    name: Identifier,
    params: Vec<Identifier>,
    body: Vec<AstNode>,
    scope: Option<ScopeId>,
  },
  Declaration {
    target: Identifier,
    init: Box<AstNode>,
    span: Span,
  },
  ExpressionStatement {
    expr: Box<AstNode>,
    span: Span,
  },
  IfStatement {
    condition: Box<AstNode>,
    then_branch: Vec<AstNode>,
    else_branch: Vec<AstNode>,
    then_scope: Option<ScopeId>,
    else_scope: Option<ScopeId>,
    span: Span,
  },
  ReturnStatement {
    expr: Box<AstNode>,
    span: Span,
  },
  BlockStatement {
    stmts: Vec<AstNode>,
    scope: Option<ScopeId>,
    span: Span,
  },
  BinaryExpression {
    op: BinaryOp,
    left: Box<AstNode>,
    right: Box<AstNode>,
    span: Span,
  },
  UnaryExpression {
    op: UnaryOp,
    operand: Box<AstNode>,
    span: Span,
  },
  CallExpression {
    callee: Identifier,
    args: Vec<AstNode>,
    signature: Option<FunctionSignature>,
  },
  Identifier(Identifier),
  Constant {
    value: i64,
    span: Span,
  },
}

impl AstNode {
  pub fn constant(value: i64, span: Span) -> Self {
    Self::Constant { value, span }
  }

  pub fn ident(name: impl Into<String>, span: Span) -> Self {
    Self::Identifier(Identifier::new(name, span))
  }

  pub fn binary(op: BinaryOp, left: AstNode, right: AstNode, span: Span) -> Self {
    Self::BinaryExpression {
      op,
      left: Box::new(left),
      right: Box::new(right),
      span,
    }
  }

  pub fn unary(op: UnaryOp, operand: AstNode, span: Span) -> Self {
    Self::UnaryExpression {
      op,
      operand: Box::new(operand),
      span,
    }
  }

  pub fn call(callee: Identifier, args: Vec<AstNode>) -> Self {
    Self::CallExpression {
      callee,
      args,
      signature: None,
    }
  }

  /// Variant name, used in diagnostics and the tree dump.
  pub fn kind_name(&self) -> &'static str {
    match self {
      AstNode::TranslationUnit { .. } => "TranslationUnit",
      AstNode::FunctionDefinition { .. } => "FunctionDefinition",
      AstNode::Declaration { .. } => "Declaration",
      AstNode::ExpressionStatement { .. } => "ExpressionStatement",
      AstNode::IfStatement { .. } => "IfStatement",
      AstNode::ReturnStatement { .. } => "ReturnStatement",
      AstNode::BlockStatement { .. } => "BlockStatement",
      AstNode::BinaryExpression { .. } => "BinaryExpression",
      AstNode::UnaryExpression { .. } => "UnaryExpression",
      AstNode::CallExpression { .. } => "CallExpression",
      AstNode::Identifier(_) => "Identifier",
      AstNode::Constant { .. } => "Constant",
    }
  }

  pub fn span(&self) -> Span {
    match self {
      AstNode::TranslationUnit { functions } => {
        functions.first().map(AstNode::span).unwrap_or_default()
      }
      AstNode::FunctionDefinition { name, .. } => name.span,
      AstNode::CallExpression { callee, .. } => callee.span,
      AstNode::Identifier(ident) => ident.span,
      AstNode::Declaration { span, .. }
      | AstNode::ExpressionStatement { span, .. }
      | AstNode::IfStatement { span, .. }
      | AstNode::ReturnStatement { span, .. }
      | AstNode::BlockStatement { span, .. }
      | AstNode::BinaryExpression { span, .. }
      | AstNode::UnaryExpression { span, .. }
      | AstNode::Constant { span, .. } => *span,
    }
  }

  fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let pad = "  ".repeat(depth);
    match self {
      AstNode::TranslationUnit { functions } => {
        writeln!(f, "{pad}TranslationUnit")?;
        for function in functions {
          function.write_tree(f, depth + 1)?;
        }
      }
      AstNode::FunctionDefinition {
        name, params, body, ..
      } => {
        let params: Vec<&str> = params.iter().map(|param| param.name.as_str()).collect();
        writeln!(f, "{pad}Function[{}({})]", name.name, params.join(", "))?;
        for stmt in body {
          stmt.write_tree(f, depth + 1)?;
        }
      }
      AstNode::Declaration { target, init, .. } => {
        writeln!(f, "{pad}Declaration[{}]", target.name)?;
        init.write_tree(f, depth + 1)?;
      }
      AstNode::ExpressionStatement { expr, .. } => {
        writeln!(f, "{pad}ExpressionStatement")?;
        expr.write_tree(f, depth + 1)?;
      }
      AstNode::IfStatement {
        condition,
        then_branch,
        else_branch,
        ..
      } => {
        writeln!(f, "{pad}IfStatement")?;
        writeln!(f, "{pad}  Condition")?;
        condition.write_tree(f, depth + 2)?;
        writeln!(f, "{pad}  TrueBranch")?;
        for stmt in then_branch {
          stmt.write_tree(f, depth + 2)?;
        }
        writeln!(f, "{pad}  FalseBranch")?;
        for stmt in else_branch {
          stmt.write_tree(f, depth + 2)?;
        }
      }
      AstNode::ReturnStatement { expr, .. } => {
        writeln!(f, "{pad}ReturnStatement")?;
        expr.write_tree(f, depth + 1)?;
      }
      AstNode::BlockStatement { stmts, .. } => {
        writeln!(f, "{pad}BlockStatement")?;
        for stmt in stmts {
          stmt.write_tree(f, depth + 1)?;
        }
      }
      AstNode::BinaryExpression {
        op, left, right, ..
      } => {
        writeln!(f, "{pad}BinaryOperation[{}]", op.symbol())?;
        writeln!(f, "{pad}  Left")?;
        left.write_tree(f, depth + 2)?;
        writeln!(f, "{pad}  Right")?;
        right.write_tree(f, depth + 2)?;
      }
      AstNode::UnaryExpression { op, operand, .. } => {
        writeln!(f, "{pad}UnaryOperation[{}]", op.symbol())?;
        operand.write_tree(f, depth + 1)?;
      }
      AstNode::CallExpression { callee, args, .. } => {
        writeln!(f, "{pad}FunctionCall[{}]", callee.name)?;
        for arg in args {
          arg.write_tree(f, depth + 1)?;
        }
      }
      AstNode::Identifier(ident) => writeln!(f, "{pad}Identifier[{}]", ident.name)?,
      AstNode::Constant { value, .. } => writeln!(f, "{pad}Constant[{value}]")?,
    }
    Ok(())
  }
}

/// Indented tree dump, two spaces per level.
impl fmt::Display for AstNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.write_tree(f, 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tree_dump_nests_operands() {
    let node = AstNode::ReturnStatement {
      expr: Box::new(AstNode::binary(
        BinaryOp::Add,
        AstNode::constant(1, Span::default()),
        AstNode::unary(
          UnaryOp::BitNot,
          AstNode::ident("x", Span::default()),
          Span::default(),
        ),
        Span::default(),
      )),
      span: Span::default(),
    };

    let expected = "\
ReturnStatement
  BinaryOperation[+]
    Left
      Constant[1]
    Right
      UnaryOperation[~]
        Identifier[x]
";
    assert_eq!(node.to_string(), expected);
  }

  #[test]
  fn kind_names_match_variants() {
    let call = AstNode::call(Identifier::new("f", Span::new(3, 1)), vec![]);
    assert_eq!(call.kind_name(), "CallExpression");
    assert_eq!(call.span(), Span::new(3, 1));
  }
}
