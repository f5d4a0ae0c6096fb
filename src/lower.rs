//! Lowering: turn the resolved AST into the flat stack-machine IR.
//!
//! Each expression is lowered with a `need_value` flag. With the flag set the
//! value ends up on the stack; without it any operator still runs but its
//! result stays in the accumulator, and leaves with no side effects emit
//! nothing at all. `&&` and `||` evaluate both operands.

use tracing::debug;

use crate::ast::AstNode;
use crate::error::{
  CompileResult, MalformedExpressionSnafu, MalformedStatementSnafu, Stage, UnresolvedSnafu,
};
use crate::ir::{Instr, Labels, Operand, Program};
use crate::resolver::{FunctionSignature, Resolution};

/// Lower a resolved translation unit into one instruction sequence.
pub fn lower(unit: &AstNode, resolution: &Resolution, labels: &mut Labels) -> CompileResult<Program> {
  let AstNode::TranslationUnit { functions } = unit else {
    return MalformedStatementSnafu {
      stage: Stage::Lower,
      kind: unit.kind_name(),
      span: unit.span(),
    }
    .fail();
  };

  let mut lowering = Lowering {
    resolution,
    labels,
    program: Program::default(),
  };
  for function in functions {
    lowering.lower_function(function)?;
  }

  debug!(
    instructions = lowering.program.len(),
    labels = lowering.labels.allocated(),
    "lowered translation unit"
  );
  Ok(lowering.program)
}

struct Lowering<'a> {
  resolution: &'a Resolution,
  labels: &'a mut Labels,
  program: Program,
}

impl Lowering<'_> {
  fn lower_function(&mut self, function: &AstNode) -> CompileResult<()> {
    let AstNode::FunctionDefinition {
      name,
      params,
      body,
      scope: Some(scope),
    } = function
    else {
      return self.unresolved_function(function);
    };

    let sig = FunctionSignature {
      name: name.name.clone(),
      arity: params.len(),
    };
    let slots = self.resolution.scopes.get(*scope).slot_count;

    self.program.push(Instr::FuncEnter(sig));
    if slots > 0 {
      self.program.push(Instr::ScopeEnter(slots));
    }
    self.lower_block(body)?;
    if slots > 0 {
      self.program.push(Instr::ScopeExit(slots));
    }
    self.program.push(Instr::FuncLeave);
    Ok(())
  }

  fn unresolved_function(&self, node: &AstNode) -> CompileResult<()> {
    if matches!(node, AstNode::FunctionDefinition { .. }) {
      UnresolvedSnafu {
        kind: node.kind_name(),
        span: node.span(),
      }
      .fail()
    } else {
      MalformedStatementSnafu {
        stage: Stage::Lower,
        kind: node.kind_name(),
        span: node.span(),
      }
      .fail()
    }
  }

  fn lower_block(&mut self, stmts: &[AstNode]) -> CompileResult<()> {
    for stmt in stmts {
      self.lower_stmt(stmt)?;
    }
    Ok(())
  }

  fn lower_stmt(&mut self, stmt: &AstNode) -> CompileResult<()> {
    match stmt {
      AstNode::Declaration { target, init, span } => {
        self.lower_expr(init, true)?;
        let binding = target.binding.clone().ok_or_else(|| {
          UnresolvedSnafu {
            kind: stmt.kind_name(),
            span: *span,
          }
          .build()
        })?;
        self.program.push(Instr::Assign(Operand::Variable(binding)));
      }
      AstNode::ExpressionStatement { expr, .. } => self.lower_expr(expr, false)?,
      AstNode::IfStatement {
        condition,
        then_branch,
        else_branch,
        ..
      } => {
        self.lower_expr(condition, true)?;
        let false_label = self.labels.fresh();
        let end_label = self.labels.fresh();
        self.program.push(Instr::If {
          false_label,
          end_label,
        });
        self.lower_block(then_branch)?;
        self.program.push(Instr::Jump(end_label));
        self.program.push(Instr::Label(false_label));
        self.lower_block(else_branch)?;
        self.program.push(Instr::Label(end_label));
      }
      AstNode::ReturnStatement { expr, .. } => {
        self.lower_expr(expr, true)?;
        self.program.push(Instr::Return);
      }
      AstNode::BlockStatement { stmts, .. } => self.lower_block(stmts)?,
      other => {
        return MalformedStatementSnafu {
          stage: Stage::Lower,
          kind: other.kind_name(),
          span: other.span(),
        }
        .fail();
      }
    }
    Ok(())
  }

  fn lower_expr(&mut self, expr: &AstNode, need_value: bool) -> CompileResult<()> {
    match expr {
      AstNode::BinaryExpression {
        op, left, right, ..
      } => {
        self.lower_expr(left, true)?;
        self.lower_expr(right, true)?;
        self.program.push(Instr::from(*op));
      }
      AstNode::UnaryExpression { op, operand, .. } => {
        self.lower_expr(operand, true)?;
        self.program.push(Instr::from(*op));
      }
      AstNode::CallExpression {
        callee,
        args,
        signature,
      } => {
        let sig = signature.clone().ok_or_else(|| {
          UnresolvedSnafu {
            kind: expr.kind_name(),
            span: callee.span,
          }
          .build()
        })?;
        for arg in args {
          self.lower_expr(arg, true)?;
        }
        self.program.push(Instr::Call(sig));
      }
      AstNode::Identifier(ident) => {
        let binding = ident.binding.clone().ok_or_else(|| {
          UnresolvedSnafu {
            kind: expr.kind_name(),
            span: ident.span,
          }
          .build()
        })?;
        if need_value {
          self.program.push(Instr::Push(Operand::Variable(binding)));
        }
        return Ok(());
      }
      AstNode::Constant { value, .. } => {
        if need_value {
          self.program.push(Instr::Push(Operand::Immediate(*value)));
        }
        return Ok(());
      }
      other => {
        return MalformedExpressionSnafu {
          stage: Stage::Lower,
          kind: other.kind_name(),
          span: other.span(),
        }
        .fail();
      }
    }

    if need_value {
      self.program.push(Instr::Save);
    }
    Ok(())
  }
}
