//! Linear stack-machine IR shared by the lowering pass and the backend.
//!
//! Operands travel on the machine stack. Operators pop their inputs and
//! leave the result in the accumulator; `Save` pushes the accumulator back
//! when a later instruction needs the value.

use std::fmt;

use crate::ast::{BinaryOp, UnaryOp};
use crate::resolver::{Binding, FunctionSignature};

/// Jump target id, unique within one compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub usize);

impl fmt::Display for LabelId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Label counter for one compilation unit.
///
/// The lowering pass draws control-flow labels from it and the backend
/// keeps drawing from the same counter for boolean materialization.
#[derive(Debug, Default)]
pub struct Labels {
  next: usize,
}

impl Labels {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fresh(&mut self) -> LabelId {
    let id = LabelId(self.next);
    self.next += 1;
    id
  }

  /// Number of labels handed out so far.
  pub fn allocated(&self) -> usize {
    self.next
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
  Variable(Binding),
  Immediate(i64),
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Variable(binding) => write!(f, "{binding}"),
      Operand::Immediate(value) => write!(f, "{value}"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
  Nop,
  Push(Operand),
  Pop(Operand),
  /// Pop the top of stack into a variable slot.
  Assign(Operand),
  /// Push the accumulator.
  Save,
  /// Reserve this many local slots below the base pointer.
  ScopeEnter(usize),
  ScopeExit(usize),

  Add,
  Sub,
  Mul,
  Div,
  Mod,
  BitOr,
  BitAnd,
  BitXor,

  BitNot,
  LogicalNot,

  Call(FunctionSignature),
  FuncEnter(FunctionSignature),
  FuncLeave,

  LogicalOr,
  LogicalAnd,
  Lt,
  Gt,
  Le,
  Ge,
  Eq,
  Ne,

  /// Pop and jump to `false_label` when zero.
  If {
    false_label: LabelId,
    end_label: LabelId,
  },
  Label(LabelId),
  Jump(LabelId),
  Return,
}

impl Instr {
  pub fn mnemonic(&self) -> &'static str {
    match self {
      Instr::Nop => "NOP",
      Instr::Push(_) => "PUSH",
      Instr::Pop(_) => "POP",
      Instr::Assign(_) => "ASSIGN",
      Instr::Save => "SAVE",
      Instr::ScopeEnter(_) => "SCOPEBEGIN",
      Instr::ScopeExit(_) => "SCOPEEND",
      Instr::Add => "ADD",
      Instr::Sub => "SUB",
      Instr::Mul => "MUL",
      Instr::Div => "DIV",
      Instr::Mod => "MOD",
      Instr::BitOr => "BITOR",
      Instr::BitAnd => "BITAND",
      Instr::BitXor => "BITXOR",
      Instr::BitNot => "BITNOT",
      Instr::LogicalNot => "LNOT",
      Instr::Call(_) => "CALL",
      Instr::FuncEnter(_) => "FUNC",
      Instr::FuncLeave => "LEAVE",
      Instr::LogicalOr => "LOR",
      Instr::LogicalAnd => "LAND",
      Instr::Lt => "LT",
      Instr::Gt => "GT",
      Instr::Le => "LEQ",
      Instr::Ge => "GEQ",
      Instr::Eq => "EQ",
      Instr::Ne => "NEQ",
      Instr::If { .. } => "IF",
      Instr::Label(_) => "LABEL",
      Instr::Jump(_) => "JMP",
      Instr::Return => "RET",
    }
  }
}

impl From<BinaryOp> for Instr {
  fn from(op: BinaryOp) -> Self {
    match op {
      BinaryOp::LogicalOr => Instr::LogicalOr,
      BinaryOp::LogicalAnd => Instr::LogicalAnd,
      BinaryOp::BitOr => Instr::BitOr,
      BinaryOp::BitXor => Instr::BitXor,
      BinaryOp::BitAnd => Instr::BitAnd,
      BinaryOp::Eq => Instr::Eq,
      BinaryOp::Ne => Instr::Ne,
      BinaryOp::Lt => Instr::Lt,
      BinaryOp::Gt => Instr::Gt,
      BinaryOp::Le => Instr::Le,
      BinaryOp::Ge => Instr::Ge,
      BinaryOp::Add => Instr::Add,
      BinaryOp::Sub => Instr::Sub,
      BinaryOp::Mul => Instr::Mul,
      BinaryOp::Div => Instr::Div,
      BinaryOp::Mod => Instr::Mod,
    }
  }
}

impl From<UnaryOp> for Instr {
  fn from(op: UnaryOp) -> Self {
    match op {
      UnaryOp::LogicalNot => Instr::LogicalNot,
      UnaryOp::BitNot => Instr::BitNot,
    }
  }
}

impl fmt::Display for Instr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mnemonic = self.mnemonic();
    match self {
      Instr::Push(operand) | Instr::Pop(operand) | Instr::Assign(operand) => {
        write!(f, "{mnemonic} {operand}")
      }
      Instr::ScopeEnter(slots) | Instr::ScopeExit(slots) => write!(f, "{mnemonic} {slots}"),
      Instr::Call(sig) | Instr::FuncEnter(sig) => write!(f, "{mnemonic} {sig}"),
      Instr::If {
        false_label,
        end_label,
      } => write!(f, "{mnemonic} false:{false_label} end:{end_label}"),
      Instr::Label(id) | Instr::Jump(id) => write!(f, "{mnemonic} {id}"),
      _ => f.write_str(mnemonic),
    }
  }
}

/// The flat instruction sequence of a compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub instrs: Vec<Instr>,
}

impl Program {
  pub fn push(&mut self, instr: Instr) {
    self.instrs.push(instr);
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Instr> {
    self.instrs.iter()
  }

  pub fn len(&self) -> usize {
    self.instrs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instrs.is_empty()
  }
}

impl FromIterator<Instr> for Program {
  fn from_iter<I: IntoIterator<Item = Instr>>(iter: I) -> Self {
    Self {
      instrs: iter.into_iter().collect(),
    }
  }
}

/// One instruction per line.
impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for instr in &self.instrs {
      writeln!(f, "{instr}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_are_handed_out_in_order() {
    let mut labels = Labels::new();
    assert_eq!(labels.fresh(), LabelId(0));
    assert_eq!(labels.fresh(), LabelId(1));
    assert_eq!(labels.allocated(), 2);
  }

  #[test]
  fn listing_shows_operands() {
    let sig = FunctionSignature {
      name: "add".to_string(),
      arity: 2,
    };
    let program: Program = [
      Instr::FuncEnter(sig.clone()),
      Instr::Push(Operand::Variable(Binding {
        name: "x".to_string(),
        offset: -8,
      })),
      Instr::Push(Operand::Immediate(42)),
      Instr::Call(sig),
      Instr::Save,
      Instr::If {
        false_label: LabelId(0),
        end_label: LabelId(1),
      },
      Instr::Jump(LabelId(1)),
      Instr::Label(LabelId(0)),
      Instr::ScopeEnter(3),
      Instr::Le,
    ]
    .into_iter()
    .collect();

    let expected = "\
FUNC add[2]
PUSH x [rbp-0x8]
PUSH 42
CALL add[2]
SAVE
IF false:0 end:1
JMP 1
LABEL 0
SCOPEBEGIN 3
LEQ
";
    assert_eq!(program.to_string(), expected);
  }

  #[test]
  fn every_binary_operator_has_an_instruction() {
    assert_eq!(Instr::from(BinaryOp::Mod), Instr::Mod);
    assert_eq!(Instr::from(BinaryOp::LogicalAnd), Instr::LogicalAnd);
    assert_eq!(Instr::from(UnaryOp::LogicalNot), Instr::LogicalNot);
  }
}
