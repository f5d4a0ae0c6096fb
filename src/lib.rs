//! Crate root: wires together the compilation pipeline.
//!
//! Source text goes through four stages, each consuming the previous one's
//! output in full:
//! - `parser` builds the AST on top of the pull-based `tokenizer`.
//! - `resolver` annotates the tree with frame offsets, scope ids and call
//!   signatures, and reports undefined names.
//! - `lower` flattens the annotated tree into the stack-machine `ir`.
//! - `codegen` expands each IR instruction into x86-64 NASM assembly.
//!
//! `error` centralises the diagnostics shared by all of them.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod lower;
pub mod parser;
pub mod resolver;
pub mod tokenizer;

use tracing::debug;

pub use error::{CompileError, CompileResult, Span, Stage};

use ast::AstNode;
use ir::{Labels, Program};
use resolver::Resolution;

/// One compilation unit: the source text plus the label counter shared by
/// lowering and emission.
///
/// The stage methods can be driven one at a time to inspect intermediate
/// results; [`Compilation::run`] chains all of them.
#[derive(Debug)]
pub struct Compilation<'src> {
  source: &'src str,
  labels: Labels,
}

impl<'src> Compilation<'src> {
  pub fn new(source: &'src str) -> Self {
    Self {
      source,
      labels: Labels::new(),
    }
  }

  pub fn source(&self) -> &'src str {
    self.source
  }

  pub fn parse(&self) -> CompileResult<AstNode> {
    parser::parse(self.source)
  }

  pub fn resolve(&self, unit: &mut AstNode) -> CompileResult<Resolution> {
    resolver::resolve(unit)
  }

  pub fn lower(&mut self, unit: &AstNode, resolution: &Resolution) -> CompileResult<Program> {
    lower::lower(unit, resolution, &mut self.labels)
  }

  pub fn emit(&mut self, program: &Program) -> CompileResult<String> {
    codegen::emit(program, &mut self.labels)
  }

  /// Run every stage and return the assembly text.
  pub fn run(mut self) -> CompileResult<String> {
    let mut unit = self.parse()?;
    let resolution = self.resolve(&mut unit)?;
    let program = self.lower(&unit, &resolution)?;
    let asm = self.emit(&program)?;
    debug!(labels = self.labels.allocated(), "compilation finished");
    Ok(asm)
  }
}

/// Compile a source string into NASM assembly.
pub fn compile_to_asm(source: &str) -> CompileResult<String> {
  Compilation::new(source).run()
}
