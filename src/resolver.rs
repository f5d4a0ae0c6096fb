//! Semantic analysis: function table, lexical scopes and frame offsets.
//!
//! Resolution runs in two passes. The first registers every function
//! signature so bodies may call functions defined later in the file. The
//! second walks each body, building a tree of scopes and writing the binding
//! or signature each name refers to back into the AST.
//!
//! Parameters live above the saved base pointer and return address, so
//! parameter `i` of `n` sits at `rbp + 8 * (1 + n - i)`. Locals count down
//! from `rbp - 8`. A child scope starts counting where its parent is, and
//! hands its final count back when it closes, so no two locals of one
//! function ever share a slot.

use std::fmt::{self, Write as _};

use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use crate::ast::AstNode;
use crate::error::{
  ArityMismatchSnafu, CompileResult, DuplicateFunctionSnafu, MalformedExpressionSnafu,
  MalformedStatementSnafu, Stage, UndefinedFunctionSnafu, UndefinedVariableSnafu,
};

/// Size of one stack slot in bytes.
pub const SLOT_SIZE: i64 = 8;

/// Functions every program may call without defining them.
pub const INTRINSICS: [(&str, usize); 2] = [("print", 1), ("input", 0)];

/// Symbols the emitted runtime defines or imports; user functions may not
/// take these names.
pub const RUNTIME_SYMBOLS: [&str; 4] = ["printf", "scanf", "pri_int", "scn_int"];

/// Index of a scope in its [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

/// A variable and its signed displacement from the frame base pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
  pub name: String,
  pub offset: i64,
}

impl Binding {
  /// The `rbp±0x..` part of the memory operand addressing this slot.
  pub fn frame_address(&self) -> String {
    let sign = if self.offset < 0 { '-' } else { '+' };
    format!("rbp{sign}{:#x}", self.offset.unsigned_abs())
  }
}

impl fmt::Display for Binding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} [{}]", self.name, self.frame_address())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
  pub name: String,
  pub arity: usize,
}

impl fmt::Display for FunctionSignature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}[{}]", self.name, self.arity)
  }
}

/// Insertion-ordered table of every callable function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionTable {
  entries: Vec<FunctionSignature>,
}

impl FunctionTable {
  pub fn with_intrinsics() -> Self {
    let entries = INTRINSICS
      .iter()
      .map(|&(name, arity)| FunctionSignature {
        name: name.to_string(),
        arity,
      })
      .collect();
    Self { entries }
  }

  pub fn find(&self, name: &str) -> Option<&FunctionSignature> {
    self.entries.iter().find(|sig| sig.name == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &FunctionSignature> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn register(&mut self, sig: FunctionSignature) {
    self.entries.push(sig);
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
  pub parent: Option<ScopeId>,
  pub children: Vec<ScopeId>,
  pub bindings: Vec<Binding>,
  /// Locals allocated so far in this function, counting this scope's
  /// ancestors and any closed descendants.
  pub slot_count: usize,
}

/// Arena holding every scope of a compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeTree {
  scopes: Vec<Scope>,
}

impl ScopeTree {
  pub fn get(&self, id: ScopeId) -> &Scope {
    &self.scopes[id.0]
  }

  pub fn len(&self) -> usize {
    self.scopes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scopes.is_empty()
  }

  /// Walk from `scope` to its root and return the innermost binding of
  /// `name`. Within one scope the latest declaration wins.
  pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
    let mut current = Some(scope);
    while let Some(id) = current {
      let scope = self.get(id);
      if let Some(binding) = scope.bindings.iter().rev().find(|b| b.name == name) {
        return Some(binding);
      }
      current = scope.parent;
    }
    None
  }

  fn new_root(&mut self) -> ScopeId {
    self.push(Scope {
      parent: None,
      children: Vec::new(),
      bindings: Vec::new(),
      slot_count: 0,
    })
  }

  fn new_child(&mut self, parent: ScopeId) -> ScopeId {
    let slot_count = self.get(parent).slot_count;
    let id = self.push(Scope {
      parent: Some(parent),
      children: Vec::new(),
      bindings: Vec::new(),
      slot_count,
    });
    self.scopes[parent.0].children.push(id);
    id
  }

  /// Hand a finished child's slot count back to its parent.
  fn close(&mut self, child: ScopeId) {
    let scope = self.get(child);
    if let Some(parent) = scope.parent {
      let used = scope.slot_count;
      let parent = &mut self.scopes[parent.0];
      parent.slot_count = parent.slot_count.max(used);
    }
  }

  fn bind(&mut self, scope: ScopeId, binding: Binding) {
    self.scopes[scope.0].bindings.push(binding);
  }

  /// Allocate the next local slot in `scope` for `name`.
  fn declare(&mut self, scope: ScopeId, name: &str) -> Binding {
    let entry = &mut self.scopes[scope.0];
    entry.slot_count += 1;
    let slot = i64::try_from(entry.slot_count).unwrap_or(i64::MAX / SLOT_SIZE);
    let binding = Binding {
      name: name.to_string(),
      offset: -SLOT_SIZE * slot,
    };
    entry.bindings.push(binding.clone());
    binding
  }

  fn push(&mut self, scope: Scope) -> ScopeId {
    let id = ScopeId(self.scopes.len());
    self.scopes.push(scope);
    id
  }

  fn write_scope(&self, out: &mut String, id: ScopeId, depth: usize) {
    let pad = "  ".repeat(depth);
    let scope = self.get(id);
    for binding in &scope.bindings {
      let _ = writeln!(out, "{pad}{} at [{}]", binding.name, binding.frame_address());
    }
    for &child in &scope.children {
      let _ = writeln!(out, "{pad}{{");
      self.write_scope(out, child, depth + 1);
      let _ = writeln!(out, "{pad}}}");
    }
  }
}

/// Everything the resolver learned about a translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  pub functions: FunctionTable,
  pub scopes: ScopeTree,
  roots: Vec<(String, ScopeId)>,
}

impl Resolution {
  /// Root scope of a user function.
  pub fn function_scope(&self, name: &str) -> Option<ScopeId> {
    self
      .roots
      .iter()
      .find(|(function, _)| function == name)
      .map(|&(_, id)| id)
  }

  /// Function table followed by each function's scope tree.
  pub fn report(&self) -> String {
    let mut out = String::from("Functions:\n");
    for sig in self.functions.iter() {
      let _ = writeln!(out, "  {sig}");
    }
    out.push_str("Scopes:\n");
    for (name, root) in &self.roots {
      let _ = writeln!(out, "  {name}:");
      self.scopes.write_scope(&mut out, *root, 2);
    }
    out
  }
}

/// Resolve a translation unit in place.
pub fn resolve(unit: &mut AstNode) -> CompileResult<Resolution> {
  let AstNode::TranslationUnit { functions } = unit else {
    return MalformedStatementSnafu {
      stage: Stage::Resolve,
      kind: unit.kind_name(),
      span: unit.span(),
    }
    .fail();
  };

  let mut resolver = Resolver {
    functions: FunctionTable::with_intrinsics(),
    scopes: ScopeTree::default(),
    roots: Vec::new(),
  };

  for function in functions.iter() {
    resolver.register(function)?;
  }
  for function in functions.iter_mut() {
    resolver.resolve_function(function)?;
  }

  debug!(
    functions = resolver.functions.len(),
    scopes = resolver.scopes.len(),
    "resolved translation unit"
  );
  Ok(Resolution {
    functions: resolver.functions,
    scopes: resolver.scopes,
    roots: resolver.roots,
  })
}

struct Resolver {
  functions: FunctionTable,
  scopes: ScopeTree,
  roots: Vec<(String, ScopeId)>,
}

impl Resolver {
  fn register(&mut self, function: &AstNode) -> CompileResult<()> {
    let AstNode::FunctionDefinition { name, params, .. } = function else {
      return MalformedStatementSnafu {
        stage: Stage::Resolve,
        kind: function.kind_name(),
        span: function.span(),
      }
      .fail();
    };

    ensure!(
      self.functions.find(&name.name).is_none()
        && !RUNTIME_SYMBOLS.contains(&name.name.as_str()),
      DuplicateFunctionSnafu {
        name: name.name.clone(),
        span: name.span,
      }
    );
    self.functions.register(FunctionSignature {
      name: name.name.clone(),
      arity: params.len(),
    });
    Ok(())
  }

  fn resolve_function(&mut self, function: &mut AstNode) -> CompileResult<()> {
    let AstNode::FunctionDefinition {
      name,
      params,
      body,
      scope,
    } = function
    else {
      return MalformedStatementSnafu {
        stage: Stage::Resolve,
        kind: function.kind_name(),
        span: function.span(),
      }
      .fail();
    };

    let root = self.scopes.new_root();
    let argc = params.len();
    for (index, param) in params.iter_mut().enumerate() {
      let slot = i64::try_from(1 + argc - index).unwrap_or(i64::MAX / SLOT_SIZE);
      let binding = Binding {
        name: param.name.clone(),
        offset: SLOT_SIZE * slot,
      };
      trace!(function = %name.name, binding = %binding, "parameter");
      param.binding = Some(binding.clone());
      self.scopes.bind(root, binding);
    }

    self.resolve_block(root, body)?;
    *scope = Some(root);
    self.roots.push((name.name.clone(), root));
    Ok(())
  }

  fn resolve_block(&mut self, scope: ScopeId, stmts: &mut [AstNode]) -> CompileResult<()> {
    for stmt in stmts {
      self.resolve_stmt(scope, stmt)?;
    }
    Ok(())
  }

  /// Resolve `stmts` in a fresh child of `parent` and return the child.
  fn resolve_nested(&mut self, parent: ScopeId, stmts: &mut [AstNode]) -> CompileResult<ScopeId> {
    let child = self.scopes.new_child(parent);
    self.resolve_block(child, stmts)?;
    self.scopes.close(child);
    Ok(child)
  }

  fn resolve_stmt(&mut self, scope: ScopeId, stmt: &mut AstNode) -> CompileResult<()> {
    match stmt {
      AstNode::Declaration { target, init, .. } => {
        // The initializer cannot see the name it initializes.
        self.resolve_expr(scope, init)?;
        let binding = self.scopes.declare(scope, &target.name);
        trace!(binding = %binding, "local");
        target.binding = Some(binding);
      }
      AstNode::ExpressionStatement { expr, .. } | AstNode::ReturnStatement { expr, .. } => {
        self.resolve_expr(scope, expr)?;
      }
      AstNode::IfStatement {
        condition,
        then_branch,
        else_branch,
        then_scope,
        else_scope,
        ..
      } => {
        self.resolve_expr(scope, condition)?;
        *then_scope = Some(self.resolve_nested(scope, then_branch)?);
        if !else_branch.is_empty() {
          *else_scope = Some(self.resolve_nested(scope, else_branch)?);
        }
      }
      AstNode::BlockStatement {
        stmts,
        scope: block_scope,
        ..
      } => {
        *block_scope = Some(self.resolve_nested(scope, stmts)?);
      }
      other => {
        return MalformedStatementSnafu {
          stage: Stage::Resolve,
          kind: other.kind_name(),
          span: other.span(),
        }
        .fail();
      }
    }
    Ok(())
  }

  fn resolve_expr(&mut self, scope: ScopeId, expr: &mut AstNode) -> CompileResult<()> {
    match expr {
      AstNode::BinaryExpression { left, right, .. } => {
        self.resolve_expr(scope, left)?;
        self.resolve_expr(scope, right)?;
      }
      AstNode::UnaryExpression { operand, .. } => self.resolve_expr(scope, operand)?,
      AstNode::CallExpression {
        callee,
        args,
        signature,
      } => {
        let sig = self
          .functions
          .find(&callee.name)
          .cloned()
          .context(UndefinedFunctionSnafu {
            name: callee.name.clone(),
            span: callee.span,
          })?;
        ensure!(
          sig.arity == args.len(),
          ArityMismatchSnafu {
            name: callee.name.clone(),
            expected: sig.arity,
            found: args.len(),
            span: callee.span,
          }
        );
        for arg in args.iter_mut() {
          self.resolve_expr(scope, arg)?;
        }
        *signature = Some(sig);
      }
      AstNode::Identifier(ident) => {
        let binding = self
          .scopes
          .lookup(scope, &ident.name)
          .cloned()
          .context(UndefinedVariableSnafu {
            name: ident.name.clone(),
            span: ident.span,
          })?;
        ident.binding = Some(binding);
      }
      AstNode::Constant { .. } => {}
      other => {
        return MalformedExpressionSnafu {
          stage: Stage::Resolve,
          kind: other.kind_name(),
          span: other.span(),
        }
        .fail();
      }
    }
    Ok(())
  }
}
