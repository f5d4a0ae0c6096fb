use rminic::ast::AstNode;
use rminic::ir::Instr;
use rminic::{CompileError, Compilation, Stage, compile_to_asm};

fn ir_listing(source: &str) -> String {
  let mut compilation = Compilation::new(source);
  let mut unit = compilation.parse().expect("source should parse");
  let resolution = compilation.resolve(&mut unit).expect("source should resolve");
  compilation
    .lower(&unit, &resolution)
    .expect("source should lower")
    .to_string()
}

fn count(haystack: &str, needle: &str) -> usize {
  haystack.lines().filter(|line| line.trim() == needle).count()
}

#[test]
fn forward_references_resolve() {
  let asm = compile_to_asm("fn a() { return b(); } fn b() { return 1; }").unwrap();
  assert!(asm.contains("$a:\n"));
  assert!(asm.contains("  call $b\n"));
  assert!(asm.contains("$b:\n"));
}

#[test]
fn self_reference_resolves() {
  let source = "fn fact(n) { if n < 2 { return 1; } return n * fact(n - 1); }";
  assert!(compile_to_asm(source).unwrap().contains("  call $fact\n  add rsp, 0x8\n"));
}

#[test]
fn undefined_variable_stops_before_lowering() {
  let compilation = Compilation::new("fn f() { return x; }");
  let mut unit = compilation.parse().unwrap();
  let err = compilation.resolve(&mut unit).unwrap_err();
  assert!(matches!(err, CompileError::UndefinedVariable { ref name, .. } if name == "x"));
  assert_eq!(err.stage(), Stage::Resolve);

  let err = compile_to_asm("fn f() { return x; }").unwrap_err();
  assert_eq!(
    err.render("fn f() { return x; }"),
    "1:17: resolve error\nfn f() { return x; }\n                ^ undefined reference to variable 'x'"
  );
}

#[test]
fn declaration_cannot_see_itself() {
  let err = compile_to_asm("fn f() { let x = x; }").unwrap_err();
  assert!(matches!(err, CompileError::UndefinedVariable { .. }));
}

#[test]
fn inner_declarations_end_with_their_block() {
  assert!(compile_to_asm("fn f() { { let y = 1; } return y; }").is_err());
  let listing = ir_listing("fn f() { let x = 1; { let x = 2; print(x); } return x; }");
  assert!(listing.contains("PUSH x [rbp-0x10]\nCALL print[1]"));
  assert!(listing.contains("PUSH x [rbp-0x8]\nRET"));
}

#[test]
fn if_else_labels_are_defined_and_targeted_once() {
  let asm = compile_to_asm("fn f() { if 1 { return 1; } else { return 2; } }").unwrap();
  for label in [".L0", ".L1"] {
    assert_eq!(count(&asm, &format!("{label}:")), 1, "{label} definition");
    let jumps = asm
      .lines()
      .filter(|line| line.trim_start().starts_with('j') && line.ends_with(label))
      .count();
    assert_eq!(jumps, 1, "{label} jump");
  }
}

#[test]
fn both_sides_of_logical_or_are_evaluated() {
  let listing = ir_listing("fn f() { return input() || input(); }");
  assert_eq!(count(&listing, "CALL input[0]"), 2);
  let listing = ir_listing("fn f() { return 0 && input(); }");
  assert_eq!(count(&listing, "CALL input[0]"), 1);
}

#[test]
fn precedence_shapes_the_tree() {
  let unit = Compilation::new("fn f() { return 1 + 2 * 3; }").parse().unwrap();
  let AstNode::TranslationUnit { functions } = &unit else {
    panic!("expected a translation unit");
  };
  let AstNode::FunctionDefinition { body, .. } = &functions[0] else {
    panic!("expected a function");
  };
  let AstNode::ReturnStatement { expr, .. } = &body[0] else {
    panic!("expected a return");
  };
  assert!(matches!(
    expr.as_ref(),
    AstNode::BinaryExpression { right, .. } if matches!(right.as_ref(), AstNode::BinaryExpression { .. })
  ));
}

#[test]
fn arity_is_checked_at_call_sites() {
  let err = compile_to_asm("fn g(a, b) { return a; } fn f() { return g(1); }").unwrap_err();
  assert!(matches!(
    err,
    CompileError::ArityMismatch {
      expected: 2,
      found: 1,
      ..
    }
  ));
  assert!(matches!(
    compile_to_asm("fn f() { print(); }").unwrap_err(),
    CompileError::ArityMismatch { .. }
  ));
}

#[test]
fn stage_methods_share_one_label_counter() {
  let source = "fn main() { if 1 < 2 { print(1); } }";
  let mut compilation = Compilation::new(source);
  let mut unit = compilation.parse().unwrap();
  let resolution = compilation.resolve(&mut unit).unwrap();
  let program = compilation.lower(&unit, &resolution).unwrap();
  assert!(program.iter().any(|instr| matches!(instr, Instr::Lt)));
  let asm = compilation.emit(&program).unwrap();
  assert_eq!(count(&asm, ".L0:"), 1);
  assert_eq!(count(&asm, ".L1:"), 1);
  // the comparison is emitted after lowering drew 0 and 1
  assert!(asm.contains("  jl .L2\n"));
  assert_eq!(count(&asm, ".L2:"), 1);
}

#[test]
fn syntax_errors_name_both_tokens() {
  let err = compile_to_asm("fn f() { let = 1; }").unwrap_err();
  assert_eq!(err.stage(), Stage::Parse);
  assert_eq!(err.to_string(), "expected identifier, but got '='");
}

#[test]
fn deep_nesting_is_a_diagnostic() {
  let source = format!("fn main() {{ return {}1{}; }}", "(".repeat(500), ")".repeat(500));
  let err = compile_to_asm(&source).unwrap_err();
  assert_eq!(err.stage(), Stage::Parse);
  assert!(err.to_string().starts_with("nesting exceeds"));
}

#[test]
fn functions_may_share_names_with_registers() {
  let asm = compile_to_asm("fn rax() { return 1; } fn main() { print(rax()); }").unwrap();
  assert!(asm.contains("$rax:\n"));
  assert!(asm.contains("  call $rax\n"));
  assert!(matches!(
    compile_to_asm("fn printf() { return 0; }").unwrap_err(),
    CompileError::DuplicateFunction { .. }
  ));
}
