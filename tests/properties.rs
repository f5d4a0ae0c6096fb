//! Property tests over generated programs: frame offsets never collide within
//! a function and assembly labels are each defined exactly once.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rminic::Compilation;
use rminic::resolver::{Resolution, ScopeId};

/// Statement sequences with nested blocks and branches, each declaring locals.
fn statements() -> impl Strategy<Value = String> {
  let leaf = (0usize..4).prop_map(|n| {
    (0..n)
      .map(|i| format!("let v{i} = {i};"))
      .collect::<String>()
  });
  leaf.prop_recursive(4, 48, 4, |inner| {
    prop::collection::vec(
      prop_oneof![
        inner.clone().prop_map(|body| format!("{{ {body} }}")),
        (condition(), inner.clone()).prop_map(|(cond, body)| format!("if {cond} {{ {body} }}")),
        (condition(), inner.clone(), inner)
          .prop_map(|(cond, a, b)| format!("if {cond} {{ {a} }} else {{ {b} }}")),
        Just("let w = 1;".to_string()),
        Just("print(1);".to_string()),
      ],
      0..4,
    )
    .prop_map(|parts| parts.concat())
  })
}

fn condition() -> impl Strategy<Value = String> {
  prop_oneof![
    Just("1".to_string()),
    Just("1 < 2".to_string()),
    Just("input() == 3 || 0".to_string()),
    Just("1 >= 0 && 2 != 3".to_string()),
  ]
}

fn program() -> impl Strategy<Value = (usize, String)> {
  (0usize..4, statements()).prop_map(|(params, body)| {
    let list = (0..params)
      .map(|i| format!("p{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    (params, format!("fn main({list}) {{ {body} }}"))
  })
}

fn collect_offsets(resolution: &Resolution, scope: ScopeId, out: &mut Vec<i64>) {
  let scope = resolution.scopes.get(scope);
  out.extend(scope.bindings.iter().map(|binding| binding.offset));
  for &child in &scope.children {
    collect_offsets(resolution, child, out);
  }
}

proptest! {
  #[test]
  fn frame_offsets_are_distinct((params, source) in program()) {
    let mut compilation = Compilation::new(&source);
    let mut unit = compilation.parse().unwrap();
    let resolution = compilation.resolve(&mut unit).unwrap();
    let root = resolution.function_scope("main").unwrap();

    let mut offsets = Vec::new();
    collect_offsets(&resolution, root, &mut offsets);
    let unique: HashSet<i64> = offsets.iter().copied().collect();
    prop_assert_eq!(unique.len(), offsets.len());

    let positive = offsets.iter().filter(|&&offset| offset > 0).count();
    prop_assert_eq!(positive, params);
    let locals = offsets.len() - params;
    prop_assert_eq!(resolution.scopes.get(root).slot_count, locals);
    prop_assert!(offsets.iter().all(|&offset| offset != 0));
  }

  #[test]
  fn labels_are_defined_once_and_every_jump_lands((_, source) in program()) {
    let asm = rminic::compile_to_asm(&source).unwrap();

    let mut defined: HashMap<&str, usize> = HashMap::new();
    for line in asm.lines().filter(|line| line.starts_with(".L")) {
      *defined.entry(line.trim_end_matches(':')).or_default() += 1;
    }
    prop_assert!(defined.values().all(|&n| n == 1));

    for line in asm.lines().map(str::trim).filter(|line| line.starts_with('j')) {
      let target = line.split_whitespace().nth(1).unwrap_or_default();
      if target.starts_with(".L") {
        prop_assert!(defined.contains_key(target), "dangling jump to {}", target);
      }
    }
  }
}
