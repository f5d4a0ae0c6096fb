//! Code generation: lower the IR listing into x86-64 NASM assembly.
//!
//! The backend is a plain stack machine. `rax` is the accumulator, `rbx` the
//! second operand, and variables are addressed relative to `rbp`. Each IR
//! instruction expands to a fixed block; the only state carried between
//! blocks is the label counter used to turn comparisons into 0/1 values.
//!
//! Function symbols are written as `$name` so a function may be called
//! `rax` or `push` without NASM reading it as a register or mnemonic.

use tracing::{debug, warn};

use crate::error::{CompileResult, UnsupportedInstructionSnafu};
use crate::ir::{Instr, Labels, Operand, Program};

/// Runtime prologue: the `print` and `input` intrinsics.
pub const PREAMBLE: &str = "\
bits 64
extern printf
extern scanf
global main
section .text
print:
  push rbp
  mov rbp, rsp
  and rsp, ~0xf
  mov rdi, pri_int
  mov rsi, [rbp+0x10]
  xor al, al
  call printf
  xor eax, eax
  leave
  ret
input:
  push rbp
  mov rbp, rsp
  sub rsp, 0x8
  and rsp, ~0xf
  mov rdi, scn_int
  lea rsi, [rbp-0x8]
  call scanf
  mov rax, [rbp-0x8]
  leave
  ret
";

/// Format strings used by the intrinsics.
pub const DATA_SECTION: &str = "\
section .rodata
pri_int: db \"%lld\",0xa,0
scn_int: db \"%lld\",0
";

const BINOP_PRE: &str = "  pop rbx\n  pop rax\n";
const CMP_PRE: &str = "  pop rbx\n  pop rax\n  cmp rax, rbx\n";

/// Emit a complete assembly file for `program`.
///
/// On error nothing is returned; there is no partially written output.
pub fn emit(program: &Program, labels: &mut Labels) -> CompileResult<String> {
  let mut asm = String::from(PREAMBLE);
  let mut has_main = false;

  for instr in program.iter() {
    if let Instr::FuncEnter(sig) = instr
      && sig.name == "main"
    {
      has_main = true;
    }
    emit_instr(instr, labels, &mut asm)?;
  }

  asm.push_str(DATA_SECTION);

  if !has_main {
    warn!("no `main` function; the output will not link into an executable");
  }
  debug!(
    instructions = program.len(),
    bytes = asm.len(),
    "emitted assembly"
  );
  Ok(asm)
}

fn emit_instr(instr: &Instr, labels: &mut Labels, asm: &mut String) -> CompileResult<()> {
  match instr {
    Instr::Nop => {}
    Instr::Push(Operand::Immediate(value)) => {
      if i32::try_from(*value).is_ok() {
        asm.push_str(&format!("  push {value}\n"));
      } else {
        asm.push_str(&format!("  mov rcx, {value}\n"));
        asm.push_str("  push rcx\n");
      }
    }
    Instr::Push(Operand::Variable(binding)) => {
      asm.push_str(&format!("  push qword [{}]\n", binding.frame_address()));
    }
    Instr::Pop(Operand::Variable(binding)) => {
      asm.push_str(&format!("  pop qword [{}]\n", binding.frame_address()));
    }
    Instr::Assign(Operand::Variable(binding)) => {
      asm.push_str("  pop rax\n");
      asm.push_str(&format!("  mov qword [{}], rax\n", binding.frame_address()));
    }
    Instr::Pop(Operand::Immediate(_)) | Instr::Assign(Operand::Immediate(_)) => {
      return UnsupportedInstructionSnafu {
        instruction: instr.to_string(),
      }
      .fail();
    }
    Instr::Save => asm.push_str("  push rax\n"),
    Instr::ScopeEnter(slots) => asm.push_str(&format!("  sub rsp, {}\n", 8 * slots)),
    Instr::ScopeExit(slots) => asm.push_str(&format!("  add rsp, {}\n", 8 * slots)),

    Instr::Add => binop(asm, "  add rax, rbx\n"),
    Instr::Sub => binop(asm, "  sub rax, rbx\n"),
    Instr::Mul => binop(asm, "  imul rax, rbx\n"),
    Instr::Div => binop(asm, "  cqo\n  idiv rbx\n"),
    Instr::Mod => binop(asm, "  cqo\n  idiv rbx\n  mov rax, rdx\n"),
    Instr::BitOr => binop(asm, "  or rax, rbx\n"),
    Instr::BitAnd => binop(asm, "  and rax, rbx\n"),
    Instr::BitXor => binop(asm, "  xor rax, rbx\n"),

    Instr::BitNot => asm.push_str("  pop rax\n  not rax\n"),
    Instr::LogicalNot => {
      asm.push_str("  pop rax\n");
      asm.push_str("  test rax, rax\n");
      asm.push_str("  sete al\n");
      asm.push_str("  movzx rax, al\n");
    }

    Instr::Call(sig) => {
      asm.push_str(&format!("  call ${}\n", sig.name));
      if sig.arity > 0 {
        asm.push_str(&format!("  add rsp, {:#x}\n", 8 * sig.arity));
      }
    }
    Instr::FuncEnter(sig) => {
      asm.push_str(&format!("${}:\n", sig.name));
      asm.push_str("  push rbp\n");
      asm.push_str("  mov rbp, rsp\n");
    }
    Instr::FuncLeave => {
      // falling off the end returns 0
      asm.push_str("  xor eax, eax\n");
      asm.push_str(".ret:\n");
      asm.push_str("  leave\n");
      asm.push_str("  ret\n");
    }

    Instr::LogicalOr => {
      let done = labels.fresh();
      asm.push_str(BINOP_PRE);
      asm.push_str("  or rax, rbx\n");
      asm.push_str("  mov eax, 1\n");
      asm.push_str(&format!("  jnz .L{done}\n"));
      asm.push_str("  xor eax, eax\n");
      asm.push_str(&format!(".L{done}:\n"));
    }
    Instr::LogicalAnd => {
      let done = labels.fresh();
      asm.push_str(BINOP_PRE);
      asm.push_str("  xor ecx, ecx\n");
      asm.push_str("  test rax, rax\n");
      asm.push_str(&format!("  jz .L{done}\n"));
      asm.push_str("  test rbx, rbx\n");
      asm.push_str(&format!("  jz .L{done}\n"));
      asm.push_str("  mov ecx, 1\n");
      asm.push_str(&format!(".L{done}:\n"));
      asm.push_str("  mov rax, rcx\n");
    }
    Instr::Lt => compare(asm, labels, "jl"),
    Instr::Gt => compare(asm, labels, "jg"),
    Instr::Le => compare(asm, labels, "jle"),
    Instr::Ge => compare(asm, labels, "jge"),
    Instr::Eq => compare(asm, labels, "je"),
    Instr::Ne => compare(asm, labels, "jne"),

    Instr::If { false_label, .. } => {
      asm.push_str("  pop rax\n");
      asm.push_str("  test rax, rax\n");
      asm.push_str(&format!("  jz .L{false_label}\n"));
    }
    Instr::Label(id) => asm.push_str(&format!(".L{id}:\n")),
    Instr::Jump(id) => asm.push_str(&format!("  jmp .L{id}\n")),
    Instr::Return => asm.push_str("  pop rax\n  jmp .ret\n"),
  }
  Ok(())
}

fn binop(asm: &mut String, body: &str) {
  asm.push_str(BINOP_PRE);
  asm.push_str(body);
}

/// `cmp` the two operands and leave 1 in `rax` when `jump` is taken, else 0.
fn compare(asm: &mut String, labels: &mut Labels, jump: &str) {
  let done = labels.fresh();
  asm.push_str(CMP_PRE);
  asm.push_str("  mov eax, 1\n");
  asm.push_str(&format!("  {jump} .L{done}\n"));
  asm.push_str("  xor eax, eax\n");
  asm.push_str(&format!(".L{done}:\n"));
}
