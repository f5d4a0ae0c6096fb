use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use rminic::{CompileError, Compilation};
use snafu::{ResultExt, Snafu};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: rminic [--stage ast|scopes|ir|asm] [-o FILE] <source|->";

/// Source path that means standard input.
const STDIN_PATH: &str = "-";

#[derive(Debug, Snafu)]
enum CliError {
  #[snafu(display("{message}\n{USAGE}"))]
  Usage { message: String },

  #[snafu(display("cannot read '{}': {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("cannot write '{}': {source}", path.display()))]
  WriteOutput { path: PathBuf, source: io::Error },

  #[snafu(display("cannot read standard input: {source}"))]
  Stdin { source: io::Error },

  #[snafu(display("cannot write to stdout: {source}"))]
  Stdout { source: io::Error },
}

/// Last pipeline stage to run; its result is what gets written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStage {
  Ast,
  Scopes,
  Ir,
  Asm,
}

impl OutputStage {
  fn parse(name: &str) -> Option<Self> {
    match name {
      "ast" => Some(Self::Ast),
      "scopes" => Some(Self::Scopes),
      "ir" => Some(Self::Ir),
      "asm" => Some(Self::Asm),
      _ => None,
    }
  }
}

#[derive(Debug)]
struct Options {
  stage: OutputStage,
  output: Option<PathBuf>,
  input: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, CliError> {
  let mut stage = OutputStage::Asm;
  let mut output = None;
  let mut input = None;

  while let Some(arg) = args.next() {
    match arg.as_str() {
      "--stage" => {
        let name = args.next().ok_or_else(|| {
          UsageSnafu {
            message: "--stage needs a value",
          }
          .build()
        })?;
        stage = OutputStage::parse(&name).ok_or_else(|| {
          UsageSnafu {
            message: format!("unknown stage '{name}'"),
          }
          .build()
        })?;
      }
      "-o" => {
        let path = args.next().ok_or_else(|| {
          UsageSnafu {
            message: "-o needs a file name",
          }
          .build()
        })?;
        output = Some(PathBuf::from(path));
      }
      flag if flag.starts_with('-') && flag != STDIN_PATH => {
        return UsageSnafu {
          message: format!("unknown option '{flag}'"),
        }
        .fail();
      }
      _ if input.is_some() => {
        return UsageSnafu {
          message: "only one source file may be given",
        }
        .fail();
      }
      _ => input = Some(PathBuf::from(arg)),
    }
  }

  let input = input.ok_or_else(|| {
    UsageSnafu {
      message: "no source file given",
    }
    .build()
  })?;
  Ok(Options {
    stage,
    output,
    input,
  })
}

fn run_stages(source: &str, stage: OutputStage) -> Result<String, CompileError> {
  let mut compilation = Compilation::new(source);
  let mut unit = compilation.parse()?;
  if stage == OutputStage::Ast {
    return Ok(unit.to_string());
  }
  let resolution = compilation.resolve(&mut unit)?;
  if stage == OutputStage::Scopes {
    return Ok(resolution.report());
  }
  let program = compilation.lower(&unit, &resolution)?;
  if stage == OutputStage::Ir {
    return Ok(program.to_string());
  }
  compilation.emit(&program)
}

fn read_source(path: &Path) -> Result<String, CliError> {
  if path == Path::new(STDIN_PATH) {
    io::read_to_string(io::stdin().lock()).context(StdinSnafu)
  } else {
    fs::read_to_string(path).context(ReadSourceSnafu { path })
  }
}

fn write_result(text: &str, output: Option<&PathBuf>) -> Result<(), CliError> {
  match output {
    Some(path) => fs::write(path, text).context(WriteOutputSnafu { path: path.clone() }),
    None => {
      let mut stdout = io::stdout().lock();
      stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .context(StdoutSnafu)
    }
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let options = match parse_args(env::args().skip(1)) {
    Ok(options) => options,
    Err(err) => {
      eprintln!("{err}");
      process::exit(2);
    }
  };

  let source = match read_source(&options.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  let text = match run_stages(&source, options.stage) {
    Ok(text) => text,
    Err(err) => {
      eprintln!("{}: {}", options.input.display(), err.render(&source));
      process::exit(1);
    }
  };

  if let Err(err) = write_result(&text, options.output.as_ref()) {
    eprintln!("{err}");
    process::exit(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn args(list: &[&str]) -> impl Iterator<Item = String> {
    list
      .iter()
      .map(|s| s.to_string())
      .collect::<Vec<_>>()
      .into_iter()
  }

  #[test]
  fn defaults_to_assembly_on_stdout() {
    let options = parse_args(args(&["prog.mc"])).unwrap();
    assert_eq!(options.stage, OutputStage::Asm);
    assert_eq!(options.output, None);
    assert_eq!(options.input, PathBuf::from("prog.mc"));
  }

  #[test]
  fn stage_and_output_flags() {
    let options = parse_args(args(&["--stage", "ir", "-o", "out.txt", "prog.mc"])).unwrap();
    assert_eq!(options.stage, OutputStage::Ir);
    assert_eq!(options.output, Some(PathBuf::from("out.txt")));
  }

  #[test]
  fn dash_names_standard_input() {
    let options = parse_args(args(&["--stage", "ast", "-"])).unwrap();
    assert_eq!(options.input, PathBuf::from(STDIN_PATH));
  }

  #[test]
  fn missing_file_reports_its_path() {
    let err = read_source(Path::new("no/such/dir/prog.mc")).unwrap_err();
    assert!(matches!(err, CliError::ReadSource { ref path, .. } if path == Path::new("no/such/dir/prog.mc")));
  }

  #[test]
  fn bad_usage_is_reported() {
    assert!(matches!(
      parse_args(args(&["--stage", "tokens", "a.mc"])),
      Err(CliError::Usage { .. })
    ));
    assert!(matches!(parse_args(args(&[])), Err(CliError::Usage { .. })));
    assert!(matches!(
      parse_args(args(&["a.mc", "b.mc"])),
      Err(CliError::Usage { .. })
    ));
    assert!(matches!(parse_args(args(&["--verbose", "a.mc"])), Err(CliError::Usage { .. })));
  }

  #[test]
  fn stages_stop_where_asked() {
    let source = "fn main() { let x = 1; return x; }";
    let ast = run_stages(source, OutputStage::Ast).unwrap();
    assert!(ast.starts_with("TranslationUnit"));
    let scopes = run_stages(source, OutputStage::Scopes).unwrap();
    assert!(scopes.contains("x at [rbp-0x8]"));
    let ir = run_stages(source, OutputStage::Ir).unwrap();
    assert!(ir.starts_with("FUNC main[0]\n"));
    let asm = run_stages(source, OutputStage::Asm).unwrap();
    assert!(asm.starts_with("bits 64\n"));
  }
}
