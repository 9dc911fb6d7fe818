// This file is part of the vsh package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::io::{BufRead, IsTerminal};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use vsh::error::ShellError;
use vsh::{pipeline, render};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let code = if std::io::stdin().is_terminal() {
        run_interactive()
    } else {
        run_batch()
    };
    std::process::exit(code);
}

fn run_interactive() -> i32 {
    // Keep the shell alive across Ctrl-C while a pipeline runs; the
    // foreground subprocess still gets the default SIGINT disposition.
    let interrupted = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone());

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("error: failed to initialise line editor: {err}");
            return 1;
        }
    };

    loop {
        match editor.readline("vsh> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line == "exit" {
                    break;
                }
                if let Err(err) = run_line(line, true) {
                    eprintln!("{}", err.report());
                }
                interrupted.store(false, std::sync::atomic::Ordering::Relaxed);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: reading input failed: {err}");
                break;
            }
        }
    }
    0
}

fn run_batch() -> i32 {
    let stdin = std::io::stdin();
    let mut code = 0;
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }
        if let Err(err) = run_line(line, false) {
            eprintln!("{}", err.report());
            code = 1;
        }
    }
    code
}

// Parse, execute and render one pipeline. A trailing print stage has
// already rendered from inside the pipeline.
fn run_line(line: &str, interactive: bool) -> Result<(), ShellError> {
    let stages = pipeline::parse(line)?;
    if stages.is_empty() {
        return Ok(());
    }
    let records = pipeline::run(&stages)?;
    let ends_in_print = stages
        .last()
        .map(|stage| stage.command == "print")
        .unwrap_or(false);
    if ends_in_print {
        return Ok(());
    }
    let rendered = if interactive {
        render::pretty(&records)
    } else {
        render::json_lines(&records)
    };
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}
