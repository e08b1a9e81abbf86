use std::env;
use std::io;
use std::process::ExitCode;

use vtt_slot_cli::{parse_args, run, usage_text};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    match parse_args(&args)? {
        Some(kind) => run(kind, &mut io::stdout()),
        None => {
            println!("{}", usage_text());
            Ok(())
        }
    }
}
