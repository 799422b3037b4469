use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, Write},
    process,
};

use vm::{Session, SessionConfig};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "Source files to execute")]
    files: Vec<String>,

    /// Start REPL after executing files (default if no files)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,

    /// Print bytecode and constants instead of executing
    #[arg(long, help = "Dump bytecode + constant pool for inputs")]
    dump_bytecode: bool,

    #[arg(long, help = "Start every statement from an empty session")]
    fresh: bool,

    #[arg(long, help = "Roll globals back when a statement fails")]
    atomic: bool,

    #[arg(long, value_name = "N", help = "Abort a run after N instructions")]
    max_instructions: Option<u64>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut session = Session::new(SessionConfig {
        persistent: !cli.fresh,
        atomic: cli.atomic,
        instruction_budget: cli.max_instructions,
    });

    for filename in &cli.files {
        let source_code = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", filename, err);
                process::exit(1);
            }
        };

        if cli.dump_bytecode {
            match session.compile_source(&source_code) {
                Ok(bytecode) => {
                    println!("== {} ==", filename);
                    print!("{bytecode}");
                }
                Err(err) => {
                    eprintln!("Error compiling {}: {}", filename, err);
                    process::exit(1);
                }
            }
        } else if let Err(err) = session.eval_source(&source_code) {
            eprintln!("Error executing {}: {}", filename, err);
            process::exit(1);
        }
    }

    if cli.dump_bytecode {
        return;
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut session);
    }
}

fn run_repl(session: &mut Session) {
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!(">> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                match session.eval_line(input) {
                    Ok(Some(value)) => println!("{value}"),
                    Ok(None) => {}
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}

