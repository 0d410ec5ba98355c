use coforth::{
    lang::tokenizing::{has_open_definition, tokenize_source, TokenStream},
    runtime::{
        built_ins::{process_boot_source, register_core_words},
        data_structures::cell::canonical_name,
        debug::ConsoleTracer,
        error::{self, ErrorKind, ForthError},
        interpreter::{
            coforth_interpreter::CoforthInterpreter, CodeManagement, Interpreter, WordManagement,
        },
    },
};
use getopts::Options;
use rustyline::{error::ReadlineError, DefaultEditor};
use std::env;

const WELCOME_TEXT: &str = "\
==========================================
Welcome to the coforth interpreter-compiler
==========================================
";

const HELP_TEXT: &str = "\
----------------------------------------------------------
LOAD  - loads and executes a text file
EXIT, BYE - to leave
WORDS - prints a list of words in the dictionary
HELP  - prints this summary
All operations on the stack in the Reverse Polish Notation
----------------------------------------------------------";

/// Print the command line usage.
fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options] [FILE]", program);
    print!("{}", opts.usage(&brief));
}

/// Report a recoverable error and put the interpreter back into a usable state.
fn report_and_recover(interpreter: &mut CoforthInterpreter, error: &ForthError) {
    eprintln!("\nError: {}", error);
    interpreter.recover_from_error(error);
}

/// Run one batch of tokens, then pump the fiber scheduler.  Recoverable errors are printed and
/// execution continues.
fn run_batch(interpreter: &mut CoforthInterpreter, tokens: TokenStream) {
    if let Err(error) = interpreter.process_tokens(tokens) {
        report_and_recover(interpreter, &error);
    }

    if let Err(error) = interpreter.pump_fibers() {
        report_and_recover(interpreter, &error);
    }
}

/// Prompt for a file path and feed the file through the interpreter under its own source tag.
fn load_file(interpreter: &mut CoforthInterpreter, editor: &mut DefaultEditor) {
    let path = match editor.readline("Enter path to the Forth code file [.txt]: ") {
        Ok(path) => path.trim().to_string(),
        Err(_) => return,
    };

    if path.is_empty() {
        eprintln!("\nWrong file path.");
        return;
    }

    match interpreter.process_source_file(&path) {
        Ok(()) => println!("File processed OK\n"),
        Err(error) => report_and_recover(interpreter, &error),
    }

    if let Err(error) = interpreter.pump_fibers() {
        report_and_recover(interpreter, &error);
    }
}

/// The interactive read-eval-print loop.  A handful of system words are pre-empted before the
/// interpreter ever sees the token batch.
fn repl(interpreter: &mut CoforthInterpreter) -> error::Result<()> {
    let mut editor = DefaultEditor::new().map_err(|error| {
        ForthError::new(
            ErrorKind::Io,
            None,
            format!("Could not open the terminal: {}.", error),
            None,
        )
    })?;

    loop {
        let line = match editor.readline("OK: ") {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(error) => {
                eprintln!("\nInput error: {}", error);
                break;
            }
        };

        // Keep reading while a `:` definition is open, so definitions can span lines.
        let mut source = line;
        let mut tokens = tokenize_source("<repl>", &source);

        while has_open_definition(&tokens) {
            match editor.readline("...  ") {
                Ok(next) => {
                    source.push('\n');
                    source.push_str(&next);
                    tokens = tokenize_source("<repl>", &source);
                }

                Err(_) => break,
            }
        }

        let _ = editor.add_history_entry(source.as_str());

        let first = match tokens.front() {
            Some(token) => canonical_name(token.name()),
            None => continue,
        };

        match first.as_str() {
            "BYE" | "EXIT" => {
                println!("\nBye, bye to you, exiting ...");
                break;
            }

            "WORDS" => {
                println!("{}", interpreter.dictionary());
                continue;
            }

            "HELP" => {
                println!("{}", HELP_TEXT);
                continue;
            }

            "LOAD" => {
                load_file(interpreter, &mut editor);
                continue;
            }

            _ => {}
        }

        run_batch(interpreter, tokens);
    }

    Ok(())
}

fn main() -> error::Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "coforth".to_string());

    let mut opts = Options::new();
    opts.optopt("e", "evaluate", "evaluate EXPR and exit", "EXPR");
    opts.optflag("q", "quiet", "do not print the welcome banner");
    opts.optflag("h", "help", "print this help");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(error) => {
            return ForthError::new_as_result(
                ErrorKind::Syntax,
                None,
                format!("{}", error),
                None,
            )
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return Ok(());
    }

    // Build the interpreter: native word packs first, then the boot definitions written in the
    // language itself, then any user add-ons named by the environment.
    let mut interpreter = CoforthInterpreter::new();

    interpreter.set_tracer(Box::new(ConsoleTracer));
    register_core_words(&mut interpreter);
    process_boot_source(&mut interpreter)?;

    if let Ok(addons) = env::var("COFORTH_ADDONS") {
        if let Err(error) = interpreter.process_source_file(&addons) {
            report_and_recover(&mut interpreter, &error);
        }
    }

    if let Some(expression) = matches.opt_str("e") {
        let tokens = tokenize_source("<eval>", &expression);
        run_batch(&mut interpreter, tokens);
        return Ok(());
    }

    if let Some(file) = matches.free.first() {
        interpreter.process_source_file(file)?;
        interpreter.pump_fibers()?;
        return Ok(());
    }

    if !matches.opt_present("q") {
        print!("{}", WELCOME_TEXT);
    }

    repl(&mut interpreter)
}
