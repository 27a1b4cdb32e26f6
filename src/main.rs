use getopts::Options;
use lispjit::{
    cli::{run, Action::*},
    core::Config,
};
use std::{
    env, fs,
    io::{self, Read},
    process::exit,
};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let bin = args.first().cloned().unwrap_or_else(|| String::from("lispjit"));

    let mut opts = Options::new();
    opts.optflag("p", "", "Print parse tree");
    opts.optopt("e", "", "Evaluate an expression", "EXPR");
    opts.optflag("i", "", "Start an interactive console after the program");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            exit(2)
        }
    };

    if matches.opt_present("h") {
        print!("{}", opts.usage(&format!("Usage: {} [options] [FILE]", bin)));
        return;
    }

    let parse = matches.opt_present("p");
    let interactive = matches.opt_present("i");

    // Program comes from -e, a file, or stdin unless the console reads it
    let program = if let Some(expr) = matches.opt_str("e") {
        Ok(expr)
    } else if let Some(path) = matches.free.first() {
        fs::read_to_string(path)
    } else if interactive {
        Ok(String::new())
    } else {
        let mut program = String::new();
        io::stdin().read_to_string(&mut program).map(|_| program)
    };

    let program = match program {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to read program: {}", e);
            exit(2)
        }
    };

    let config = Config { program };

    let action = if parse {
        Parse
    } else if interactive {
        Console
    } else {
        Run
    };

    // Run the entire CLI with config
    match run(&config, action) {
        Err(e) => {
            println!("{}", e);
            exit(1)
        }
        Ok(Some(out)) => println!("{}", out),
        Ok(None) => {}
    }
}
