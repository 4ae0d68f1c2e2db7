extern crate clap;
extern crate stopwatch;

use std::{fs, panic, path::Path};

use crate::cli::logger::Fatal;

use self::{
    clap::{App, Arg, ArgMatches},
    stopwatch::Stopwatch,
};

use crate::core::grammar::GrammarLoader;

#[macro_use]
pub mod logger;

pub fn run() {
    let matches = build_app();
    logger::init(&matches);

    catch_fatal!(
        {
            run_internal(&matches);
        },
        {
            std::process::exit(1);
        }
    );
}

fn run_internal(matches: &ArgMatches) {
    let mut sw = Stopwatch::start_new();

    let source_grammar_path = matches.value_of("source-grammar").unwrap();
    let target_grammar_path = matches.value_of("target-grammar").unwrap();
    let source_path = matches.value_of("source").unwrap();

    logger::diagnostic(&format!("Loading source grammar {}", source_grammar_path));
    let source_grammar_text = read_file(source_grammar_path);
    let source_grammar = match GrammarLoader::load(&source_grammar_text) {
        Ok(grammar) => grammar,
        Err(err) => logger::fatal(&format!(
            "Error loading source grammar {}: {}",
            source_grammar_path, err
        )),
    };

    logger::diagnostic(&format!("Loading target grammar {}", target_grammar_path));
    let target_grammar_text = read_file(target_grammar_path);
    let target_grammar = match GrammarLoader::load(&target_grammar_text) {
        Ok(grammar) => grammar,
        Err(err) => logger::fatal(&format!(
            "Error loading target grammar {}: {}",
            target_grammar_path, err
        )),
    };

    logger::diagnostic(&format!("Reading source {}", source_path));
    let source = read_file(source_path);

    let output = match crate::core::translate(&source_grammar, &target_grammar, &source) {
        Ok(output) => output,
        Err(err) => logger::fatal(&format!("Translation failed: {}", err)),
    };

    match matches.value_of("output") {
        Some(output_path) => match fs::write(output_path, &output) {
            Ok(_) => {}
            Err(err) => logger::fatal(&format!("Could not write output file {}: {}", output_path, err)),
        },
        None => print!("{}", output),
    }

    sw.stop();
    logger::info(&format!("COMPLETE: {}ms", sw.elapsed_ms()));
}

fn read_file(path: &str) -> String {
    match fs::read_to_string(Path::new(path)) {
        Ok(contents) => contents,
        Err(err) => logger::fatal(&format!("Could not read file \"{}\": {}", path, err)),
    }
}

fn build_app<'a>() -> ArgMatches<'a> {
    App::new("gxlate")
        .version("0.1.0")
        .author("Shane Hickman <srhickma@edu.uwaterloo.ca>")
        .about("Translates source text between grammars via a shared instruction-template IR")
        .arg(
            Arg::with_name("source-grammar")
                .long("source-grammar")
                .help("Path to the source grammar description")
                .takes_value(true)
                .value_name("PATH")
                .required(true),
        )
        .arg(
            Arg::with_name("target-grammar")
                .long("target-grammar")
                .help("Path to the target grammar description")
                .takes_value(true)
                .value_name("PATH")
                .required(true),
        )
        .arg(
            Arg::with_name("source")
                .long("source")
                .help("Path to the source program to translate")
                .takes_value(true)
                .value_name("PATH")
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .help("Path to write the translated program to (defaults to stdout)")
                .takes_value(true)
                .value_name("PATH"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Increases logging verbosity (-v debug, -vv trace)")
                .multiple(true),
        )
        .arg(
            Arg::with_name("logfile")
                .long("logfile")
                .help("Path to write logs to")
                .takes_value(true)
                .value_name("PATH"),
        )
        .get_matches()
}
