pub mod generate;
pub mod grammar;
pub mod ir;
pub mod optimize;
pub mod parse;
pub mod util;

use std::{error, fmt};

use self::generate::GenerationError;
use self::grammar::{Grammar, GrammarError};
use self::parse::ParseError;

/// Aggregate failure mode for a full `translate` pipeline run, spanning
/// grammar loading, source parsing, and target generation.
#[derive(Debug)]
pub enum Error {
    Grammar(GrammarError),
    Parse(ParseError),
    Generation(GenerationError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Grammar(e) => write!(f, "{}", e),
            Error::Parse(e) => write!(f, "{}", e),
            Error::Generation(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Grammar(e) => Some(e),
            Error::Parse(e) => Some(e),
            Error::Generation(e) => Some(e),
        }
    }
}

impl From<GrammarError> for Error {
    fn from(e: GrammarError) -> Self {
        Error::Grammar(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<GenerationError> for Error {
    fn from(e: GenerationError) -> Self {
        Error::Generation(e)
    }
}

/// Runs the full GrammarLoader -> Parser -> Optimizer -> Generator pipeline
/// over a single source text, translating it from `source_grammar` into
/// `target_grammar`'s surface form.
pub fn translate(source_grammar: &Grammar, target_grammar: &Grammar, source: &str) -> Result<String, Error> {
    let parser = parse::Parser::new(source_grammar);
    let ast = parser.parse(source)?;

    let optimizer = optimize::def_optimizer();
    let optimized = optimizer.optimize(ast);

    let generator = generate::Generator::new(target_grammar);
    let text = generator.generate(&optimized)?;

    Ok(text)
}
