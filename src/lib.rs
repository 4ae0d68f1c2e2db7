#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

pub mod cli;
pub mod core;

pub use core::generate::{GenerationError, Generator};
pub use core::grammar::{Grammar, GrammarError, GrammarLoader};
pub use core::parse::{ParseError, Parser};
pub use core::{translate, Error};
