extern crate fancy_regex;

use std::{collections::BTreeMap, error, fmt};

use crate::core::grammar::{FormatAlt, Grammar, Instruction, OpcodeSpec, OperandSpec};
use crate::core::ir::{Ast, Atom, Opcode, Operand, Value};

#[derive(Debug)]
pub enum SourceError {
    Unbalanced,
    NoMatch(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SourceError::Unbalanced => write!(f, "unbalanced delimiters at end of source"),
            SourceError::NoMatch(remaining) => write!(
                f,
                "no format alternative matches remaining input: {:.60}",
                remaining
            ),
        }
    }
}

impl error::Error for SourceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

#[derive(Debug)]
pub enum TranslationError {
    NoVariant(String),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TranslationError::NoVariant(what) => {
                write!(f, "no format alternative matches node's capture set: {}", what)
            }
        }
    }
}

impl error::Error for TranslationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

/// Either half of the Parser's own two failure modes, aggregated so
/// `Parser::parse` can return a single `Result` type.
#[derive(Debug)]
pub enum ParseError {
    Source(SourceError),
    Translation(TranslationError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Source(e) => write!(f, "{}", e),
            ParseError::Translation(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ParseError::Source(e) => Some(e),
            ParseError::Translation(e) => Some(e),
        }
    }
}

impl From<SourceError> for ParseError {
    fn from(e: SourceError) -> Self {
        ParseError::Source(e)
    }
}

impl From<TranslationError> for ParseError {
    fn from(e: TranslationError) -> Self {
        ParseError::Translation(e)
    }
}

lazy_static! {
    static ref DELIM_GROUP: fancy_regex::Regex = fancy_regex::Regex::new(r"^d[0-9]+$").unwrap();
}

/// A grammar-bound parser: preprocesses, matches, reduces and translates
/// source text into IR under a single `Grammar`.
pub struct Parser<'a> {
    grammar: &'a Grammar,
    verbose: bool,
}

impl<'a> Parser<'a> {
    pub fn new(grammar: &'a Grammar) -> Self {
        Parser { grammar, verbose: false }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn parse(&self, source: &str) -> Result<Value, ParseError> {
        let preprocessed = self.preprocess(source)?;
        let ast = self.parse_targets(&preprocessed, &self.grammar.targets())?;
        let reduced = reduce(ast);
        let value = translate(self.grammar, &reduced)?;
        Ok(value.reduce())
    }

    /// §4.2.1: deletions, then substitutions, then the balanced-delimiter
    /// rewrite into `@<n><ch>` tokens.
    fn preprocess(&self, source: &str) -> Result<String, SourceError> {
        let mut text = source.to_string();
        for del in &self.grammar.deletions {
            text = del.replace_all(&text, "").into_owned();
        }
        for (pattern, replacement) in &self.grammar.substitutions {
            text = pattern.replace_all(&text, replacement.as_str()).into_owned();
        }
        rewrite_balances(&text, &self.grammar.balances)
    }

    fn parse_targets(&self, text: &str, targets: &[&str]) -> Result<Ast, SourceError> {
        let mut cursor = text;
        let mut chunks: Vec<Ast> = Vec::new();

        while !cursor.is_empty() {
            let mut advanced = false;

            for sym in targets {
                let alts = match self.grammar.format_for(sym) {
                    Some(alts) => alts,
                    None => continue,
                };

                for alt in alts {
                    let swept = sweep_stale_suffixes(cursor, &self.grammar.balances);
                    match self.try_match(sym, alt, &swept) {
                        Some((subtree, matched_len)) => {
                            chunks.push(Ast::Node({
                                let mut m = BTreeMap::new();
                                m.insert((*sym).to_string(), subtree);
                                m
                            }));
                            cursor = &cursor[matched_len.min(cursor.len())..];
                            advanced = true;
                            break;
                        }
                        None => {
                            if self.verbose {
                                debug!("alternative did not match for '{}', trying next", sym);
                            }
                            continue;
                        }
                    }
                }
                if advanced {
                    break;
                }
            }

            if !advanced {
                return Err(SourceError::NoMatch(cursor.to_string()));
            }
        }

        Ok(Ast::Seq(chunks))
    }

    /// Attempts one alternative against `text`, anchored at position 0.
    /// Returns the subtree bound to this match plus the matched byte length.
    fn try_match(&self, sym: &str, alt: &FormatAlt, text: &str) -> Option<(Ast, usize)> {
        let re = &alt.regex;
        let m = match re.find(text) {
            Ok(Some(m)) if m.start() == 0 => m,
            _ => return None,
        };

        let caps = match re.captures(text) {
            Ok(Some(c)) => c,
            _ => return None,
        };

        let names: Vec<&str> = re
            .capture_names()
            .filter_map(|n| n)
            .filter(|n| !is_delim_group(n))
            .collect();

        if names.is_empty() {
            return Some((Ast::Leaf(m.as_str().to_string()), m.end()));
        }

        let mut attrs = BTreeMap::new();
        for name in names {
            let group_text = match caps.name(name) {
                Some(g) => g.as_str(),
                None => continue,
            };
            let stripped = strip_delim_tokens(group_text);
            if stripped.is_empty() {
                continue;
            }

            let sub = if self.grammar.format_for(name).is_some() {
                match self.parse_targets(&stripped, &[name]) {
                    Ok(ast) => reduce(ast),
                    Err(_) => return None,
                }
            } else {
                Ast::Leaf(stripped)
            };
            attrs.insert(name.to_string(), sub);
        }

        let _ = sym;
        Some((Ast::Node(attrs), m.end()))
    }
}

fn is_delim_group(name: &str) -> bool {
    DELIM_GROUP.is_match(name).unwrap_or(false)
}

/// Strips `@[0-9]+` balance-counter tokens from captured text.
fn strip_delim_tokens(text: &str) -> String {
    lazy_static! {
        static ref DELIM_TOKEN: fancy_regex::Regex = fancy_regex::Regex::new(r"@[0-9]+").unwrap();
    }
    DELIM_TOKEN.replace_all(text, "").into_owned()
}

/// §3 / §4.2.1: rewrites every declared delimiter character to `@<n><ch>`,
/// `n` incrementing on a prefix and decrementing on the matching suffix.
fn rewrite_balances(text: &str, balances: &[(char, char)]) -> Result<String, SourceError> {
    let mut out = String::with_capacity(text.len());
    let mut n: i64 = 0;

    for c in text.chars() {
        if let Some(_) = balances.iter().find(|(p, _)| *p == c) {
            out.push_str(&format!("@{}", n));
            out.push(c);
            n += 1;
        } else if balances.iter().any(|(_, s)| *s == c) {
            n -= 1;
            if n < 0 {
                return Err(SourceError::Unbalanced);
            }
            out.push_str(&format!("@{}", n));
            out.push(c);
        } else {
            out.push(c);
        }
    }

    if n != 0 {
        return Err(SourceError::Unbalanced);
    }

    Ok(out)
}

/// §4.2.2 stale-delimiter sweep: remove a suffix token `@k<s>` that has no
/// corresponding `@k<p>` still present in the text.
fn sweep_stale_suffixes(text: &str, balances: &[(char, char)]) -> String {
    let mut out = text.to_string();
    for (p, s) in balances {
        lazy_static_sweep(&mut out, *p, *s);
    }
    out
}

fn lazy_static_sweep(text: &mut String, p: char, s: char) {
    let prefix_re = fancy_regex::Regex::new(&format!(r"@([0-9]+){}", regex_escape(p))).unwrap();
    let suffix_re = fancy_regex::Regex::new(&format!(r"@([0-9]+){}", regex_escape(s))).unwrap();

    let present: std::collections::HashSet<String> = prefix_re
        .captures_iter(text)
        .filter_map(|c| c.ok())
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    let mut it = suffix_re.captures_iter(text);
    loop {
        match it.next() {
            Some(Ok(caps)) => {
                let whole = caps.get(0).unwrap();
                let n = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
                if present.contains(&n) {
                    continue;
                }
                result.push_str(&text[last..whole.start()]);
                last = whole.end();
            }
            _ => break,
        }
    }
    result.push_str(&text[last..]);
    *text = result;
}

fn regex_escape(c: char) -> String {
    if "\\^$.|?*+()[]{}".contains(c) {
        format!("\\{}", c)
    } else {
        c.to_string()
    }
}

/// §4.2.3: post-order singleton/duplicate-key collapse.
pub fn reduce(ast: Ast) -> Ast {
    match ast {
        Ast::Seq(items) => {
            let items: Vec<Ast> = items.into_iter().map(reduce).collect();
            if items.len() == 1 {
                items.into_iter().next().unwrap()
            } else {
                Ast::Seq(items)
            }
        }
        Ast::Node(map) => {
            let map: BTreeMap<String, Ast> =
                map.into_iter().map(|(k, v)| (k, reduce(v))).collect();
            if map.len() == 1 {
                let (k, v) = map.iter().next().unwrap();
                if let Ast::Node(inner) = v {
                    if inner.len() == 1 && inner.contains_key(k) {
                        return inner.get(k).unwrap().clone();
                    }
                }
            }
            Ast::Node(map)
        }
        leaf => leaf,
    }
}

/// §4.2.4: translates a (possibly sequence-wrapped) `{sym: subtree}` AST
/// into the generator-facing IR.
pub fn translate(grammar: &Grammar, ast: &Ast) -> Result<Value, TranslationError> {
    match ast {
        Ast::Seq(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(translate(grammar, item)?);
            }
            Ok(Value::Seq(values))
        }
        Ast::Node(map) if map.len() == 1 => {
            let (sym, subtree) = map.iter().next().unwrap();
            translate_symbol(grammar, sym, subtree)
        }
        other => Err(TranslationError::NoVariant(format!("{:?}", other))),
    }
}

fn translate_symbol(grammar: &Grammar, sym: &str, subtree: &Ast) -> Result<Value, TranslationError> {
    let formats = grammar
        .format_for(sym)
        .ok_or_else(|| TranslationError::NoVariant(sym.to_string()))?;
    let maps = grammar
        .map_for(sym)
        .ok_or_else(|| TranslationError::NoVariant(sym.to_string()))?;

    let var = select_variant(formats, subtree).ok_or_else(|| TranslationError::NoVariant(sym.to_string()))?;
    let empty = BTreeMap::new();
    let attrs = match subtree {
        Ast::Node(map) => map,
        _ => &empty,
    };

    translate_instructions(grammar, attrs, &maps[var])
}

fn select_variant(formats: &[FormatAlt], subtree: &Ast) -> Option<usize> {
    match subtree {
        Ast::Node(map) => {
            let keys: std::collections::BTreeSet<&str> = map.keys().map(|s| s.as_str()).collect();
            formats.iter().position(|alt| {
                let names: std::collections::BTreeSet<&str> = alt
                    .regex
                    .capture_names()
                    .filter_map(|n| n)
                    .filter(|n| !is_delim_group(n))
                    .collect();
                names == keys
            })
        }
        Ast::Leaf(text) => formats.iter().position(|alt| {
            let has_names = alt.regex.capture_names().filter_map(|n| n).any(|n| !is_delim_group(n));
            !has_names
                && matches!(alt.regex.find(text), Ok(Some(m)) if m.start() == 0 && m.end() == text.len())
        }),
        Ast::Seq(_) => None,
    }
}

fn translate_instructions(
    grammar: &Grammar,
    attrs: &BTreeMap<String, Ast>,
    instrs: &[Instruction],
) -> Result<Value, TranslationError> {
    let mut values = Vec::with_capacity(instrs.len());
    for instr in instrs {
        values.push(translate_instruction(grammar, attrs, instr)?);
    }
    if values.len() == 1 {
        Ok(values.into_iter().next().unwrap())
    } else {
        Ok(Value::Seq(values))
    }
}

fn translate_instruction(
    grammar: &Grammar,
    attrs: &BTreeMap<String, Ast>,
    instr: &Instruction,
) -> Result<Value, TranslationError> {
    let opcode = match &instr.opcode {
        OpcodeSpec::Name(n) => Opcode::Name(n.clone()),
        OpcodeSpec::Literal(n) => Opcode::Literal(raw_text(attrs, n)?),
        OpcodeSpec::Symbol(n) => Opcode::Symbol(raw_text(attrs, n)?),
        OpcodeSpec::Deref(n) => {
            let sub = attrs
                .get(n)
                .ok_or_else(|| TranslationError::NoVariant(n.clone()))?;
            Opcode::Nested(Box::new(translate_symbol(grammar, n, sub)?))
        }
    };

    let tgt = match &instr.tgt {
        Some(spec) => Some(resolve_operand(grammar, attrs, spec)?),
        None => None,
    };
    let src = match &instr.src {
        Some(spec) => Some(resolve_operand(grammar, attrs, spec)?),
        None => None,
    };

    if tgt.is_none() && src.is_none() {
        return Ok(match opcode {
            Opcode::Literal(text) => Value::Atom(Atom::Literal(text)),
            Opcode::Symbol(text) => Value::Atom(Atom::Symbol(text)),
            Opcode::Nested(inner) => *inner,
            Opcode::Name(name) => Value::Instr { opcode: Opcode::Name(name), tgt: None, src: None },
        });
    }

    Ok(Value::Instr { opcode, tgt, src })
}

fn resolve_operand(
    grammar: &Grammar,
    attrs: &BTreeMap<String, Ast>,
    spec: &OperandSpec,
) -> Result<Operand, TranslationError> {
    Ok(match spec {
        OperandSpec::Literal(n) => Operand::Literal(raw_text(attrs, n)?),
        OperandSpec::Symbol(n) => Operand::Symbol(raw_text(attrs, n)?),
        OperandSpec::Deref(n) => {
            let sub = attrs
                .get(n)
                .ok_or_else(|| TranslationError::NoVariant(n.clone()))?;
            Operand::Nested(Box::new(translate_symbol(grammar, n, sub)?))
        }
    })
}

fn raw_text(attrs: &BTreeMap<String, Ast>, name: &str) -> Result<String, TranslationError> {
    let ast = attrs
        .get(name)
        .ok_or_else(|| TranslationError::NoVariant(name.to_string()))?;
    Ok(flatten_text(ast))
}

fn flatten_text(ast: &Ast) -> String {
    match ast {
        Ast::Leaf(text) => text.clone(),
        Ast::Node(map) => map.values().map(flatten_text).collect::<Vec<_>>().join(""),
        Ast::Seq(items) => items.iter().map(flatten_text).collect::<Vec<_>>().join(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grammar::GrammarLoader;

    #[test]
    fn reduce_is_idempotent() {
        let mut m = BTreeMap::new();
        m.insert("s".to_string(), Ast::Leaf("x".to_string()));
        let ast = Ast::Seq(vec![Ast::Node(m)]);
        let once = reduce(ast.clone());
        let twice = reduce(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_balances_round_trips_at_zero() {
        let balances = vec![('(', ')')];
        let res = rewrite_balances("(a(b)c)", &balances).unwrap();
        assert_eq!(res, "@0(a@1(b@1)c@0)");
    }

    #[test]
    fn rewrite_balances_rejects_unbalanced() {
        let balances = vec![('(', ')')];
        assert!(rewrite_balances("(a", &balances).is_err());
    }

    #[test]
    fn minimal_echo_parses_to_literal_atom() {
        let grammar = GrammarLoader::load(".fmt S ::= (?P<tok>\\w+) .map S ::= #tok").unwrap();
        let parser = Parser::new(&grammar);
        let value = parser.parse("hello").unwrap();
        assert_eq!(value, Value::Atom(Atom::Literal("hello".to_string())));
    }
}
