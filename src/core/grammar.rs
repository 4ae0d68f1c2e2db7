extern crate fancy_regex;

use std::{error, fmt};

use fancy_regex::Regex;

/// Opcode as written in a `.map` instruction, before resolution against a
/// particular match's captures.
#[derive(Clone, Debug, PartialEq)]
pub enum OpcodeSpec {
    Name(String),
    Deref(String),
    Literal(String),
    Symbol(String),
}

/// Operand as written in a `.map` instruction. An operand is never a bare
/// opcode constant, so there is no `Name` arm here.
#[derive(Clone, Debug, PartialEq)]
pub enum OperandSpec {
    Deref(String),
    Literal(String),
    Symbol(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: OpcodeSpec,
    pub tgt: Option<OperandSpec>,
    pub src: Option<OperandSpec>,
}

/// One `.fmt` alternative: the raw, as-authored pattern text (used as a
/// generation template when this grammar plays the role of a target) paired
/// with its balance-embedded, compiled form (used for source-side matching).
pub struct FormatAlt {
    pub pattern: String,
    pub regex: Regex,
}

/// An immutable, compiled grammar: the output of `GrammarLoader::load`.
pub struct Grammar {
    pub deletions: Vec<Regex>,
    pub substitutions: Vec<(Regex, String)>,
    pub balances: Vec<(char, char)>,
    pub formats: Vec<(String, Vec<FormatAlt>)>,
    pub origins: Vec<String>,
    pub maps: Vec<(String, Vec<Vec<Instruction>>)>,
}

impl Grammar {
    pub fn format_for(&self, sym: &str) -> Option<&Vec<FormatAlt>> {
        self.formats.iter().find(|(s, _)| s == sym).map(|(_, v)| v)
    }

    pub fn format_text(&self, sym: &str, var: usize) -> Option<String> {
        self.format_for(sym).and_then(|alts| alts.get(var)).map(|alt| alt.pattern.clone())
    }

    pub fn map_for(&self, sym: &str) -> Option<&Vec<Vec<Instruction>>> {
        self.maps.iter().find(|(s, _)| s == sym).map(|(_, v)| v)
    }

    /// Returns the ordered set of nonterminals eligible as a parse root:
    /// `origins` if non-empty, otherwise every `.fmt` symbol in declaration
    /// order (`.org` with zero entries means "all formats are roots").
    pub fn targets(&self) -> Vec<&str> {
        if self.origins.is_empty() {
            self.formats.iter().map(|(s, _)| s.as_str()).collect()
        } else {
            self.origins.iter().map(|s| s.as_str()).collect()
        }
    }
}

#[derive(Debug)]
pub enum GrammarError {
    Unbalanced(String),
    MalformedDirective(String),
    ArityMismatch(String),
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrammarError::Unbalanced(alt) => {
                write!(f, "unbalanced delimiters in format alternative: {}", alt)
            }
            GrammarError::MalformedDirective(text) => {
                write!(f, "malformed directive: {}", text)
            }
            GrammarError::ArityMismatch(sym) => write!(
                f,
                "format/map arity mismatch for symbol '{}': |formats| != |maps|",
                sym
            ),
        }
    }
}

impl error::Error for GrammarError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

lazy_static! {
    static ref WS_RUN: Regex = Regex::new(r"\s{2,}").unwrap();
    static ref DIRECTIVE_START: Regex =
        Regex::new(r"\.(del|sub|bal|org|fmt|map)\b").unwrap();
}

const DIRECTIVE_KINDS: [&str; 6] = ["del", "sub", "bal", "org", "fmt", "map"];

/// Parses grammar description text into an immutable `Grammar` record.
pub struct GrammarLoader;

impl GrammarLoader {
    pub fn load(text: &str) -> Result<Grammar, GrammarError> {
        let normalized = WS_RUN.replace_all(text, "\t").into_owned();
        let directives = split_directives(&normalized)?;

        let mut builder = GrammarBuilder::new();
        for (kind, body) in directives {
            let body = body.replace('\n', "").replace('\t', "");
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            match kind {
                "del" => builder.add_deletion(body)?,
                "sub" => builder.add_substitution(body)?,
                "bal" => builder.add_balance(body)?,
                "org" => builder.add_origin(body),
                "fmt" => builder.add_format(body)?,
                "map" => builder.add_map(body)?,
                _ => unreachable!(),
            }
        }
        builder.build()
    }
}

fn split_directives(text: &str) -> Result<Vec<(&str, &str)>, GrammarError> {
    let mut starts: Vec<(usize, usize, &str)> = Vec::new();
    let mut it = DIRECTIVE_START.find_iter(text);
    loop {
        match it.next() {
            Some(Ok(m)) => {
                let kind_start = m.start() + 1;
                let kind_end = m.end();
                starts.push((m.start(), m.end(), &text[kind_start..kind_end]));
            }
            Some(Err(err)) => {
                return Err(GrammarError::MalformedDirective(err.to_string()));
            }
            None => break,
        }
    }

    let mut out = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let (_, body_start, kind) = starts[i];
        let body_end = if i + 1 < starts.len() { starts[i + 1].0 } else { text.len() };
        out.push((kind, &text[body_start..body_end]));
    }
    Ok(out)
}

struct GrammarBuilder {
    deletions: Vec<Regex>,
    substitutions: Vec<(Regex, String)>,
    balances: Vec<(char, char)>,
    formats: Vec<(String, Vec<FormatAlt>)>,
    origins: Vec<String>,
    maps: Vec<(String, Vec<Vec<Instruction>>)>,
}

impl GrammarBuilder {
    fn new() -> Self {
        GrammarBuilder {
            deletions: Vec::new(),
            substitutions: Vec::new(),
            balances: Vec::new(),
            formats: Vec::new(),
            origins: Vec::new(),
            maps: Vec::new(),
        }
    }

    fn add_deletion(&mut self, body: &str) -> Result<(), GrammarError> {
        let re = Regex::new(body)
            .map_err(|e| GrammarError::MalformedDirective(format!(".del {}: {}", body, e)))?;
        self.deletions.push(re);
        Ok(())
    }

    fn add_substitution(&mut self, body: &str) -> Result<(), GrammarError> {
        let mut parts = body.splitn(2, ';');
        let pattern = parts
            .next()
            .ok_or_else(|| GrammarError::MalformedDirective(format!(".sub {}", body)))?;
        let replacement = parts
            .next()
            .ok_or_else(|| GrammarError::MalformedDirective(format!(".sub {}", body)))?;
        let re = Regex::new(pattern)
            .map_err(|e| GrammarError::MalformedDirective(format!(".sub {}: {}", body, e)))?;
        self.substitutions.push((re, replacement.to_string()));
        Ok(())
    }

    fn add_balance(&mut self, body: &str) -> Result<(), GrammarError> {
        let chars: Vec<char> = body.chars().collect();
        if chars.len() != 2 {
            return Err(GrammarError::MalformedDirective(format!(".bal {}", body)));
        }
        self.balances.push((chars[0], chars[1]));
        Ok(())
    }

    fn add_origin(&mut self, body: &str) {
        self.origins.push(body.to_string());
    }

    fn add_format(&mut self, body: &str) -> Result<(), GrammarError> {
        let (sym, rhs) = split_rule(body)
            .ok_or_else(|| GrammarError::MalformedDirective(format!(".fmt {}", body)))?;
        let mut alts = Vec::new();
        for alt in split_alternatives(rhs) {
            let embedded = embed_balances(&alt, &self.balances)?;
            let re = Regex::new(&format!("(?s){}", embedded)).map_err(|e| {
                GrammarError::MalformedDirective(format!(".fmt {} alt '{}': {}", sym, alt, e))
            })?;
            alts.push(FormatAlt { pattern: alt, regex: re });
        }
        self.formats.push((sym, alts));
        Ok(())
    }

    fn add_map(&mut self, body: &str) -> Result<(), GrammarError> {
        let (sym, rhs) = split_rule(body)
            .ok_or_else(|| GrammarError::MalformedDirective(format!(".map {}", body)))?;
        let mut alts = Vec::new();
        for alt in split_alternatives(rhs) {
            let mut instrs = Vec::new();
            for instr_text in alt.split(';') {
                let instr_text = instr_text.trim();
                if instr_text.is_empty() {
                    continue;
                }
                instrs.push(parse_instruction(instr_text)?);
            }
            alts.push(instrs);
        }
        self.maps.push((sym, alts));
        Ok(())
    }

    fn build(self) -> Result<Grammar, GrammarError> {
        for (sym, alts) in &self.maps {
            match self.formats.iter().find(|(s, _)| s == sym) {
                Some((_, fmts)) if fmts.len() == alts.len() => {}
                _ => return Err(GrammarError::ArityMismatch(sym.clone())),
            }
        }

        reject_direct_left_recursion(&self.formats)?;

        Ok(Grammar {
            deletions: self.deletions,
            substitutions: self.substitutions,
            balances: self.balances,
            formats: self.formats,
            origins: self.origins,
            maps: self.maps,
        })
    }
}

/// Splits `SYM ::= rhs` into `(SYM, rhs)`.
fn split_rule(body: &str) -> Option<(String, &str)> {
    let idx = body.find("::=")?;
    let sym = body[..idx].trim().to_string();
    let rhs = &body[idx + 3..];
    Some((sym, rhs))
}

/// Splits `A | B | C` on top-level, unescaped `|` separators.
fn split_alternatives(rhs: &str) -> Vec<String> {
    let mut alts = Vec::new();
    let mut current = String::new();
    let mut chars = rhs.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
            continue;
        }
        if c == '|' {
            alts.push(current.trim().to_string());
            current = String::new();
            continue;
        }
        current.push(c);
    }
    alts.push(current.trim().to_string());
    alts
}

fn parse_field(text: &str) -> (Option<char>, String) {
    let mut chars = text.chars();
    match chars.clone().next() {
        Some(c @ '&') | Some(c @ '#') | Some(c @ '*') => {
            chars.next();
            (Some(c), chars.as_str().to_string())
        }
        _ => (None, text.to_string()),
    }
}

fn parse_instruction(text: &str) -> Result<Instruction, GrammarError> {
    let mut parts = text.splitn(2, ',');
    let head = parts.next().unwrap_or("").trim();
    let src_text = parts.next().map(|s| s.trim());

    let mut head_fields = head.split_whitespace();
    let opcode_text = head_fields
        .next()
        .ok_or_else(|| GrammarError::MalformedDirective(format!("empty instruction: {}", text)))?;
    let tgt_text = head_fields.next();

    let opcode = match parse_field(opcode_text) {
        (None, name) => OpcodeSpec::Name(name),
        (Some('&'), name) => OpcodeSpec::Deref(name),
        (Some('#'), name) => OpcodeSpec::Literal(name),
        (Some('*'), name) => OpcodeSpec::Symbol(name),
        _ => unreachable!(),
    };

    let tgt = match tgt_text {
        Some(t) => Some(parse_operand(t)?),
        None => None,
    };
    let src = match src_text {
        Some(s) if !s.is_empty() => Some(parse_operand(s)?),
        _ => None,
    };

    Ok(Instruction { opcode, tgt, src })
}

fn parse_operand(text: &str) -> Result<OperandSpec, GrammarError> {
    match parse_field(text) {
        (Some('&'), name) => Ok(OperandSpec::Deref(name)),
        (Some('#'), name) => Ok(OperandSpec::Literal(name)),
        (Some('*'), name) => Ok(OperandSpec::Symbol(name)),
        _ => Err(GrammarError::MalformedDirective(format!(
            "operand must be prefixed with &, # or *: {}",
            text
        ))),
    }
}

/// Embeds balanced-delimiter bookkeeping into a format alternative's raw
/// pattern text: a literal (optionally backslash-escaped) prefix character
/// becomes a fresh named capture that a matching suffix back-references.
fn embed_balances(pattern: &str, balances: &[(char, char)]) -> Result<String, GrammarError> {
    let mut out = String::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut next_id: usize = 0;
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let (c, escaped, advance) = if chars[i] == '\\' && i + 1 < chars.len() {
            (chars[i + 1], true, 2)
        } else {
            (chars[i], false, 1)
        };

        if let Some(_) = balances.iter().find(|(p, _)| *p == c) {
            let id = next_id;
            next_id += 1;
            stack.push(id);
            out.push_str(&format!("(?P<d{}>@[0-9]+)", id));
            out.push_str(&escape_regex_char(c));
            i += advance;
            continue;
        }

        if balances.iter().any(|(_, s)| *s == c) {
            match stack.pop() {
                Some(id) => {
                    out.push_str(&format!("(?P=d{})", id));
                    out.push_str(&escape_regex_char(c));
                }
                None => return Err(GrammarError::Unbalanced(pattern.to_string())),
            }
            i += advance;
            continue;
        }

        if escaped {
            out.push('\\');
        }
        out.push(c);
        i += advance;
    }

    if !stack.is_empty() {
        return Err(GrammarError::Unbalanced(pattern.to_string()));
    }

    Ok(out)
}

fn escape_regex_char(c: char) -> String {
    if "\\^$.|?*+()[]{}".contains(c) {
        format!("\\{}", c)
    } else {
        c.to_string()
    }
}

/// Conservative static check: a format alternative is rejected if it begins
/// with a named capture referencing its own symbol, since that capture can
/// recurse before consuming any input.
fn reject_direct_left_recursion(formats: &[(String, Vec<FormatAlt>)]) -> Result<(), GrammarError> {
    lazy_static! {
        static ref LEADING_CAPTURE: Regex = Regex::new(r"^\(\?P<([A-Za-z_][A-Za-z0-9_]*)>").unwrap();
    }
    for (sym, alts) in formats {
        for alt in alts {
            let source = alt.pattern.as_str();
            if let Ok(Some(caps)) = LEADING_CAPTURE.captures(source) {
                if let Some(name) = caps.get(1) {
                    if name.as_str() == sym {
                        return Err(GrammarError::Unbalanced(format!(
                            "direct left recursion in '{}': {}",
                            sym, source
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_simple_balance() {
        let balances = vec![('(', ')')];
        let res = embed_balances(r"\((?P<inner>.*?)\)", &balances).unwrap();
        assert!(res.contains("(?P<d0>@[0-9]+)"));
        assert!(res.contains("(?P=d0)"));
    }

    #[test]
    fn rejects_unbalanced() {
        let balances = vec![('(', ')')];
        assert!(embed_balances(r"\(\(x\)", &balances).is_err());
    }

    #[test]
    fn splits_alternatives_respects_escapes() {
        let alts = split_alternatives(r"a\|b | c");
        assert_eq!(alts, vec![r"a\|b".to_string(), "c".to_string()]);
    }

    #[test]
    fn loads_minimal_echo_grammar() {
        let text = ".fmt S ::= (?P<tok>\\w+) .map S ::= #tok";
        let grammar = GrammarLoader::load(text).unwrap();
        assert_eq!(grammar.formats.len(), 1);
        assert_eq!(grammar.maps.len(), 1);
    }
}
