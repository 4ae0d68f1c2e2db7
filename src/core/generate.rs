extern crate uuid;

use std::{collections::HashMap, error, fmt};

use self::uuid::Uuid;

use crate::core::grammar::{Grammar, Instruction, OperandSpec};
use crate::core::ir::{Atom, Opcode, Operand, Value};
use crate::core::util::string_utils::replace_escapes;

#[derive(Debug)]
pub enum GenerationError {
    Unmapped(String),
    UndeclaredSymbol(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GenerationError::Unmapped(opcode) => {
                write!(f, "no target map alternative matches opcode '{}'", opcode)
            }
            GenerationError::UndeclaredSymbol(name) => {
                write!(f, "use of undeclared symbol '{}'", name)
            }
        }
    }
}

impl error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

/// Per-`generate`-call symbol table and address cursor. Shadow-scoped:
/// a child frame inherits lookups from its parents but its own
/// declarations never leak back up.
struct GenState {
    scopes: Vec<HashMap<String, String>>,
    offset: i64,
}

impl GenState {
    fn new() -> Self {
        GenState { scopes: vec![HashMap::new()], offset: -2 }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            if let Some(addr) = scope.get(name) {
                return Some(addr.clone());
            }
        }
        None
    }

    fn declare(&mut self, name: &str) -> String {
        let addr = self.offset.to_string();
        self.offset += 2;
        self.scopes.last_mut().unwrap().insert(name.to_string(), addr.clone());
        addr
    }

    fn declare_anonymous(&mut self) -> String {
        let addr = self.offset.to_string();
        self.offset += 2;
        let key = Uuid::new_v4().to_string();
        self.scopes.last_mut().unwrap().insert(key, addr.clone());
        addr
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Kind {
    Deref,
    Literal,
    Symbol,
}

fn operand_kind(op: &Operand) -> Kind {
    match op {
        Operand::Nested(_) => Kind::Deref,
        Operand::Literal(_) => Kind::Literal,
        Operand::Symbol(_) => Kind::Symbol,
    }
}

fn instr_operand_kind(op: &Option<OperandSpec>) -> Option<Kind> {
    op.as_ref().map(|spec| match spec {
        OperandSpec::Deref(_) => Kind::Deref,
        OperandSpec::Literal(_) => Kind::Literal,
        OperandSpec::Symbol(_) => Kind::Symbol,
    })
}

/// Renders an IR value into target text under a target `Grammar`.
pub struct Generator<'a> {
    grammar: &'a Grammar,
}

impl<'a> Generator<'a> {
    pub fn new(grammar: &'a Grammar) -> Self {
        Generator { grammar }
    }

    pub fn generate(&self, value: &Value) -> Result<String, GenerationError> {
        let mut state = GenState::new();
        let rendered = self.generate_value(&mut state, value)?;
        Ok(self.postprocess(&rendered))
    }

    fn postprocess(&self, text: &str) -> String {
        let mut out = text.to_string();
        for del in &self.grammar.deletions {
            out = del.replace_all(&out, "").into_owned();
        }
        for (pattern, replacement) in &self.grammar.substitutions {
            out = pattern.replace_all(&out, replacement.as_str()).into_owned();
        }
        out
    }

    fn generate_value(&self, state: &mut GenState, value: &Value) -> Result<String, GenerationError> {
        match value {
            Value::Seq(items) => {
                let mut out = String::new();
                for item in items {
                    out.push_str(&self.generate_value(state, item)?);
                }
                Ok(out)
            }
            Value::Atom(Atom::Literal(text)) => Ok(replace_escapes(text)),
            Value::Atom(Atom::Symbol(name)) => state
                .lookup(name)
                .ok_or_else(|| GenerationError::UndeclaredSymbol(name.clone())),
            Value::Instr { opcode, tgt, src } => self.generate_instr(state, opcode, tgt, src),
        }
    }

    fn generate_instr(
        &self,
        state: &mut GenState,
        opcode: &Opcode,
        tgt: &Option<Operand>,
        src: &Option<Operand>,
    ) -> Result<String, GenerationError> {
        let key = opcode_key(opcode)?;

        let maps = self
            .grammar
            .map_for(&key)
            .ok_or_else(|| GenerationError::Unmapped(key.clone()))?;
        let formats = self
            .grammar
            .format_for(&key)
            .ok_or_else(|| GenerationError::Unmapped(key.clone()))?;

        let tgt_kind = tgt.as_ref().map(operand_kind);
        let src_kind = src.as_ref().map(operand_kind);

        let var = maps
            .iter()
            .position(|alt| signature_matches(alt, tgt_kind, src_kind))
            .ok_or_else(|| GenerationError::Unmapped(key.clone()))?;

        let template = formats
            .get(var)
            .map(|alt| alt.pattern.clone())
            .ok_or_else(|| GenerationError::Unmapped(key.clone()))?;

        // Decode the template's own escapes before substitution: substituted
        // content is inserted already-decoded (see `substitute`), so decoding
        // again afterward would corrupt backslashes a capture matched verbatim.
        let mut rendered = replace_escapes(&template);

        if let Some(operand) = tgt {
            rendered = self.substitute(state, &rendered, "tgt", operand)?;
        }
        if let Some(operand) = src {
            rendered = self.substitute(state, &rendered, "src", operand)?;
        }

        Ok(rendered)
    }

    fn substitute(
        &self,
        state: &mut GenState,
        template: &str,
        opr: &str,
        operand: &Operand,
    ) -> Result<String, GenerationError> {
        let decl_token = format!("!{}", opr);
        let use_token = format!("&{}", opr);
        let raw_token = format!("${}", opr);

        let mut out = template.to_string();

        match operand {
            Operand::Nested(inner) => {
                state.push();
                let generated = self.generate_value(state, inner)?;
                state.pop();
                out = out.replace(&use_token, &generated);
                if out.contains(&decl_token) {
                    let addr = state.declare_anonymous();
                    out = out.replace(&decl_token, &addr);
                }
            }
            Operand::Literal(text) => {
                out = out.replace(&raw_token, &replace_escapes(text));
            }
            Operand::Symbol(name) => {
                if out.contains(&decl_token) {
                    let addr = match state.lookup(name) {
                        Some(addr) => addr,
                        None => state.declare(name),
                    };
                    out = out.replace(&decl_token, &addr);
                } else if out.contains(&use_token) {
                    let addr = state
                        .lookup(name)
                        .ok_or_else(|| GenerationError::UndeclaredSymbol(name.clone()))?;
                    out = out.replace(&use_token, &addr);
                }
                out = out.replace(&raw_token, name);
            }
        }

        Ok(out)
    }
}

fn opcode_key(opcode: &Opcode) -> Result<String, GenerationError> {
    match opcode {
        Opcode::Name(name) => Ok(name.clone()),
        Opcode::Literal(text) => Ok(text.clone()),
        Opcode::Symbol(text) => Ok(text.clone()),
        Opcode::Nested(inner) => match &**inner {
            Value::Instr { opcode: Opcode::Name(name), .. } => Ok(name.clone()),
            Value::Atom(Atom::Literal(text)) | Value::Atom(Atom::Symbol(text)) => Ok(text.clone()),
            _ => Err(GenerationError::Unmapped("<nested opcode>".to_string())),
        },
    }
}

fn signature_matches(alt: &[Instruction], tgt_kind: Option<Kind>, src_kind: Option<Kind>) -> bool {
    match alt.first() {
        Some(instr) => {
            instr_operand_kind(&instr.tgt) == tgt_kind && instr_operand_kind(&instr.src) == src_kind
        }
        None => tgt_kind.is_none() && src_kind.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grammar::GrammarLoader;

    #[test]
    fn trivial_target_echoes_literal() {
        let grammar = GrammarLoader::load(".fmt S ::= $tgt .map S ::= S,#tgt").unwrap();
        let generator = Generator::new(&grammar);
        let value = Value::Atom(Atom::Literal("hello".to_string()));
        let out = generator.generate(&value).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn symbol_addressing_is_monotonic() {
        let grammar = GrammarLoader::load(
            ".fmt set ::= !tgt\\n .fmt mov ::= !tgt := &src\\n .map set ::= set *tgt .map mov ::= mov *tgt,*src",
        )
        .unwrap();
        let generator = Generator::new(&grammar);
        let value = Value::Seq(vec![
            Value::Instr {
                opcode: Opcode::Name("set".to_string()),
                tgt: Some(Operand::Symbol("y".to_string())),
                src: None,
            },
            Value::Instr {
                opcode: Opcode::Name("mov".to_string()),
                tgt: Some(Operand::Symbol("x".to_string())),
                src: Some(Operand::Symbol("y".to_string())),
            },
        ]);
        let out = generator.generate(&value).unwrap();
        assert_eq!(out, "-2\n0 := -2\n");

        let lines: Vec<&str> = out.lines().collect();
        let y_addr: i64 = lines[0].parse().unwrap();
        let x_addr: i64 = lines[1].split(" := ").next().unwrap().parse().unwrap();
        assert!(x_addr > y_addr, "addresses must increase monotonically: x={} y={}", x_addr, y_addr);
    }
}
