use std::collections::BTreeMap;

/// Parse tree produced by matching source text against a grammar's
/// format alternatives, before translation into the target IR.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    Leaf(String),
    Node(BTreeMap<String, Ast>),
    Seq(Vec<Ast>),
}

impl Ast {
    pub fn print(&self) {
        self.print_internal("".to_string(), true);
    }

    fn print_internal(&self, prefix: String, is_tail: bool) {
        let branch = if is_tail { "└── " } else { "├── " };
        match self {
            Ast::Leaf(text) => println!("{}{}{}", prefix, branch, text),
            Ast::Node(children) => {
                println!("{}{}<node>", prefix, branch);
                let pad = format!("{}{}", prefix, if is_tail { "    " } else { "│   " });
                let len = children.len();
                for (i, (key, child)) in children.iter().enumerate() {
                    println!("{}{}{}:", pad, if i == len - 1 { "└── " } else { "├── " }, key);
                    child.print_internal(pad.clone(), i == len - 1);
                }
            }
            Ast::Seq(items) => {
                println!("{}{}<seq>", prefix, branch);
                let pad = format!("{}{}", prefix, if is_tail { "    " } else { "│   " });
                let len = items.len();
                for (i, item) in items.iter().enumerate() {
                    item.print_internal(pad.clone(), i == len - 1);
                }
            }
        }
    }
}

/// Tagged atomic value: either raw literal text, or a reference to a symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Literal(String),
    Symbol(String),
}

/// Opcode of an instruction template, resolved from its source prefix.
#[derive(Clone, Debug, PartialEq)]
pub enum Opcode {
    /// Plain identifier: a literal, author-chosen constant.
    Name(String),
    /// `#name`: raw matched text of capture `name`, tagged as a literal.
    Literal(String),
    /// `*name`: raw matched text of capture `name`, tagged as a symbol.
    Symbol(String),
    /// `&name`: capture `name` translated recursively into nested IR.
    Nested(Box<Value>),
}

/// Operand of an instruction template. Same shape as `Opcode` without the
/// plain-name case: an operand is never a bare opcode constant.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Literal(String),
    Symbol(String),
    Nested(Box<Value>),
}

/// The generator-facing intermediate representation.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Atom(Atom),
    Instr {
        opcode: Opcode,
        tgt: Option<Operand>,
        src: Option<Operand>,
    },
    Seq(Vec<Value>),
}

impl Value {
    /// Collapses singleton sequences and `{k: {k: v}}` duplicate-key nests.
    /// Idempotent: applying `reduce` to an already-reduced value is a no-op.
    pub fn reduce(self) -> Value {
        match self {
            Value::Seq(mut items) => {
                items = items.into_iter().map(Value::reduce).collect();
                if items.len() == 1 {
                    items.into_iter().next().unwrap()
                } else {
                    Value::Seq(items)
                }
            }
            Value::Instr { opcode, tgt, src } => {
                let opcode = match opcode {
                    Opcode::Nested(inner) => Opcode::Nested(Box::new(inner.reduce())),
                    other => other,
                };
                let tgt = tgt.map(|op| reduce_operand(op));
                let src = src.map(|op| reduce_operand(op));
                flatten_duplicate_key(Value::Instr { opcode, tgt, src })
            }
            other => other,
        }
    }
}

fn reduce_operand(op: Operand) -> Operand {
    match op {
        Operand::Nested(inner) => Operand::Nested(Box::new(inner.reduce())),
        other => other,
    }
}

/// If an instruction's sole nested operand is itself an instruction with the
/// same opcode name and no competing field, flatten the outer wrapper away.
fn flatten_duplicate_key(value: Value) -> Value {
    if let Value::Instr { opcode: Opcode::Name(ref outer_name), tgt: None, src: Some(Operand::Nested(ref inner)) } = value {
        if let Value::Instr { opcode: Opcode::Name(ref inner_name), .. } = **inner {
            if outer_name == inner_name {
                return (**inner).clone();
            }
        }
    }
    value
}
