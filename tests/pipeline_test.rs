extern crate gxlate;

use gxlate::{translate, GrammarLoader};

#[test]
fn minimal_echo_identity() {
    //setup
    let grammar = GrammarLoader::load(".fmt S ::= (?P<tok>\\w+) .map S ::= #tok").unwrap();

    //exercise
    let res = translate(&grammar, &grammar, "hello").unwrap();

    //verify
    assert_eq!(res, "hello");
}

#[test]
fn balanced_braces_extracts_inner() {
    //setup
    let source = GrammarLoader::load(
        ".bal {}\n.fmt group ::= \\{(?P<inner>.*?)\\}\n.map group ::= group,#inner",
    )
    .unwrap();
    let target = GrammarLoader::load(".fmt group ::= <$src>\n.map group ::= group,#src").unwrap();

    //exercise
    let res = translate(&source, &target, "{abc}").unwrap();

    //verify
    assert_eq!(res, "<abc>");
}

#[test]
fn assignment_statement_translates_across_surface_syntax() {
    //setup
    let source = GrammarLoader::load(
        ".fmt stmt ::= set (?P<var>\\w+) (?P<val>\\w+)\n.map stmt ::= set *var,#val",
    )
    .unwrap();
    let target =
        GrammarLoader::load(".fmt set ::= !tgt := $src;\n.map set ::= set *t,#s").unwrap();

    //exercise
    let res = translate(&source, &target, "set x 5").unwrap();

    //verify: the source symbol "x" is declared at the generator's first address
    assert_eq!(res, "-2 := 5;");
}

#[test]
fn sequential_statements_share_monotonic_addressing() {
    //setup
    let source = GrammarLoader::load(
        ".fmt stmt ::= set (?P<var>\\w+) (?P<val>\\w+);\\s*|use (?P<ref>\\w+);\\s*\n\
         .map stmt ::= set *var,#val|use,*ref",
    )
    .unwrap();
    let target = GrammarLoader::load(
        ".fmt set ::= !tgt := $src;\\n\n.fmt use ::= ($src)\\n\n\
         .map set ::= set *t,#s\n.map use ::= use,*r",
    )
    .unwrap();

    //exercise
    let res = translate(&source, &target, "set x 5;use x;").unwrap();

    //verify: "x" is declared once by "set" and referenced by name (not re-declared) by "use"
    assert_eq!(res, "-2 := 5;\n(x)\n");
}

#[test]
fn comment_stripped_and_keyword_substituted_before_parse() {
    //setup
    let source = GrammarLoader::load(
        ".del //[^\\n]*\\n?\n.del \\s+$\n.sub \\btrue\\b;1\n.fmt tok ::= (?P<v>\\w+)\n.map tok ::= #v",
    )
    .unwrap();
    let target = GrammarLoader::load(".fmt tok ::= $tgt\n.map tok ::= tok,#tgt").unwrap();

    //exercise
    let res = translate(&source, &target, "true // a comment\n").unwrap();

    //verify
    assert_eq!(res, "1");
}
