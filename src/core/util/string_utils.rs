/// Returns `input` with all backslash-escaped characters replaced, i.e. \n, \t, \r, \\, \'
/// are replaced by their corresponding characters, \xNN is replaced by the byte value NN
/// (two hex digits), and all other backslashes are simply removed.
pub fn replace_escapes(input: &str) -> String {
    let mut res = String::with_capacity(input.as_bytes().len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => res.push('\n'),
            Some('t') => res.push('\t'),
            Some('r') => res.push('\r'),
            Some('\'') => res.push('\''),
            Some('\\') => res.push('\\'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                match (hi.and_then(|c| c.to_digit(16)), lo.and_then(|c| c.to_digit(16))) {
                    (Some(hi), Some(lo)) => {
                        let byte = (hi * 16 + lo) as u8;
                        res.push(byte as char);
                    }
                    _ => {
                        res.push('x');
                        if let Some(hi) = hi {
                            res.push(hi);
                        }
                        if let Some(lo) = lo {
                            res.push(lo);
                        }
                    }
                }
            }
            Some(other) => res.push(other),
            None => {}
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_escapes_empty() {
        let input = "";
        let res = replace_escapes(input);
        assert_eq!(res, "");
    }

    #[test]
    fn replace_escapes_single() {
        let input = "\\n";
        let res = replace_escapes(input);
        assert_eq!(res, "\n");
    }

    #[test]
    fn replace_escapes_chained() {
        let input = "\\\\n\\n\\\\\\t";
        let res = replace_escapes(input);
        assert_eq!(res, "\\n\n\\\t");
    }

    #[test]
    fn replace_escapes_full() {
        let input = "ffffnt\'ff\\n\\t\\\\\\\\ffff\\ff\'\\f\\\'fff\\r";
        let res = replace_escapes(input);
        assert_eq!(res, "ffffnt\'ff\n\t\\\\ffffff\'f\'fff\r");
    }

    #[test]
    fn replace_escapes_hex_byte() {
        let input = "\\x41\\x42";
        let res = replace_escapes(input);
        assert_eq!(res, "AB");
    }

    #[test]
    fn replace_escapes_hex_incomplete() {
        let input = "\\xG";
        let res = replace_escapes(input);
        assert_eq!(res, "xG");
    }
}
