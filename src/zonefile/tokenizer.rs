//! Splits zone file text into logical lines of fields.
//!
//! Parentheses join physical lines, `;` starts a comment outside quotes,
//! and leading whitespace is remembered because it means "same owner as
//! the previous record".

use crate::common::{ParseSnafu, Result};
use crate::models::txt::{octets_to_text, unescape_into, Field};

#[derive(Debug)]
pub(super) struct Line {
    pub number: usize,
    pub leading_blank: bool,
    pub fields: Vec<Field>,
}

pub(super) fn logical_lines(text: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut chars = text.chars().peekable();
    let mut number = 1;
    let mut start = 1;
    let mut depth = 0usize;
    let mut at_line_start = true;
    let mut leading_blank = false;
    let mut fields: Vec<Field> = Vec::new();

    while let Some(c) = chars.next() {
        if at_line_start {
            at_line_start = false;
            start = number;
            leading_blank = c == ' ' || c == '\t';
        }
        match c {
            '\n' => {
                number += 1;
                if depth == 0 {
                    if !fields.is_empty() {
                        lines.push(Line {
                            number: start,
                            leading_blank,
                            fields: std::mem::take(&mut fields),
                        });
                    }
                    at_line_start = true;
                }
            }
            ';' => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return ParseSnafu {
                        line: number,
                        message: "unbalanced closing parenthesis",
                    }
                    .fail();
                }
                depth -= 1;
            }
            c if c.is_whitespace() => {}
            '"' => {
                let mut raw = Vec::new();
                let mut closed = false;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => unescape_into(&mut chars, &mut raw).map_err(|err| {
                            ParseSnafu {
                                line: number,
                                message: err.to_string(),
                            }
                            .build()
                        })?,
                        q => {
                            if q == '\n' {
                                number += 1;
                            }
                            let mut buf = [0u8; 4];
                            raw.extend_from_slice(q.encode_utf8(&mut buf).as_bytes());
                        }
                    }
                }
                if !closed {
                    return ParseSnafu {
                        line: start,
                        message: "unterminated quoted string",
                    }
                    .fail();
                }
                let text = octets_to_text(raw).map_err(|message| {
                    ParseSnafu {
                        line: number,
                        message,
                    }
                    .build()
                })?;
                fields.push(Field { text, quoted: true });
            }
            first => {
                let mut text = String::new();
                text.push(first);
                if first == '\\' {
                    if let Some(next) = chars.next() {
                        text.push(next);
                    }
                }
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() || matches!(n, ';' | '(' | ')' | '"') {
                        break;
                    }
                    chars.next();
                    text.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                }
                fields.push(Field {
                    text,
                    quoted: false,
                });
            }
        }
    }

    if depth != 0 {
        return ParseSnafu {
            line: start,
            message: "unclosed parenthesis",
        }
        .fail();
    }
    if !fields.is_empty() {
        lines.push(Line {
            number: start,
            leading_blank,
            fields,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &Line) -> Vec<&str> {
        line.fields.iter().map(|f| f.text.as_str()).collect()
    }

    #[test]
    fn comments_and_blank_lines_are_dropped() {
        let lines = logical_lines("; header\n\n@ IN A 1.2.3.4 ; trailing\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 3);
        assert_eq!(texts(&lines[0]), vec!["@", "IN", "A", "1.2.3.4"]);
    }

    #[test]
    fn parentheses_join_lines() {
        let text = "@ IN SOA ns1 admin (\n  1 ; serial\n  2 3 4\n  5 )\nwww IN A 1.1.1.1\n";
        let lines = logical_lines(text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(texts(&lines[0]).len(), 10);
        assert_eq!(lines[1].number, 5);
    }

    #[test]
    fn leading_blank_is_tracked() {
        let lines = logical_lines("www IN A 1.1.1.1\n    IN A 1.1.1.2\n").unwrap();
        assert!(!lines[0].leading_blank);
        assert!(lines[1].leading_blank);
    }

    #[test]
    fn quoted_fields_keep_semicolons_and_escapes() {
        let lines = logical_lines(r#"@ TXT "a;b" "say \"hi\"" """#).unwrap();
        let fields = &lines[0].fields;
        assert_eq!(fields[2].text, "a;b");
        assert!(fields[2].quoted);
        assert_eq!(fields[3].text, "say \"hi\"");
        assert_eq!(fields[4].text, "");
    }

    #[test]
    fn unquoted_escapes_are_kept() {
        let lines = logical_lines(r"@ SOA ns1. admin\.dns.example.com. 1 2 3 4 5").unwrap();
        assert_eq!(lines[0].fields[3].text, r"admin\.dns.example.com.");
    }

    #[test]
    fn unbalanced_input_fails() {
        assert!(logical_lines("@ IN SOA ( 1 2\n").is_err());
        assert!(logical_lines("@ IN A 1.2.3.4 )\n").is_err());
        assert!(logical_lines("@ TXT \"open\n").is_err());
    }

    #[test]
    fn non_utf8_octets_name_the_line() {
        let err = logical_lines("@ TXT \"fine\"\nx TXT \"\\200\"\n").unwrap_err();
        assert!(matches!(err, crate::common::Error::ParseError { line: 2, .. }), "{err}");
        assert!(err.to_string().contains(r"octet \200"), "{err}");
    }
}
