//! Quoting and splitting of TXT payloads.
//!
//! TXT data is carried as a list of strings through the whole pipeline;
//! quoting only happens at the edges (zone files, the DSL, provider APIs).

use crate::common::{RecordSnafu, Result};

/// Maximum length of a single `<character-string>` on the wire.
pub const MAX_STRING_OCTETS: usize = 255;

/// A whitespace separated field of presentation-format RDATA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub text: String,
    pub quoted: bool,
}

/// Wraps `s` in double quotes, escaping `"` and `\`.
pub fn quote_rfc1035(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders a TXT string list as zone-file RDATA: each element quoted,
/// elements separated by a single space.
pub fn render_txt(strings: &[String]) -> String {
    strings
        .iter()
        .map(|s| quote_rfc1035(s))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wraps `s` in single quotes for the DSL, escaping `'` and `\`.
pub fn quote_dsl(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Renders a TXT string list for the DSL: a single quoted literal, or a
/// bracketed list when there is more than one element.
pub fn render_txt_dsl(strings: &[String]) -> String {
    match strings {
        [single] => quote_dsl(single),
        many => format!(
            "[{}]",
            many.iter().map(|s| quote_dsl(s)).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Splits presentation-format RDATA into fields, honouring double quotes.
/// Backslash escapes (`\"`, `\\`, `\DDD`) are decoded inside quotes only.
pub fn split_fields(text: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            return Ok(fields);
        };
        let quoted = first == '"';
        if quoted {
            chars.next();
        }
        let mut raw = Vec::<u8>::new();
        let mut closed = !quoted;
        while let Some(c) = chars.next() {
            match c {
                '\\' if quoted => unescape_into(&mut chars, &mut raw)?,
                '\\' => {
                    // Unquoted fields keep their escapes, e.g. `\.` in a
                    // SOA mailbox; an escaped blank does not end the field.
                    raw.push(b'\\');
                    if let Some(next) = chars.next() {
                        let mut buf = [0u8; 4];
                        raw.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
                    }
                }
                '"' if quoted => {
                    closed = true;
                    break;
                }
                c if !quoted && c.is_whitespace() => break,
                c => {
                    let mut buf = [0u8; 4];
                    raw.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        if !closed {
            return RecordSnafu {
                message: format!("unterminated quoted string in {text:?}"),
            }
            .fail();
        }
        let text = octets_to_text(raw).map_err(|message| RecordSnafu { message }.build())?;
        fields.push(Field { text, quoted });
    }
}

/// Consumes the character(s) after a backslash and appends the octet they
/// denote.
pub(crate) fn unescape_into(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let Some(c) = chars.next() else {
        return RecordSnafu {
            message: "trailing backslash",
        }
        .fail();
    };
    if c.is_ascii_digit() {
        let mut value = c.to_digit(10).unwrap_or(0);
        for _ in 0..2 {
            match chars.next().and_then(|d| d.to_digit(10)) {
                Some(d) => value = value * 10 + d,
                None => {
                    return RecordSnafu {
                        message: "\\DDD escape needs three digits",
                    }
                    .fail()
                }
            }
        }
        let octet = u8::try_from(value).map_err(|_| {
            RecordSnafu {
                message: format!("\\{value} is out of range"),
            }
            .build()
        })?;
        out.push(octet);
    } else {
        let mut buf = [0u8; 4];
        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }
    Ok(())
}

/// Turns decoded character-string octets into text. Strings are carried
/// as UTF-8 throughout, so octets that do not form UTF-8 (such as a lone
/// `\200`) cannot be represented and are reported by position.
pub(crate) fn octets_to_text(raw: Vec<u8>) -> std::result::Result<String, String> {
    String::from_utf8(raw).map_err(|err| {
        let at = err.utf8_error().valid_up_to();
        let octet = err.as_bytes().get(at).copied().unwrap_or_default();
        format!(
            "octet \\{octet:03} at offset {at} is not valid UTF-8; only UTF-8 character strings are supported"
        )
    })
}

/// Parses TXT RDATA (`"a" "b"` or a bare word) into its string list.
pub fn parse_txt(text: &str) -> Result<Vec<String>> {
    Ok(split_fields(text)?.into_iter().map(|f| f.text).collect())
}

/// Splits `s` into chunks of at most `max` octets without breaking a
/// UTF-8 sequence. An empty input yields a single empty chunk.
pub fn split_octets(s: &str, max: usize) -> Vec<String> {
    if s.len() <= max || max == 0 {
        return vec![s.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if current.len() + c.len_utf8() > max {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
