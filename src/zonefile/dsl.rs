//! Reads the configuration DSL: the JavaScript flavoured `D(...)`
//! declarations that `get-zones --format dsl` writes.
//!
//! Only a small subset of JavaScript is understood. A file is a sequence
//! of statements, each either a `var`/`let`/`const` declaration or a call
//! of a built-in function. Expressions are string and integer literals,
//! arrays, object literals, variables and built-in calls. Comments use
//! `//` and `/* */`.

use std::collections::BTreeMap;
use std::path::Path;

use snafu::ResultExt;

use crate::common::{Error, IoSnafu, ParseSnafu, Result};
use crate::models::txt::Field;
use crate::models::{AutoDnssec, DomainConfig, Nameserver, RecordConfig, RecordType, DEFAULT_TTL};
use crate::providers::cloudflare::{META_PROXY, META_PROXY_DEFAULT};

use super::parser::parse_ttl;

/// A human-readable position (line and column) in DSL text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Position {
    line: usize,
    column: usize,
}

fn error_at(position: Position, message: impl Into<String>) -> Error {
    ParseSnafu {
        line: position.line,
        message: format!("column {}: {}", position.column, message.into()),
    }
    .build()
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(i64),
    Punct(char),
}

struct Lexer<'t> {
    chars: std::iter::Peekable<std::str::Chars<'t>>,
    position: Position,
}

impl<'t> Lexer<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            chars: text.chars().peekable(),
            position: Position { line: 1, column: 1 },
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.position.line += 1;
            self.position.column = 1;
        } else {
            self.position.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('/') => {
                            while self.chars.peek().is_some_and(|&c| c != '\n') {
                                self.bump();
                            }
                        }
                        Some('*') => {
                            let start = self.position;
                            self.bump();
                            self.bump();
                            loop {
                                match self.bump() {
                                    None => return Err(error_at(start, "unterminated comment")),
                                    Some('*') if self.chars.peek() == Some(&'/') => {
                                        self.bump();
                                        break;
                                    }
                                    Some(_) => {}
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char, start: Position) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(error_at(start, "unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('u') => {
                        let hex: String = (0..4).filter_map(|_| self.bump()).collect();
                        let c = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| error_at(start, format!("invalid escape \\u{hex}")))?;
                        out.push(c);
                    }
                    Some(c) => out.push(c),
                    None => return Err(error_at(start, "unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self, first: char, start: Position) -> Result<i64> {
        let mut digits = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.bump();
        }
        digits
            .parse()
            .map_err(|_| error_at(start, format!("invalid number {digits:?}")))
    }

    fn next_token(&mut self) -> Result<Option<(Position, Token)>> {
        self.skip_trivia()?;
        let start = self.position;
        let Some(c) = self.bump() else {
            return Ok(None);
        };
        let token = match c {
            '"' | '\'' => Token::Str(self.string(c, start)?),
            '-' | '0'..='9' => Token::Num(self.number(c, start)?),
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::from(c);
                while let Some(&n) = self.chars.peek() {
                    if !(n.is_ascii_alphanumeric() || n == '_' || n == '$') {
                        break;
                    }
                    ident.push(n);
                    self.bump();
                }
                Token::Ident(ident)
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | ';' | '=' => Token::Punct(c),
            other => return Err(error_at(start, format!("unexpected character {other:?}"))),
        };
        Ok(Some((start, token)))
    }
}

fn tokenize(text: &str) -> Result<(Vec<(Position, Token)>, Position)> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok((tokens, lexer.position))
}

#[derive(Clone, Debug)]
enum Modifier {
    DnsProvider { name: String, nameservers: i32 },
    Nameserver(String),
    DefaultTtl(u32),
    Ttl(u32),
    AutoDnssec(AutoDnssec),
    NoPurge,
    CaaCritical,
    Record(Box<PendingRecord>),
}

/// A record function call, turned into a record once the domain it
/// belongs to is known.
#[derive(Clone, Debug)]
struct PendingRecord {
    position: Position,
    rtype: RecordType,
    label: String,
    fields: Vec<Field>,
    modifiers: Vec<Value>,
}

#[derive(Clone, Debug)]
enum Value {
    Undefined,
    Str(String),
    Num(i64),
    List(Vec<Value>),
    Object(BTreeMap<String, String>),
    Modifier(Modifier),
}

impl Value {
    fn describe(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Str(_) => "a string",
            Value::Num(_) => "a number",
            Value::List(_) => "a list",
            Value::Object(_) => "an object",
            Value::Modifier(Modifier::Record(_)) => "a record",
            Value::Modifier(_) => "a modifier",
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Num(_) | Value::List(_))
    }
}

/// Flattens nested lists, so that modifiers can be grouped in variables.
fn flatten(values: impl IntoIterator<Item = Value>, out: &mut Vec<Value>) {
    for value in values {
        match value {
            Value::List(items) => flatten(items, out),
            other => out.push(other),
        }
    }
}

fn text_of(at: Position, what: &str, value: &Value) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        Value::Num(n) => Ok(n.to_string()),
        other => Err(error_at(at, format!("{what} must be a string or number, not {}", other.describe()))),
    }
}

fn string_of(at: Position, what: &str, value: Option<&Value>) -> Result<String> {
    match value {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(error_at(at, format!("{what} must be a string, not {}", other.describe()))),
        None => Err(error_at(at, format!("missing {what}"))),
    }
}

fn ttl_of(at: Position, value: Option<&Value>) -> Result<u32> {
    match value {
        Some(Value::Num(n)) => u32::try_from(*n).map_err(|_| error_at(at, format!("invalid TTL {n}"))),
        Some(Value::Str(s)) => parse_ttl(s).map_err(|message| error_at(at, message)),
        Some(other) => Err(error_at(at, format!("TTL must be a number, not {}", other.describe()))),
        None => Err(error_at(at, "missing TTL")),
    }
}

fn field(text: String, quoted: bool) -> Field {
    Field { text, quoted }
}

/// How many positional arguments follow the label of a record function,
/// as an inclusive range.
fn record_arity(name: &str) -> Option<(usize, usize)> {
    Some(match name {
        "A" | "AAAA" | "ALIAS" | "CNAME" | "DNAME" | "PTR" | "NS" | "LOC" | "DHCID" | "TXT" => (1, 1),
        "MX" | "CAA" => (2, 2),
        "SSHFP" => (3, 3),
        "HTTPS" | "SVCB" => (2, 3),
        "SRV" | "TLSA" | "DS" | "DNSKEY" => (4, 4),
        "NAPTR" | "SOA" => (6, 6),
        _ => return None,
    })
}

fn is_rule_function(name: &str) -> bool {
    matches!(name, "CF_REDIRECT" | "CF_TEMP_REDIRECT" | "CF_WORKER_ROUTE")
}

/// Turns a record function call into its record. Fixed arguments come
/// first; the rest are modifiers.
fn record_call(at: Position, name: &str, args: Vec<Value>) -> Result<Value> {
    let rtype: RecordType = name.parse().map_err(|message: String| error_at(at, message))?;
    let split = args.iter().position(|arg| !arg.is_scalar()).unwrap_or(args.len());
    let mut fixed = args;
    let modifiers = fixed.split_off(split);

    let (label, fields) = if is_rule_function(name) {
        let [pattern, destination] = fixed.as_slice() else {
            return Err(error_at(at, format!("{name} takes a pattern and a destination")));
        };
        let target = format!("{},{}", text_of(at, "pattern", pattern)?, text_of(at, "destination", destination)?);
        ("@".to_string(), vec![field(target, true)])
    } else {
        let Some((min, max)) = record_arity(name) else {
            return Err(error_at(at, format!("unknown function {name}")));
        };
        let Some((label, rest)) = fixed.split_first() else {
            return Err(error_at(at, format!("{name} needs a label")));
        };
        let label = text_of(at, "label", label)?;
        if rest.len() < min || rest.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(error_at(
                at,
                format!("{name} takes {expected} arguments after the label, got {}", rest.len()),
            ));
        }
        (label, record_fields(at, &rtype, rest)?)
    };

    Ok(Value::Modifier(Modifier::Record(Box::new(PendingRecord {
        position: at,
        rtype,
        label,
        fields,
        modifiers,
    }))))
}

fn record_fields(at: Position, rtype: &RecordType, args: &[Value]) -> Result<Vec<Field>> {
    let scalar = |value: &Value| -> Result<Field> {
        Ok(field(text_of(at, "argument", value)?, matches!(value, Value::Str(_))))
    };
    Ok(match rtype {
        RecordType::TXT => {
            let strings = match &args[0] {
                Value::List(items) => items
                    .iter()
                    .map(|item| string_of(at, "TXT string", Some(item)))
                    .collect::<Result<Vec<_>>>()?,
                other => vec![string_of(at, "TXT string", Some(other))?],
            };
            if strings.is_empty() {
                return Err(error_at(at, "TXT needs at least one string"));
            }
            strings.into_iter().map(|s| field(s, true)).collect()
        }
        RecordType::CAA => {
            let mut fields = vec![field("0".to_string(), false)];
            for arg in args {
                fields.push(scalar(arg)?);
            }
            fields
        }
        RecordType::SOA => {
            let mut fields = vec![scalar(&args[0])?, scalar(&args[1])?, field("0".to_string(), false)];
            for arg in &args[2..] {
                fields.push(scalar(arg)?);
            }
            fields
        }
        RecordType::HTTPS | RecordType::SVCB => {
            let mut fields = vec![scalar(&args[0])?, scalar(&args[1])?];
            if let Some(params) = args.get(2) {
                let params = string_of(at, "SvcParams", Some(params))?;
                fields.extend(params.split_whitespace().map(|p| field(p.to_string(), false)));
            }
            fields
        }
        _ => args.iter().map(scalar).collect::<Result<Vec<_>>>()?,
    })
}

fn resolve_record(pending: &PendingRecord, origin: &str, default_ttl: u32) -> Result<RecordConfig> {
    let at = pending.position;
    let mut rc = RecordConfig::new(pending.rtype.clone(), origin);
    rc.set_label(&pending.label, origin)
        .map_err(|err| error_at(at, err.to_string()))?;
    rc.ttl = default_ttl;

    let mut fields = pending.fields.clone();
    let mut modifiers = Vec::new();
    flatten(pending.modifiers.iter().cloned(), &mut modifiers);
    for modifier in modifiers {
        match modifier {
            Value::Modifier(Modifier::Ttl(ttl)) => rc.ttl = ttl,
            Value::Modifier(Modifier::CaaCritical) if rc.rtype == RecordType::CAA => {
                fields[0].text = "128".to_string();
            }
            Value::Object(meta) => rc.metadata.extend(meta),
            Value::Undefined => {}
            other => {
                return Err(error_at(
                    at,
                    format!("{} cannot modify a {} record", other.describe(), pending.rtype),
                ))
            }
        }
    }
    rc.set_target_fields(&fields, origin)
        .map_err(|err| error_at(at, format!("{} {}: {err}", pending.rtype, pending.label)))?;
    Ok(rc)
}

/// Evaluates DSL statements, collecting the domains they declare.
struct Interpreter {
    tokens: Vec<(Position, Token)>,
    index: usize,
    end: Position,
    vars: BTreeMap<String, Value>,
    defaults: Vec<Value>,
    domains: Vec<DomainConfig>,
}

impl Interpreter {
    fn new(text: &str) -> Result<Self> {
        let (tokens, end) = tokenize(text)?;
        Ok(Self {
            tokens,
            index: 0,
            end,
            vars: BTreeMap::new(),
            defaults: Vec::new(),
            domains: Vec::new(),
        })
    }

    fn position(&self) -> Position {
        self.tokens.get(self.index).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(Position, Token)> {
        let token = self
            .tokens
            .get(self.index)
            .cloned()
            .ok_or_else(|| error_at(self.end, "unexpected end of input"))?;
        self.index += 1;
        Ok(token)
    }

    fn eat(&mut self, punct: char) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.index += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, punct: char) -> Result<()> {
        if self.eat(punct) {
            return Ok(());
        }
        let at = self.position();
        match self.peek() {
            Some(token) => Err(error_at(at, format!("expected {punct:?}, found {token:?}"))),
            None => Err(error_at(at, format!("expected {punct:?} before the end of input"))),
        }
    }

    fn run(mut self) -> Result<Vec<DomainConfig>> {
        while self.peek().is_some() {
            self.statement()?;
        }
        Ok(self.domains)
    }

    fn statement(&mut self) -> Result<()> {
        if self.eat(';') {
            return Ok(());
        }
        match self.peek() {
            Some(Token::Ident(kw)) if matches!(kw.as_str(), "var" | "let" | "const") => {
                self.index += 1;
                let (at, token) = self.next()?;
                let Token::Ident(name) = token else {
                    return Err(error_at(at, "expected a variable name"));
                };
                self.expect('=')?;
                let value = self.expression()?;
                self.vars.insert(name, value);
            }
            _ => {
                self.expression()?;
            }
        }
        self.eat(';');
        Ok(())
    }

    fn expression(&mut self) -> Result<Value> {
        let (at, token) = self.next()?;
        match token {
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Num(n) => Ok(Value::Num(n)),
            Token::Punct('[') => Ok(Value::List(self.sequence(']')?)),
            Token::Punct('{') => self.object(),
            Token::Ident(name) if self.eat('(') => {
                let args = self.sequence(')')?;
                self.call(at, &name, args)
            }
            Token::Ident(name) => self.lookup(at, &name),
            Token::Punct(c) => Err(error_at(at, format!("unexpected {c:?}"))),
        }
    }

    /// Comma separated expressions up to `close`. A trailing comma is
    /// allowed.
    fn sequence(&mut self, close: char) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat(',') {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn object(&mut self) -> Result<Value> {
        let mut map = BTreeMap::new();
        loop {
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let (at, token) = self.next()?;
            let key = match token {
                Token::Ident(key) | Token::Str(key) => key,
                other => return Err(error_at(at, format!("expected an object key, found {other:?}"))),
            };
            self.expect(':')?;
            let value = self.expression()?;
            map.insert(key, text_of(at, "object value", &value)?);
            if !self.eat(',') {
                self.expect('}')?;
                return Ok(Value::Object(map));
            }
        }
    }

    fn lookup(&self, at: Position, name: &str) -> Result<Value> {
        if let Some(value) = self.vars.get(name) {
            return Ok(value.clone());
        }
        let meta = |key: &str, value: &str| Value::Object(BTreeMap::from([(key.to_string(), value.to_string())]));
        Ok(match name {
            "AUTODNSSEC_ON" => Value::Modifier(Modifier::AutoDnssec(AutoDnssec::On)),
            "AUTODNSSEC_OFF" => Value::Modifier(Modifier::AutoDnssec(AutoDnssec::Off)),
            "NO_PURGE" => Value::Modifier(Modifier::NoPurge),
            "CAA_CRITICAL" => Value::Modifier(Modifier::CaaCritical),
            "CF_PROXY_ON" => meta(META_PROXY, "on"),
            "CF_PROXY_OFF" => meta(META_PROXY, "off"),
            "CF_PROXY_DEFAULT_ON" => meta(META_PROXY_DEFAULT, "on"),
            "CF_PROXY_DEFAULT_OFF" => meta(META_PROXY_DEFAULT, "off"),
            "undefined" => Value::Undefined,
            _ => return Err(error_at(at, format!("{name} is not defined"))),
        })
    }

    fn call(&mut self, at: Position, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "D" => {
                self.declare(at, args)?;
                Ok(Value::Undefined)
            }
            "D_EXTEND" => {
                self.extend(at, args)?;
                Ok(Value::Undefined)
            }
            "DEFAULTS" => {
                self.defaults.extend(args);
                Ok(Value::Undefined)
            }
            "NewRegistrar" | "NewDnsProvider" => Ok(Value::Str(string_of(at, "provider name", args.first())?)),
            "DnsProvider" => {
                let name = string_of(at, "provider name", args.first())?;
                let nameservers = match args.get(1) {
                    Some(Value::Num(n)) => i32::try_from(*n).map_err(|_| error_at(at, format!("invalid count {n}")))?,
                    Some(other) => {
                        return Err(error_at(at, format!("name server count must be a number, not {}", other.describe())))
                    }
                    None => -1,
                };
                Ok(Value::Modifier(Modifier::DnsProvider { name, nameservers }))
            }
            "NAMESERVER" => Ok(Value::Modifier(Modifier::Nameserver(string_of(at, "name server", args.first())?))),
            "DefaultTTL" => Ok(Value::Modifier(Modifier::DefaultTtl(ttl_of(at, args.first())?))),
            "TTL" => Ok(Value::Modifier(Modifier::Ttl(ttl_of(at, args.first())?))),
            _ => record_call(at, name, args),
        }
    }

    /// `D(name, registrar, modifiers...)`.
    fn declare(&mut self, at: Position, args: Vec<Value>) -> Result<()> {
        let mut args = args.into_iter();
        let name = string_of(at, "domain name", args.next().as_ref())?;
        let registrar = string_of(at, "registrar", args.next().as_ref())?;
        let mut dc = DomainConfig::new(&name);
        dc.registrar = Some(registrar);
        if self.domains.iter().any(|existing| existing.name == dc.name) {
            return Err(error_at(at, format!("{} is declared twice", dc.name)));
        }
        let modifiers = self.defaults.iter().cloned().chain(args);
        let origin = dc.name.clone();
        apply(&mut dc, &origin, modifiers, at)?;
        tracing::debug!(domain = %dc.name, records = dc.records.len(), "Declared domain");
        self.domains.push(dc);
        Ok(())
    }

    /// `D_EXTEND(name, modifiers...)` adds to the declared domain that
    /// contains `name`. Labels are relative to `name`.
    fn extend(&mut self, at: Position, args: Vec<Value>) -> Result<()> {
        let mut args = args.into_iter();
        let name = crate::models::normalize_origin(&string_of(at, "domain name", args.next().as_ref())?);
        let parent = self
            .domains
            .iter_mut()
            .filter(|dc| name == dc.name || name.ends_with(&format!(".{}", dc.name)))
            .max_by_key(|dc| dc.name.len())
            .ok_or_else(|| error_at(at, format!("{name} is not inside any declared domain")))?;

        let before = parent.records.len();
        apply(parent, &name, args, at)?;
        let parent_name = parent.name.clone();
        for rc in parent.records.iter_mut().skip(before) {
            let fqdn = rc.name_fqdn().to_string();
            rc.set_label_from_fqdn(&fqdn, &parent_name)
                .map_err(|err| error_at(at, err.to_string()))?;
        }
        Ok(())
    }
}

/// Applies domain modifiers in order. `DefaultTTL` affects the records
/// that follow it.
fn apply(dc: &mut DomainConfig, origin: &str, modifiers: impl IntoIterator<Item = Value>, at: Position) -> Result<()> {
    let mut flat = Vec::new();
    flatten(modifiers, &mut flat);
    let mut default_ttl = DEFAULT_TTL;
    for modifier in flat {
        match modifier {
            Value::Modifier(Modifier::Record(pending)) => {
                let rc = resolve_record(&pending, origin, default_ttl)?;
                dc.records.push(rc);
            }
            Value::Modifier(Modifier::DnsProvider { name, nameservers }) => {
                dc.dns_providers.insert(name, nameservers);
            }
            Value::Modifier(Modifier::Nameserver(host)) => dc.nameservers.push(Nameserver::new(&host)),
            Value::Modifier(Modifier::DefaultTtl(ttl)) => default_ttl = ttl,
            Value::Modifier(Modifier::AutoDnssec(setting)) => dc.auto_dnssec = setting,
            Value::Modifier(Modifier::NoPurge) => dc.keep_unknown = true,
            Value::Object(meta) => dc.metadata.extend(meta),
            Value::Undefined => {}
            other => return Err(error_at(at, format!("{} cannot modify a domain", other.describe()))),
        }
    }
    Ok(())
}

/// Parses DSL text into the domains it declares, in declaration order.
pub fn parse_dsl(text: &str) -> Result<Vec<DomainConfig>> {
    Interpreter::new(text)?.run()
}

pub fn parse_dsl_file(path: &Path) -> Result<Vec<DomainConfig>> {
    let text = std::fs::read_to_string(path).context(IoSnafu { path })?;
    parse_dsl(&text)
}
