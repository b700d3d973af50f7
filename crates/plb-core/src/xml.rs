// XML property list (Apple plist 1.0 DTD) reader and writer.
//
// Only the plist vocabulary is understood: dict/key, array, string, integer,
// real, true, false, date and data. Processing instructions, comments and
// the DOCTYPE are skipped; attributes are ignored.
use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::value::{Table, Value};

pub const HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
    "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
);
const BOM: &[u8] = b"\xEF\xBB\xBF";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const MAX_DEPTH: usize = 512;
const DATA_LINE: usize = 76;

/// True when the first non-whitespace byte opens markup.
pub fn looks_like_xml(data: &[u8]) -> bool {
    let data = data.strip_prefix(BOM).unwrap_or(data);
    data.iter().copied().find(|b| !b.is_ascii_whitespace()) == Some(b'<')
}

pub fn decode(data: &[u8]) -> Result<Value> {
    let data = data.strip_prefix(BOM).unwrap_or(data);
    let src = std::str::from_utf8(data)
        .map_err(|e| Error::format_at("XML property list is not UTF-8", e.valid_up_to()))?;
    let mut r = Reader { src, pos: 0 };
    let root = match r.tag()? {
        Some((_, Token::Open { name: "plist", empty: false })) => {
            let v = r.child(0)?;
            match r.tag()? {
                Some((_, Token::Close("plist"))) => v,
                Some((at, _)) => return Err(Error::format_at("expected </plist>", at)),
                None => return Err(eof("plist")),
            }
        }
        // bare value without the <plist> wrapper
        Some((at, Token::Open { name, empty })) => r.value(at, name, empty, 0)?,
        Some((at, _)) => return Err(Error::format_at("expected a <plist> element", at)),
        None => return Err(Error::format("empty document")),
    };
    if let Some((at, _)) = r.tag()? {
        return Err(Error::format_at("trailing content after the document", at));
    }
    Ok(root)
}

/// Encode as a tab-indented XML property list. `Null` has no XML form.
pub fn encode(root: &Value) -> Result<Vec<u8>> {
    let mut out = String::from(HEADER);
    out.push_str("<plist version=\"1.0\">\n");
    write_value(&mut out, root, 0)?;
    out.push_str("</plist>\n");
    Ok(out.into_bytes())
}

#[derive(Debug)]
enum Token<'a> {
    Open { name: &'a str, empty: bool },
    Close(&'a str),
    Text(String),
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    // Next token with its byte offset; markup that carries no data is skipped.
    fn token(&mut self) -> Result<Option<(usize, Token<'a>)>> {
        loop {
            let src: &'a str = self.src;
            let start = self.pos;
            let rest = &src[start..];
            if rest.is_empty() {
                return Ok(None);
            }
            if let Some(body) = rest.strip_prefix("<![CDATA[") {
                let end = body
                    .find("]]>")
                    .ok_or_else(|| Error::format_at("unterminated CDATA section", start))?;
                self.pos = start + "<![CDATA[".len() + end + "]]>".len();
                return Ok(Some((start, Token::Text(body[..end].to_string()))));
            }
            if rest.starts_with("<?") {
                self.skip_past(start, "?>")?;
                continue;
            }
            if rest.starts_with("<!--") {
                self.skip_past(start, "-->")?;
                continue;
            }
            if rest.starts_with("<!") {
                self.skip_past(start, ">")?;
                continue;
            }
            if rest.starts_with('<') {
                let end = rest
                    .find('>')
                    .ok_or_else(|| Error::format_at("unterminated tag", start))?;
                let inner = &rest[1..end];
                self.pos = start + end + 1;
                if let Some(name) = inner.strip_prefix('/') {
                    return Ok(Some((start, Token::Close(name.trim()))));
                }
                let empty = inner.ends_with('/');
                let inner = inner.strip_suffix('/').unwrap_or(inner);
                let name = inner.split_ascii_whitespace().next().unwrap_or("");
                if name.is_empty() {
                    return Err(Error::format_at("tag without a name", start));
                }
                return Ok(Some((start, Token::Open { name, empty })));
            }
            let end = rest.find('<').unwrap_or(rest.len());
            self.pos = start + end;
            return Ok(Some((start, Token::Text(unescape(&rest[..end], start)?))));
        }
    }

    fn skip_past(&mut self, start: usize, terminator: &str) -> Result<()> {
        let end = self.src[start..]
            .find(terminator)
            .ok_or_else(|| Error::format_at("unterminated markup", start))?;
        self.pos = start + end + terminator.len();
        Ok(())
    }

    // Next tag, skipping whitespace between elements.
    fn tag(&mut self) -> Result<Option<(usize, Token<'a>)>> {
        while let Some((at, tok)) = self.token()? {
            match tok {
                Token::Text(t) if t.trim().is_empty() => continue,
                Token::Text(_) => {
                    return Err(Error::format_at("unexpected text between elements", at));
                }
                tok => return Ok(Some((at, tok))),
            }
        }
        Ok(None)
    }

    // Character content up to the matching close tag.
    fn text(&mut self, name: &str, empty: bool) -> Result<String> {
        let mut out = String::new();
        if empty {
            return Ok(out);
        }
        loop {
            match self.token()? {
                Some((_, Token::Text(t))) => out.push_str(&t),
                Some((_, Token::Close(n))) if n == name => return Ok(out),
                Some((at, _)) => return Err(Error::format_at(format!("expected </{name}>"), at)),
                None => return Err(eof(name)),
            }
        }
    }

    fn child(&mut self, depth: usize) -> Result<Value> {
        match self.tag()? {
            Some((at, Token::Open { name, empty })) => self.value(at, name, empty, depth + 1),
            Some((at, _)) => Err(Error::format_at("expected a value element", at)),
            None => Err(Error::format("unexpected end of document")),
        }
    }

    fn value(&mut self, at: usize, name: &'a str, empty: bool, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(Error::format_at("document nested too deeply", at));
        }
        let v = match name {
            "dict" => Value::Table(self.dict(empty, depth)?),
            "array" => Value::Array(self.array(empty, depth)?),
            "string" => Value::Text(self.text(name, empty)?),
            "true" | "false" => {
                if !self.text(name, empty)?.trim().is_empty() {
                    return Err(Error::format_at(format!("<{name}> must be empty"), at));
                }
                Value::Bool(name == "true")
            }
            "integer" => {
                let raw = self.text(name, empty)?;
                let n = parse_int(raw.trim()).ok_or_else(|| {
                    Error::format_at(format!("invalid integer '{}'", raw.trim()), at)
                })?;
                Value::Integer(n)
            }
            "real" => {
                let raw = self.text(name, empty)?;
                let x = raw.trim().parse::<f64>().map_err(|_| {
                    Error::format_at(format!("invalid real '{}'", raw.trim()), at)
                })?;
                Value::Float(x)
            }
            "date" => {
                let raw = self.text(name, empty)?;
                let d = NaiveDateTime::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
                    Error::format_at(format!("invalid date '{}'", raw.trim()), at)
                })?;
                Value::Date(d.and_utc())
            }
            "data" => {
                let raw = self.text(name, empty)?;
                let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                let bytes = STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| Error::format_at(format!("invalid base64 in <data>: {e}"), at))?;
                Value::Bytes(bytes)
            }
            other => {
                return Err(Error::format_at(format!("unsupported element <{other}>"), at));
            }
        };
        Ok(v)
    }

    fn dict(&mut self, empty: bool, depth: usize) -> Result<Table> {
        let mut table = Table::new();
        if empty {
            return Ok(table);
        }
        loop {
            let key = match self.tag()? {
                Some((_, Token::Close("dict"))) => return Ok(table),
                Some((_, Token::Open { name: "key", empty })) => self.text("key", empty)?,
                Some((at, _)) => return Err(Error::format_at("expected <key> in <dict>", at)),
                None => return Err(eof("dict")),
            };
            let value = self.child(depth)?;
            table.insert(key, value);
        }
    }

    fn array(&mut self, empty: bool, depth: usize) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        if empty {
            return Ok(items);
        }
        loop {
            match self.tag()? {
                Some((_, Token::Close("array"))) => return Ok(items),
                Some((at, Token::Open { name, empty })) => {
                    items.push(self.value(at, name, empty, depth + 1)?);
                }
                Some((at, _)) => return Err(Error::format_at("expected a value in <array>", at)),
                None => return Err(eof("array")),
            }
        }
    }
}

fn eof(inside: &str) -> Error {
    Error::format(format!("unexpected end of document inside <{inside}>"))
}

// Decimal or 0x-prefixed hex, optionally signed.
fn parse_int(raw: &str) -> Option<i64> {
    let (neg, digits) = match raw.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    i64::try_from(if neg { -magnitude } else { magnitude }).ok()
}

fn unescape(raw: &str, at: usize) -> Result<String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| Error::format_at("unterminated entity reference", at))?;
        let entity = &after[..semi];
        let ch = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => entity
                .strip_prefix('#')
                .and_then(|num| match num.strip_prefix(['x', 'X']) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => num.parse().ok(),
                })
                .and_then(char::from_u32)
                .ok_or_else(|| Error::format_at(format!("unknown entity &{entity};"), at))?,
        };
        out.push(ch);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    out.extend(std::iter::repeat_n('\t', depth));
}

fn write_value(out: &mut String, v: &Value, depth: usize) -> Result<()> {
    indent(out, depth);
    match v {
        Value::Null => {
            return Err(Error::Usage(
                "XML property lists cannot hold null; save as binary plist or JSON".into(),
            ));
        }
        Value::Bool(true) => out.push_str("<true/>"),
        Value::Bool(false) => out.push_str("<false/>"),
        Value::Integer(n) => {
            let _ = write!(out, "<integer>{n}</integer>");
        }
        Value::Float(x) => {
            let _ = write!(out, "<real>{x:?}</real>");
        }
        Value::Text(s) => {
            out.push_str("<string>");
            escape_into(out, s);
            out.push_str("</string>");
        }
        // sub-second precision is not representable
        Value::Date(d) => {
            let _ = write!(out, "<date>{}</date>", d.format(DATE_FORMAT));
        }
        Value::Bytes(b) if b.is_empty() => out.push_str("<data></data>"),
        Value::Bytes(b) => {
            out.push_str("<data>\n");
            let encoded = STANDARD.encode(b);
            for line in encoded.as_bytes().chunks(DATA_LINE) {
                indent(out, depth);
                out.push_str(&String::from_utf8_lossy(line));
                out.push('\n');
            }
            indent(out, depth);
            out.push_str("</data>");
        }
        Value::Array(items) if items.is_empty() => out.push_str("<array/>"),
        Value::Array(items) => {
            out.push_str("<array>\n");
            for item in items {
                write_value(out, item, depth + 1)?;
            }
            indent(out, depth);
            out.push_str("</array>");
        }
        Value::Table(t) if t.is_empty() => out.push_str("<dict/>"),
        Value::Table(t) => {
            out.push_str("<dict>\n");
            for (k, item) in t {
                indent(out, depth + 1);
                out.push_str("<key>");
                escape_into(out, k);
                out.push_str("</key>\n");
                write_value(out, item, depth + 1)?;
            }
            indent(out, depth);
            out.push_str("</dict>");
        }
    }
    out.push('\n');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    // Shaped like the output of Python's plistlib.dump.
    const PLISTLIB_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>server</key>
	<dict>
		<key>port</key>
		<integer>8080</integer>
		<key>hosts</key>
		<array>
			<string>a &amp; b</string>
			<string></string>
		</array>
	</dict>
	<key>ratio</key>
	<real>0.5</real>
	<key>enabled</key>
	<true/>
	<key>seen</key>
	<date>2001-01-01T00:00:00Z</date>
	<key>blob</key>
	<data>
	3q2+7w==
	</data>
</dict>
</plist>
"#;

    #[test]
    fn decodes_plistlib_output() {
        let v = decode(PLISTLIB_SAMPLE.as_bytes()).unwrap();
        let t = v.as_table().unwrap();
        let server = t["server"].as_table().unwrap();
        assert_eq!(server["port"], Value::Integer(8080));
        assert_eq!(
            server["hosts"],
            Value::Array(vec![Value::from("a & b"), Value::from("")])
        );
        assert_eq!(t["ratio"], Value::Float(0.5));
        assert_eq!(t["enabled"], Value::Bool(true));
        assert_eq!(
            t["seen"],
            Value::Date(DateTime::from_timestamp(978_307_200, 0).unwrap())
        );
        assert_eq!(t["blob"], Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
        let keys: Vec<&String> = t.keys().collect();
        assert_eq!(keys, ["server", "ratio", "enabled", "seen", "blob"]);
    }

    #[test]
    fn encode_then_decode_keeps_the_tree() {
        let v = decode(PLISTLIB_SAMPLE.as_bytes()).unwrap();
        let bytes = encode(&v).unwrap();
        assert!(bytes.starts_with(b"<?xml"));
        assert_eq!(decode(&bytes).unwrap(), v);
    }

    #[test]
    fn writes_plistlib_layout() {
        let v: Value = [("a", Value::from(1)), ("b", Value::Array(Vec::new()))]
            .into_iter()
            .collect();
        let text = String::from_utf8(encode(&v).unwrap()).unwrap();
        let body = text.strip_prefix(HEADER).unwrap();
        assert_eq!(
            body,
            "<plist version=\"1.0\">\n<dict>\n\t<key>a</key>\n\t<integer>1</integer>\n\t<key>b</key>\n\t<array/>\n</dict>\n</plist>\n"
        );
    }

    #[test]
    fn null_cannot_be_written() {
        let v: Value = [("a", Value::Null)].into_iter().collect();
        assert!(matches!(encode(&v), Err(Error::Usage(_))));
    }

    #[test]
    fn integers_hex_and_range() {
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("-12"), Some(-12));
        assert_eq!(parse_int("--12"), None);
        assert_eq!(parse_int("18446744073709551615"), None);
    }

    #[test]
    fn entities_and_cdata() {
        let v = decode(b"<plist><string>&lt;&#65;&#x42;<![CDATA[<&>]]></string></plist>").unwrap();
        assert_eq!(v, Value::from("<AB<&>"));
        assert!(decode(b"<plist><string>&bogus;</string></plist>").is_err());
    }

    #[test]
    fn rejects_malformed_markup() {
        let cases: [&[u8]; 6] = [
            b"<plist><dict><string>x</string></dict></plist>",
            b"<plist><integer>abc</integer></plist>",
            b"<plist><array><string>x</array></plist>",
            b"<plist><dict><key>a</key>",
            b"<plist><set/></plist>",
            b"<plist><true/></plist><true/>",
        ];
        for bad in cases {
            assert!(
                matches!(decode(bad), Err(Error::Format { .. })),
                "{}",
                String::from_utf8_lossy(bad)
            );
        }
    }
}
