use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::value::Value;
use crate::{bplist, bplist_write, json, xml};

/// On-disk encoding of a settings document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    BinaryPlist,
    XmlPlist,
    Json,
}

impl Format {
    /// Detect the format from file content.
    pub fn sniff(data: &[u8]) -> Result<Format> {
        if data.starts_with(bplist::MAGIC) {
            return Ok(Format::BinaryPlist);
        }
        if xml::looks_like_xml(data) {
            return Ok(Format::XmlPlist);
        }
        match data.iter().copied().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{' | b'[') => Ok(Format::Json),
            Some(_) => Err(Error::format_at("unrecognised document format", 0)),
            None => Err(Error::format("empty document")),
        }
    }

    /// Format to use for a resource that does not exist yet.
    pub fn for_name(name: &str) -> Format {
        let ext = Path::new(name)
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Format::Json,
            Some("xml") => Format::XmlPlist,
            _ => Format::BinaryPlist,
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<Value> {
        match self {
            Format::BinaryPlist => bplist::decode(data),
            Format::XmlPlist => xml::decode(data),
            Format::Json => json::decode(data),
        }
    }

    /// Fails only for trees the format cannot represent (null in XML).
    pub fn encode(self, v: &Value) -> Result<Vec<u8>> {
        match self {
            Format::BinaryPlist => Ok(bplist_write::encode(v)),
            Format::XmlPlist => xml::encode(v),
            Format::Json => Ok(json::encode(v)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::BinaryPlist => "plist",
            Format::XmlPlist => "xml",
            Format::Json => "json",
        })
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plist" | "bplist" | "binary" => Ok(Format::BinaryPlist),
            "xml" => Ok(Format::XmlPlist),
            "json" => Ok(Format::Json),
            other => Err(Error::Usage(format!(
                "unknown format '{other}' (expected plist, xml or json)"
            ))),
        }
    }
}

/// Decode with sniffing: returns the detected format alongside the tree.
pub fn decode_any(data: &[u8]) -> Result<(Format, Value)> {
    let format = Format::sniff(data)?;
    Ok((format, format.decode(data)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_by_content() {
        let plist = bplist_write::encode(&Value::empty_table());
        assert_eq!(Format::sniff(&plist).unwrap(), Format::BinaryPlist);
        assert_eq!(Format::sniff(b"  \n{}").unwrap(), Format::Json);
        assert_eq!(Format::sniff(b"[1]").unwrap(), Format::Json);
        assert_eq!(Format::sniff(b"\n<?xml version=\"1.0\"?>").unwrap(), Format::XmlPlist);
        assert_eq!(Format::sniff(b"<plist><true/></plist>").unwrap(), Format::XmlPlist);
        assert!(Format::sniff(b"hello").is_err());
        assert!(Format::sniff(b"   ").is_err());
    }

    #[test]
    fn new_files_pick_format_by_extension() {
        assert_eq!(Format::for_name("/tmp/settings.JSON"), Format::Json);
        assert_eq!(Format::for_name("com.example.app.plist"), Format::BinaryPlist);
        assert_eq!(Format::for_name("noext"), Format::BinaryPlist);
        assert_eq!(Format::for_name("exported.xml"), Format::XmlPlist);
    }

    #[test]
    fn decode_any_reports_format() {
        let (f, v) = decode_any(br#"{"a": 1}"#).unwrap();
        assert_eq!(f, Format::Json);
        assert_eq!(v, Value::from_iter([("a", 1)]));
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("xml".parse::<Format>().unwrap(), Format::XmlPlist);
        assert!("yaml".parse::<Format>().is_err());
    }
}
