use std::io;

/// Errors surfaced by loading, editing and saving a settings document.
///
/// Missing keys and merge type mismatches are not errors; they are reported
/// as `None` / "no change" by the editing functions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing content could not be decoded.
    #[error("malformed document: {message}{}", offset_suffix(.offset))]
    Format {
        message: String,
        offset: Option<usize>,
    },

    /// The backing resource could not be read or written.
    #[error("{} -- {resource}", describe_io(.source))]
    Io {
        resource: String,
        #[source]
        source: io::Error,
    },

    /// An intermediate path segment exists but is not a table.
    #[error("cannot descend into '{segment}' while setting '{path}': value is not a table")]
    StructuralConflict { path: String, segment: String },

    /// Caller supplied parameters that do not make sense together.
    #[error("{0}")]
    Usage(String),

    /// Writing a zip backup failed.
    #[error("backup failed: {0}")]
    Backup(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            offset: None,
        }
    }

    pub fn format_at(message: impl Into<String>, offset: usize) -> Self {
        Self::Format {
            message: message.into(),
            offset: Some(offset),
        }
    }

    pub fn io(resource: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            resource: resource.into(),
            source,
        }
    }

    /// OS error number of an `Io` error, if the OS reported one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

fn offset_suffix(offset: &Option<usize>) -> String {
    offset.map(|o| format!(" at {o:#x}")).unwrap_or_default()
}

// "No such file or directory [2]" instead of std's "... (os error 2)".
fn describe_io(err: &io::Error) -> String {
    let text = err.to_string();
    match err.raw_os_error() {
        Some(code) => {
            let suffix = format!(" (os error {code})");
            let base = text.strip_suffix(&suffix).unwrap_or(&text);
            format!("{base} [{code}]")
        }
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_code_and_resource() {
        let err = Error::io("prefs.plist", io::Error::from_raw_os_error(13));
        let s = err.to_string();
        assert!(s.ends_with("[13] -- prefs.plist"), "{s}");
        assert!(!s.contains("os error"));
        assert_eq!(err.os_code(), Some(13));
    }

    #[test]
    fn io_error_without_os_code() {
        let err = Error::io("mem", io::Error::other("boom"));
        assert_eq!(err.to_string(), "boom -- mem");
        assert_eq!(err.os_code(), None);
    }

    #[test]
    fn format_error_offset() {
        assert_eq!(
            Error::format_at("bad marker", 0x20).to_string(),
            "malformed document: bad marker at 0x20"
        );
        assert_eq!(Error::format("eof").to_string(), "malformed document: eof");
    }
}
