//! Decoding and tokenizing of uploaded CSV exports.

use crate::error::BillError;
use crate::types::FileRole;
use std::io::Read;

/// Decoded text of one uploaded export.
#[derive(Debug, Clone)]
pub struct RawExport {
    /// Decoded file contents.
    pub text: String,
    /// Which export this is.
    pub role: FileRole,
}

impl RawExport {
    /// Reads an export from an arbitrary `Read`.
    pub fn from_reader<R: Read>(mut reader: R, role: FileRole) -> Result<Self, BillError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, role)
    }

    /// Decodes raw bytes, trying UTF-8 first and falling back to Latin-1.
    /// Empty files are rejected here.
    pub fn from_bytes(bytes: &[u8], role: FileRole) -> Result<Self, BillError> {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
        };
        if text.trim().is_empty() {
            return Err(BillError::EmptyInput { role });
        }
        Ok(Self { text, role })
    }

    /// Wraps an already-decoded string.
    #[inline]
    pub fn from_text(s: &str, role: FileRole) -> Result<Self, BillError> {
        Self::from_bytes(s.as_bytes(), role)
    }
}

/// Tokenized CSV export with its header row split out.
#[derive(Debug, Clone)]
pub struct TableExport {
    pub(crate) role: FileRole,
    pub(crate) headers: Vec<String>,
    pub(crate) records: Vec<csv::StringRecord>,
}

impl TableExport {
    /// Tokenizes the decoded CSV text.
    pub fn parse(raw: &RawExport) -> Result<Self, BillError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(raw.text.as_bytes());
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            role: raw.role,
            headers,
            records,
        })
    }

    /// Header names as they appear in the file.
    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Which export this table came from.
    #[inline]
    pub const fn role(&self) -> FileRole {
        self.role
    }
}
