//! Binary container for compiled tables.
//!
//! ```text
//! 0..4    magic  b"KELP"
//! 4..8    ABI version, u32 little-endian
//! 8..12   payload length, u32 little-endian
//! 12..    JSON-encoded LanguageTables
//! ```
//!
//! The version is checked before the payload is touched, so a blob from an
//! incompatible generator is rejected even if its payload would not parse.

use crate::error::LoadError;
use crate::language::LanguageTables;

pub const BLOB_MAGIC: &[u8; 4] = b"KELP";
const HEADER_LEN: usize = 12;

/// ABI version written by this crate's generator.
pub const LANGUAGE_VERSION: u32 = 14;
/// Oldest ABI version this runtime accepts.
pub const MIN_COMPATIBLE_LANGUAGE_VERSION: u32 = 13;

/// Serialize `tables` under the given ABI version.
///
/// # Errors
///
/// Returns an error if the tables cannot be encoded as JSON.
pub fn encode(tables: &LanguageTables, version: u32) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(tables)?;
    let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
    blob.extend_from_slice(BLOB_MAGIC);
    blob.extend_from_slice(&version.to_le_bytes());
    blob.extend_from_slice(&u32::try_from(payload.len()).unwrap_or(u32::MAX).to_le_bytes());
    blob.extend_from_slice(&payload);
    Ok(blob)
}

/// Read the ABI version from a blob header without decoding the payload.
///
/// # Errors
///
/// Fails on a short blob or a wrong magic number.
pub fn peek_version(blob: &[u8]) -> Result<u32, LoadError> {
    if blob.len() < HEADER_LEN {
        return Err(LoadError::corrupt(format!(
            "blob is {} bytes, shorter than its header",
            blob.len()
        )));
    }
    if &blob[0..4] != BLOB_MAGIC {
        return Err(LoadError::corrupt("bad magic number"));
    }
    Ok(read_u32(blob, 4))
}

/// Decode and validate a blob.
///
/// # Errors
///
/// - [`LoadError::IncompatibleVersion`] when the header version is outside
///   the supported range
/// - [`LoadError::CorruptBlob`] for a bad header, a truncated or malformed
///   payload, or tables with out-of-range indices
pub fn decode(blob: &[u8]) -> Result<(u32, LanguageTables), LoadError> {
    let version = peek_version(blob)?;
    if !(MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&version) {
        log::warn!("rejecting language blob with ABI version {version}");
        return Err(LoadError::IncompatibleVersion {
            found: version,
            min: MIN_COMPATIBLE_LANGUAGE_VERSION,
            max: LANGUAGE_VERSION,
        });
    }

    let declared = read_u32(blob, 8) as usize;
    let payload = &blob[HEADER_LEN..];
    if payload.len() != declared {
        return Err(LoadError::corrupt(format!(
            "payload is {} bytes, header declares {declared}",
            payload.len()
        )));
    }

    let tables: LanguageTables = serde_json::from_slice(payload)
        .map_err(|error| LoadError::corrupt(format!("malformed payload: {error}")))?;
    tables.validate().map_err(LoadError::corrupt)?;
    Ok((version, tables))
}

fn read_u32(blob: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&blob[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{LexModeTable, ParseStateRow, Symbol, SymbolInfo};

    fn tiny_tables() -> LanguageTables {
        let info = |name: &str, terminal: bool| SymbolInfo {
            name: name.into(),
            terminal,
            named: true,
            visible: true,
            extra: false,
        };
        LanguageTables {
            name: "tiny".into(),
            symbols: vec![info("end", true), info("ERROR", true), info("doc", false)],
            productions: vec![],
            states: vec![ParseStateRow::default()],
            lex_modes: vec![LexModeTable::default()],
            tokens: vec![],
            extras: vec![],
            word_token: None,
            external_tokens: vec![],
            start_symbol: Symbol(2),
        }
    }

    #[test]
    fn test_decode_roundtrip_header() {
        let blob = encode(&tiny_tables(), LANGUAGE_VERSION).unwrap();
        assert_eq!(&blob[0..4], BLOB_MAGIC);
        assert_eq!(peek_version(&blob).unwrap(), LANGUAGE_VERSION);
        let (version, tables) = decode(&blob).unwrap();
        assert_eq!(version, LANGUAGE_VERSION);
        assert_eq!(tables.name, "tiny");
    }

    #[test]
    fn test_version_checked_before_payload() {
        let mut blob = encode(&tiny_tables(), 99).unwrap();
        blob.truncate(HEADER_LEN + 1);
        assert_eq!(
            decode(&blob).unwrap_err(),
            LoadError::IncompatibleVersion {
                found: 99,
                min: MIN_COMPATIBLE_LANGUAGE_VERSION,
                max: LANGUAGE_VERSION,
            }
        );
    }

    #[test]
    fn test_corrupt_blobs() {
        assert!(matches!(decode(b"KEL"), Err(LoadError::CorruptBlob { .. })));
        assert!(matches!(
            decode(b"NOPE\x0e\0\0\0\0\0\0\0"),
            Err(LoadError::CorruptBlob { .. })
        ));

        let mut truncated = encode(&tiny_tables(), LANGUAGE_VERSION).unwrap();
        truncated.pop();
        assert!(matches!(decode(&truncated), Err(LoadError::CorruptBlob { .. })));

        let mut tables = tiny_tables();
        tables.states[0].lex_mode = 5;
        let blob = encode(&tables, LANGUAGE_VERSION).unwrap();
        assert!(matches!(decode(&blob), Err(LoadError::CorruptBlob { .. })));
    }
}
