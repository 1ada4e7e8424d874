use crate::foundation::SkusError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn decode_base64(s: &str) -> Result<Vec<u8>, SkusError> {
    STANDARD.decode(s.trim()).map_err(|e| e.into())
}

pub fn encode_base64(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}
