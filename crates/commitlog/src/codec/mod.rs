//! Entry codec abstraction.
//!
//! The reader pipeline only talks to [`EntryCodec`]; [`MsgpackCodec`] is the
//! implementation commit logs are written with.

mod msgpack;
mod traits;

pub use msgpack::{
    MsgpackCodec, LOG_ENTRY_FORMAT_VERSION, LOG_INFO_FORMAT_VERSION, LOG_METADATA_FORMAT_VERSION,
};
pub use traits::{
    CodecError, DecodeRemainingToken, EntryCodec, EntryHead, LogEntry, LogInfo, LogMetadata,
};

use std::sync::Arc;

/// Look up a codec by identifier.
pub fn get_codec(codec_id: &str) -> Result<Arc<dyn EntryCodec>, CodecError> {
    match codec_id {
        "msgpack" => Ok(Arc::new(MsgpackCodec::new())),
        other => Err(CodecError::decode("codec id", format!("unknown codec: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_codec() {
        assert_eq!(get_codec("msgpack").unwrap().codec_id(), "msgpack");
        assert!(get_codec("zstd").is_err());
    }
}
