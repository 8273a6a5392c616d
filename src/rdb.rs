//! The fixed empty database snapshot shipped during full resynchronisation.

use std::sync::OnceLock;

use base64::prelude::*;
use bytes::Bytes;

const EMPTY_RDB_BASE64: &str = "UkVESVMwMDEx+glyZWRpcy12ZXIFNy4yLjD6CnJlZGlzLWJpdHPAQPoFY3RpbWXCbQi8ZfoIdXNlZC1tZW3CsMQQAPoIYW9mLWJhc2XAAP/wbjv+wP9aog==";

/// The snapshot bytes a primary emits after `+FULLRESYNC`, framed as a bulk
/// string without the trailing CRLF.
pub fn empty_rdb() -> Bytes {
    static SNAPSHOT: OnceLock<Bytes> = OnceLock::new();

    SNAPSHOT
        .get_or_init(|| {
            Bytes::from(
                BASE64_STANDARD
                    .decode(EMPTY_RDB_BASE64)
                    .expect("embedded snapshot is valid base64"),
            )
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::empty_rdb;

    #[test]
    fn test_empty_rdb_is_the_fixed_snapshot() {
        let snapshot = empty_rdb();

        assert_eq!(snapshot.len(), 88);
        assert!(snapshot.starts_with(b"REDIS0011"));
    }
}
