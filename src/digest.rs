//! SHA-256 다이제스트

use sha2::{Digest, Sha256};

use crate::DIGEST_SIZE;

/// 바이트 슬라이스의 SHA-256
pub fn sha256(data: &[u8]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 로그용 hex 문자열
pub fn to_hex(digest: &[u8]) -> String {
    hex::encode(digest)
}

/// 로그용 축약 hex (앞 16자)
pub fn short_hex(digest: &[u8]) -> String {
    let mut s = hex::encode(digest);
    s.truncate(16);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            to_hex(&sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(short_hex(&sha256(b"abc")), "ba7816bf8f01cfea");
    }
}
