//! Content hashing for the blueprint object store.
//!
//! Blueprint commits are addressed the way git addresses loose objects: the
//! hash is computed over a type tag, the payload length, and the payload
//! bytes, so that two different object kinds never collide even if their
//! raw payloads happen to match.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Digest;

/// A content hash identifying one commit object in the blueprint store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ObjectHash([u8; 20]);

impl ObjectHash {
    /// Hash `data` under the given object `kind` tag, git-object style:
    /// `"<kind> <len>\0<data>"`.
    pub fn of(kind: &str, data: &[u8]) -> ObjectHash {
        let mut buf = Vec::with_capacity(data.len() + kind.len() + 16);
        buf.extend_from_slice(kind.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(data.len().to_string().as_bytes());
        buf.push(0);
        buf.extend_from_slice(data);

        let digest = sha1::Sha1::digest(&buf);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        ObjectHash(bytes)
    }

    /// The two-hex-char directory prefix used for on-disk sharding.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// The remaining hex digits after the shard prefix.
    pub fn rest(&self) -> String {
        hex::encode(&self.0[1..])
    }
}

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHash({self})")
    }
}

impl FromStr for ObjectHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 {
            return Err(format!("invalid hash length: {}", s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let mut h = [0u8; 20];
        h.copy_from_slice(&bytes);
        Ok(ObjectHash(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_payload_different_kind_differs() {
        let a = ObjectHash::of("commit", b"hello");
        let b = ObjectHash::of("tag", b"hello");
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_hex() {
        let h = ObjectHash::of("commit", b"blueprint contents");
        let parsed: ObjectHash = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn shard_and_rest_reassemble() {
        let h = ObjectHash::of("commit", b"x");
        let full = format!("{}{}", h.shard(), h.rest());
        assert_eq!(full, h.to_string());
    }
}
