//! Unified digest interface over CRC32, Adler32, MD5 and the SHA family.

use adler32::RollingAdler32;
use digest::{Digest, DynDigest};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use std::io::{self, Read};
use std::str::FromStr;

use crate::errors::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Crc32,
    Adler32,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for Algorithm {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crc32" => Ok(Algorithm::Crc32),
            "adler32" => Ok(Algorithm::Adler32),
            "md5" => Ok(Algorithm::Md5),
            "sha1" => Ok(Algorithm::Sha1),
            "sha224" => Ok(Algorithm::Sha224),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(ScanError::NotImplemented(format!(
                "checksum algorithm {}",
                other
            ))),
        }
    }
}

pub struct Hasher(Inner);

enum Inner {
    Crc32(crc32fast::Hasher),
    Adler32(RollingAdler32),
    Digest(Box<dyn DynDigest>),
}

impl Hasher {
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::Crc32 => Inner::Crc32(crc32fast::Hasher::new()),
            Algorithm::Adler32 => Inner::Adler32(RollingAdler32::new()),
            Algorithm::Md5 => Inner::Digest(Box::new(Md5::new())),
            Algorithm::Sha1 => Inner::Digest(Box::new(Sha1::new())),
            Algorithm::Sha224 => Inner::Digest(Box::new(Sha224::new())),
            Algorithm::Sha256 => Inner::Digest(Box::new(Sha256::new())),
            Algorithm::Sha384 => Inner::Digest(Box::new(Sha384::new())),
            Algorithm::Sha512 => Inner::Digest(Box::new(Sha512::new())),
        };
        Hasher(inner)
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            Inner::Crc32(h) => h.update(data),
            Inner::Adler32(h) => h.update_buffer(data),
            Inner::Digest(d) => d.update(data),
        }
    }

    pub fn hexdigest(self) -> String {
        match self.0 {
            Inner::Crc32(h) => format!("{:08x}", h.finalize()),
            Inner::Adler32(h) => format!("{:08x}", h.hash()),
            Inner::Digest(mut d) => hex::encode(d.finalize_reset()),
        }
    }
}

/// Digest an entire string in one go.
pub fn hexdigest(algorithm: Algorithm, data: &[u8]) -> String {
    let mut h = Hasher::new(algorithm);
    h.update(data);
    h.hexdigest()
}

/// Digest a byte stream in `blocksize`-sized chunks.
pub fn hexdigest_reader<R: Read>(
    algorithm: Algorithm,
    reader: &mut R,
    blocksize: usize,
) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut chunk = vec![0u8; blocksize];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hasher.hexdigest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn known_digests() {
        assert_eq!("cbf43926", hexdigest(Algorithm::Crc32, b"123456789"));
        assert_eq!("11e60398", hexdigest(Algorithm::Adler32, b"Wikipedia"));
        assert_eq!(
            "900150983cd24fb0d6963f7d28e17f72",
            hexdigest(Algorithm::Md5, b"abc")
        );
        assert_eq!(
            "a9993e364706816aba3e25717850c26c9cd0d89d",
            hexdigest(Algorithm::Sha1, b"abc")
        );
        assert_eq!(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            hexdigest(Algorithm::Sha256, b"abc")
        );
    }

    #[test]
    fn chunked_digest_should_match_oneshot() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let streamed =
            hexdigest_reader(Algorithm::Sha1, &mut Cursor::new(&data), 7).unwrap();
        assert_eq!(hexdigest(Algorithm::Sha1, &data), streamed);
    }

    #[test]
    fn algorithm_names_should_parse() {
        assert_eq!(Algorithm::Sha1, "sha1".parse().unwrap());
        assert_eq!(Algorithm::Crc32, "CRC32".parse().unwrap());
        assert!("whirlpool".parse::<Algorithm>().is_err());
    }
}
