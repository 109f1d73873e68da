// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Salted SHA-512 password entries, mosquitto_passwd compatible in
//! spirit: `username:base64(salt || digest)`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use openssl::hash::{Hasher, MessageDigest};
use rand::RngCore;

use crate::error::{Error, ErrorKind};

pub const SALT_LEN: usize = 12;
pub const HASH_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Password {
    salt: [u8; SALT_LEN],
    digest: [u8; HASH_LEN],
}

fn digest(salt: &[u8], password: &[u8]) -> Result<[u8; HASH_LEN], Error> {
    let to_error = |err: openssl::error::ErrorStack| {
        Error::from_string(ErrorKind::InternalError, format!("openssl: {err}"))
    };
    let mut hasher = Hasher::new(MessageDigest::sha512()).map_err(to_error)?;
    hasher.update(salt).map_err(to_error)?;
    hasher.update(password).map_err(to_error)?;
    let bytes = hasher.finish().map_err(to_error)?;
    let mut out = [0; HASH_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

impl Password {
    /// Hash a new password with a random salt.
    ///
    /// # Errors
    ///
    /// Returns error if the hasher fails.
    pub fn generate(password: &[u8]) -> Result<Self, Error> {
        let mut salt = [0; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = digest(&salt, password)?;
        Ok(Self { salt, digest })
    }

    /// Check a cleartext password against this entry.
    #[must_use]
    pub fn is_match(&self, password: &[u8]) -> bool {
        digest(&self.salt, password).is_ok_and(|candidate| candidate == self.digest)
    }

    /// Encode as the password file value field.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut bytes = Vec::with_capacity(SALT_LEN + HASH_LEN);
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.digest);
        BASE64.encode(bytes)
    }

    /// Parse one `username:value` line; comments and blanks give `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the line is not a valid entry.
    pub fn parse_line(line: &str) -> Result<Option<(&str, Self)>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let Some((username, value)) = line.split_once(':') else {
            return Err(Error::from_string(
                ErrorKind::FormatError,
                format!("Invalid password entry: {line:?}"),
            ));
        };
        if username.is_empty() {
            return Err(Error::new(ErrorKind::FormatError, "Empty username"));
        }
        let bytes = BASE64.decode(value).map_err(|err| {
            Error::from_string(
                ErrorKind::FormatError,
                format!("Invalid base64 in password entry: {err}"),
            )
        })?;
        if bytes.len() != SALT_LEN + HASH_LEN {
            return Err(Error::new(
                ErrorKind::FormatError,
                "Invalid password entry length",
            ));
        }
        let mut salt = [0; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        let mut hash = [0; HASH_LEN];
        hash.copy_from_slice(&bytes[SALT_LEN..]);
        Ok(Some((
            username,
            Self {
                salt,
                digest: hash,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_match() {
        let password = Password::generate(b"hunter2").unwrap();
        assert!(password.is_match(b"hunter2"));
        assert!(!password.is_match(b"hunter3"));
    }

    #[test]
    fn test_dump_parse_round_trip() {
        let password = Password::generate(b"secret").unwrap();
        let line = format!("alice:{}", password.dump());
        let (username, parsed) = Password::parse_line(&line).unwrap().unwrap();
        assert_eq!(username, "alice");
        assert_eq!(parsed, password);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert!(Password::parse_line("# a comment").unwrap().is_none());
        assert!(Password::parse_line("").unwrap().is_none());
        assert!(Password::parse_line("no-colon").is_err());
    }
}
