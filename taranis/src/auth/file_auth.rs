// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::pwd::Password;
use crate::error::Error;

/// Username/password map loaded from a password file.
#[derive(Debug, Default, Clone)]
pub struct FileAuth {
    users: HashMap<String, Password>,
}

impl FileAuth {
    /// Load and parse the password file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or an entry is malformed.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        let mut users = HashMap::new();
        for line in content.lines() {
            if let Some((username, password)) = Password::parse_line(line)? {
                users.insert(username.to_string(), password);
            }
        }
        Ok(Self { users })
    }

    #[must_use]
    pub fn is_match(&self, username: &str, password: &[u8]) -> bool {
        self.users
            .get(username)
            .is_some_and(|entry| entry.is_match(password))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
