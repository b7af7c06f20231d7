//! Map paths: chains of map names separated by `/`

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One or more map names, applied left to right. The value found in each map
/// is the key for the next.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapPath {
    segments: Vec<String>,
}

impl MapPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<String> = path.split('/').map(|s| s.trim().to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::Usage(format!("Invalid map path '{}'", path)));
        }
        Ok(Self { segments })
    }

    pub fn single(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(Error::Usage(format!("Invalid map name '{}'", name)));
        }
        Ok(Self { segments: vec![name] })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The map the lookup starts in
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    pub fn is_chain(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for MapPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for MapPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
