use crate::error::{Error, Result};
use crate::skiplist::SkipList;
use std::fmt::{Display, Write};
use std::str::FromStr;

pub const DEFAULT_DELIMITER: &str = ":";

/// Plain-text `key<delimiter>value` entries, one per line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineFormat {
    delimiter: String,
}

impl Default for LineFormat {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl LineFormat {
    /// Panics on an empty delimiter.
    pub fn new(delimiter: &str) -> Self {
        assert!(!delimiter.is_empty(), "delimiter must not be empty");
        Self {
            delimiter: delimiter.to_string(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn is_valid(&self, line: &str) -> bool {
        !line.is_empty() && line.contains(self.delimiter.as_str())
    }

    /// Splits `line` at the first delimiter.
    pub fn parse<'a>(&self, line: &'a str) -> Result<(&'a str, &'a str)> {
        if !self.is_valid(line) {
            return Err(Error::InvalidLine(line.to_string()));
        }
        let at = line
            .find(self.delimiter.as_str())
            .ok_or_else(|| Error::InvalidLine(line.to_string()))?;
        Ok((&line[..at], &line[at + self.delimiter.len()..]))
    }

    pub fn format<K: Display, V: Display>(&self, key: K, value: V) -> String {
        format!("{}{}{}", key, self.delimiter, value)
    }
}

impl<K, V> SkipList<K, V>
where
    K: Ord,
{
    /// Renders every entry in key order, one line each.
    pub fn to_lines(&self, format: &LineFormat) -> String
    where
        K: Display,
        V: Display,
    {
        let mut out = String::new();
        for (key, value) in self.iter() {
            let _ = writeln!(out, "{}", format.format(key, value));
        }
        out
    }

    /// Inserts every non-empty line of `text`, returning how many were read.
    ///
    /// Stops at the first malformed line; entries before it stay inserted.
    pub fn load_lines(&mut self, format: &LineFormat, text: &str) -> Result<usize>
    where
        K: FromStr,
        V: FromStr,
    {
        let mut loaded = 0;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (key, value) = format.parse(line)?;
            let key = key.parse::<K>().map_err(|_| Error::Parse {
                what: "key",
                input: key.to_string(),
            })?;
            let value = value.parse::<V>().map_err(|_| Error::Parse {
                what: "value",
                input: value.to_string(),
            })?;
            self.insert(key, value);
            loaded += 1;
        }
        Ok(loaded)
    }
}
