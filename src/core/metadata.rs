//! Metadata attached to archive objects and properties.
//!
//! Stored on disk as `key=value;key2=value2`, where `\` escapes `;`, `=`
//! and itself.

use smallvec::SmallVec;
use std::fmt;

/// Ordered string pairs. Most objects carry one or two entries
/// (`schema`, `schemaObjTitle`), so they live inline.
#[derive(Clone, Default, PartialEq)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    /// Schema title key.
    pub const SCHEMA_KEY: &'static str = "schema";

    /// Archive-level frame rate written by most DCC exporters.
    pub const DCC_FPS_KEY: &'static str = "_ai_DCC_FPS";

    /// Archive-level application name.
    pub const APPLICATION_KEY: &'static str = "_ai_Application";

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value of `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schema title, e.g. `AbcGeom_Xform_v3`.
    pub fn schema(&self) -> Option<&str> {
        self.get(Self::SCHEMA_KEY)
    }

    /// Parse the on-disk `key=value;...` form.
    ///
    /// Entries without an unescaped `=` or with an empty key are ignored.
    pub fn parse(s: &str) -> Self {
        let mut meta = Self::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = s.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let target = if in_value { &mut value } else { &mut key };
                    match chars.next() {
                        Some(next @ ('\\' | ';' | '=')) => target.push(next),
                        Some(other) => {
                            target.push('\\');
                            target.push(other);
                        }
                        None => target.push('\\'),
                    }
                }
                '=' if !in_value => in_value = true,
                ';' => {
                    if in_value && !key.is_empty() {
                        meta.set(std::mem::take(&mut key), std::mem::take(&mut value));
                    }
                    key.clear();
                    value.clear();
                    in_value = false;
                }
                _ if in_value => value.push(c),
                _ => key.push(c),
            }
        }
        if in_value && !key.is_empty() {
            meta.set(key, value);
        }

        meta
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
