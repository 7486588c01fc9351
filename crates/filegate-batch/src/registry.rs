//! Expected-set registry: which file types make up a batch and how many
//! columns each schema requires.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use crate::error::RegistryError;

/// File types that together form one complete batch, plus per-type schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeRegistry {
    expected: BTreeSet<String>,
    columns: BTreeMap<String, NonZeroUsize>,
}

impl FileTypeRegistry {
    /// Build a registry, normalising type codes to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyExpectedSet`] when no types are expected
    /// and [`RegistryError::MissingSchema`] when an expected type has no
    /// column count.
    pub fn new<E, C>(expected: E, columns: C) -> Result<Self, RegistryError>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        C: IntoIterator<Item = (String, NonZeroUsize)>,
    {
        let expected: BTreeSet<String> = expected
            .into_iter()
            .map(|file_type| file_type.as_ref().trim().to_ascii_lowercase())
            .collect();
        if expected.is_empty() {
            return Err(RegistryError::EmptyExpectedSet);
        }
        let columns: BTreeMap<String, NonZeroUsize> = columns
            .into_iter()
            .map(|(file_type, count)| (file_type.trim().to_ascii_lowercase(), count))
            .collect();
        if let Some(missing) = expected.iter().find(|t| !columns.contains_key(*t)) {
            return Err(RegistryError::MissingSchema {
                file_type: missing.clone(),
            });
        }
        Ok(Self { expected, columns })
    }

    /// The file types a batch needs before it is complete.
    #[must_use]
    pub const fn expected(&self) -> &BTreeSet<String> {
        &self.expected
    }

    /// Whether `file_type` belongs to the expected set.
    #[must_use]
    pub fn is_expected(&self, file_type: &str) -> bool {
        self.expected.contains(&file_type.to_ascii_lowercase())
    }

    /// Required column count for `file_type`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownFileType`] when no schema is configured.
    pub fn column_count(&self, file_type: &str) -> Result<NonZeroUsize, RegistryError> {
        self.columns
            .get(&file_type.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| RegistryError::UnknownFileType {
                file_type: file_type.to_string(),
            })
    }

    /// Expected types not yet present in `received`.
    #[must_use]
    pub fn missing(&self, received: &BTreeSet<String>) -> Vec<String> {
        self.expected.difference(received).cloned().collect()
    }

    /// Whether `received` covers the expected set.
    #[must_use]
    pub fn is_complete(&self, received: &BTreeSet<String>) -> bool {
        self.expected.is_subset(received)
    }
}

impl Default for FileTypeRegistry {
    fn default() -> Self {
        let columns = [
            ("type1", 4),
            ("type2", 4),
            ("type3", 14),
            ("type4", 3),
            ("type5", 2),
            ("type6", 15),
            ("type7", 23),
            ("type8", 21),
            ("type9", 5),
            ("type10", 3),
        ]
        .into_iter()
        .filter_map(|(name, count)| NonZeroUsize::new(count).map(|n| (name.to_string(), n)))
        .collect();
        let expected = [
            "type1", "type2", "type3", "type4", "type5", "type7", "type8", "type9", "type10",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        Self { expected, columns }
    }
}
