use serde::{Deserialize, Serialize};

/// Primary key of a bookkeeping entry (the owning record of documents).
pub type EntryId = i64;

/// Primary key of a stored document.
pub type DocumentId = i64;

/// Primary key of a user; authentication itself lives outside this crate.
pub type UserId = i64;

/// Upload payloads arrive either as a single file or as a list of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_item_normalizes_to_singleton() {
        let one = OneOrMany::One(7u8);
        assert_eq!(one.len(), 1);
        assert_eq!(one.into_vec(), vec![7]);

        let many: OneOrMany<u8> = vec![1, 2, 3].into();
        assert_eq!(many.into_vec(), vec![1, 2, 3]);
    }
}
