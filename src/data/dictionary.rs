use fxhash::FxHashMap;

/// String dictionary for compact storage via interning.
/// Maps strings to u32 IDs for dictionary-encoded string columns.
#[derive(Debug, Clone, Default)]
pub struct StringDictionary {
    /// String to ID mapping (for encoding)
    string_to_id: FxHashMap<String, u32>,
    /// ID to String mapping (for decoding)
    id_to_string: Vec<String>,
}

impl StringDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or insert a string, returning its ID
    pub fn get_or_insert(&mut self, s: &str) -> u32 {
        if let Some(id) = self.string_to_id.get(s) {
            return *id;
        }

        let id = self.id_to_string.len() as u32;
        self.id_to_string.push(s.to_string());
        self.string_to_id.insert(s.to_string(), id);
        id
    }

    /// Get string by ID
    pub fn get(&self, id: u32) -> Option<&str> {
        self.id_to_string.get(id as usize).map(|s| s.as_str())
    }

    /// Look up ID for a string (without inserting)
    pub fn lookup(&self, s: &str) -> Option<u32> {
        self.string_to_id.get(s).copied()
    }

    /// Number of unique strings
    pub fn len(&self) -> usize {
        self.id_to_string.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_string.is_empty()
    }

    /// Iterate over all interned strings in ID order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.id_to_string.iter().map(|s| s.as_str())
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        let string_bytes: usize = self.id_to_string.iter().map(|s| s.capacity()).sum();
        let overhead = self.id_to_string.capacity() * std::mem::size_of::<String>()
            + self.string_to_id.len() * (std::mem::size_of::<String>() + std::mem::size_of::<u32>());
        // Keys in the reverse map duplicate the string bytes
        2 * string_bytes + overhead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert() {
        let mut dict = StringDictionary::new();

        let id1 = dict.get_or_insert("hello");
        let id2 = dict.get_or_insert("world");
        let id3 = dict.get_or_insert("hello"); // Duplicate

        assert_eq!(id1, id3);
        assert_ne!(id1, id2);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_get() {
        let mut dict = StringDictionary::new();

        let id = dict.get_or_insert("test");
        assert_eq!(dict.get(id), Some("test"));
        assert_eq!(dict.get(999), None);
    }

    #[test]
    fn test_lookup() {
        let mut dict = StringDictionary::new();

        assert_eq!(dict.lookup("missing"), None);

        let id = dict.get_or_insert("exists");
        assert_eq!(dict.lookup("exists"), Some(id));
    }
}
