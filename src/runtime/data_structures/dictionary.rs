use crate::{
    lang::source_buffer::SourceLocation,
    runtime::data_structures::{cell::canonical_name, word::NodeIndex},
};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

/// The information stored in the dictionary for each word.  The executable part of the word lives
/// in the node repository; the entry only holds its handle and the word's metadata.
#[derive(Clone, PartialEq, Eq)]
pub struct WordEntry {
    /// The repository handle of the word's executable node.
    pub node: NodeIndex,

    /// A short comment describing the word, shown by FIND and the WORDS listing.
    pub comment: String,

    /// Immediate words are executed during compilation instead of being compiled in.
    pub immediate: bool,

    /// Defining words install a new word under the name that follows them.
    pub defining: bool,

    /// Hidden words are left out of the WORDS listing.
    pub hidden: bool,

    /// Where the word was defined, in Forth or in Rust source code.
    pub location: SourceLocation,
}

impl WordEntry {
    /// Create a new entry with default flags.
    pub fn new(node: NodeIndex, comment: String, location: SourceLocation) -> WordEntry {
        WordEntry {
            node,
            comment,
            immediate: false,
            defining: false,
            hidden: false,
            location,
        }
    }
}

/// The dictionary of words known to the interpreter.  Lookup is by canonical name, so when the
/// case insensitive policy is on, `dup`, `Dup`, and `DUP` all find the same entry.  Redefinition
/// is permitted and shadows the previous entry, but words compiled against the old entry keep
/// their original repository handles and are unaffected.
///
/// The insertion order is kept so that the WORDS listing can show the dictionary in the order the
/// words were defined.
pub struct Dictionary {
    entries: HashMap<String, WordEntry>,
    order: Vec<String>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Pretty print the dictionary for the WORDS listing.  Words appear once each, in insertion
/// order, with the newest definition winning for redefined names.
impl Display for Dictionary {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        let mut max_size = 0;
        let mut visible_words = 0;

        for name in self.order.iter() {
            if let Some(entry) = self.entries.get(name) {
                if !entry.hidden {
                    visible_words += 1;

                    if name.len() > max_size {
                        max_size = name.len();
                    }
                }
            }
        }

        writeln!(formatter, "{} words defined.\n", visible_words)?;

        for name in self.order.iter() {
            if let Some(entry) = self.entries.get(name) {
                if entry.hidden {
                    continue;
                }

                let immediate = if entry.immediate { "  immediate" } else { "           " };

                writeln!(
                    formatter,
                    "{:width$}{}  --  {}",
                    name,
                    immediate,
                    entry.comment,
                    width = max_size
                )?;
            }
        }

        Ok(())
    }
}

impl Dictionary {
    /// Create a new empty dictionary.
    pub fn new() -> Dictionary {
        Dictionary {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Insert a new word into the dictionary.  If the name was already defined the new entry
    /// shadows the old one, keeping the name's original position in the listing.
    pub fn insert(&mut self, name: &str, entry: WordEntry) {
        let canonical = canonical_name(name);

        if !self.entries.contains_key(&canonical) {
            self.order.push(canonical.clone());
        }

        let _ = self.entries.insert(canonical, entry);
    }

    /// Try to get a word's entry by name.
    pub fn get(&self, name: &str) -> Option<&WordEntry> {
        self.entries.get(&canonical_name(name))
    }

    /// Is the name defined?
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonical_name(name))
    }

    /// How many names are defined?
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the dictionary empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in insertion order.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&String, &WordEntry)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|entry| (name, entry)))
    }

    /// Find the name a repository handle was most recently installed under.  This is a reverse
    /// scan used only by the debug tracer.
    pub fn name_of_node(&self, node: NodeIndex) -> Option<&String> {
        self.order
            .iter()
            .rev()
            .find(|name| {
                self.entries
                    .get(*name)
                    .map(|entry| entry.node == node)
                    .unwrap_or(false)
            })
    }
}
