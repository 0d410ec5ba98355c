/// Module defining the cell, the views over it, and the packed address representation.
pub mod cell;

/// Module for the LIFO stacks used for data and return values.
pub mod stack;

/// Module for the dictionary mapping word names to their entries.
pub mod dictionary;

/// Module for the word node variants and the repository that owns them.
pub mod word;
