//! Session token and alias generation.

use std::fmt;

use uuid::Uuid;

/// Source of high-entropy identifiers for tokens and aliases.
pub trait AliasGenerator: Send + Sync + fmt::Debug {
    /// Draw a fresh identifier.
    fn generate(&self) -> String;
}

/// Two independent v4 UUIDs joined with `-`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidPairGenerator;

impl AliasGenerator for UuidPairGenerator {
    fn generate(&self) -> String {
        format!("{}-{}", Uuid::new_v4(), Uuid::new_v4())
    }
}

/// Upper bound on draws for a single identifier before login gives up.
pub const MAX_DRAW_ATTEMPTS: usize = 8;
