//! Domain layer: content records, slugs and validation rules.

pub mod entities;
pub mod error;
pub mod posts;
pub mod slug;
