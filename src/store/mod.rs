//! In-memory data stores

pub mod profiles;

pub use profiles::{PlayerProfile, ProfileStore};
