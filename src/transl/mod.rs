//! The translation-library-backed Client family member.

pub mod diff;
pub mod sample_cache;
pub mod subscriber;

pub use sample_cache::SampleCache;
pub use subscriber::TranslSubscriber;
