// src/storage/mod.rs

pub mod key_state;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod search;
pub mod traits;

pub use key_state::KeyState;
pub use memory::{InMemoryKeyStore, InMemoryVideoStore};
#[cfg(feature = "redis")]
pub use self::redis::{RedisKeyStore, RedisVideoStore};
pub use search::SearchTerms;
pub use traits::{KeyStateStore, VideoStore};
