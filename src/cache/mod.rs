//! Client-side caching of portal reads

pub mod browser;
pub mod client;
pub mod storage;

pub use browser::{BrowserCache, CacheEntry, CacheKey, CacheLookup, CacheMiss, CacheSettings};
pub use client::{CachedPortal, PortalApi};
pub use storage::{CacheStorage, Clock, ManualClock, MemoryStorage, SystemClock};
