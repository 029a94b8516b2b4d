//! Personalized feed ranking: topic-weight scoring, vector/fresh candidate
//! blending, source diversity, and opaque cursor pagination, served over a
//! small Axum surface.
//!
//! The ranking core (`scoring`, `scheduler`, `blend`, `diversity`, `cursor`)
//! is pure and synchronous; `feed::FeedRanker` orchestrates it against a
//! `store::CardStore` implementation.

pub mod api;
pub mod blend;
pub mod card;
pub mod config;
pub mod cursor;
pub mod diversity;
pub mod feed;
pub mod metrics;
pub mod profile;
pub mod rest;
pub mod scheduler;
pub mod scoring;
pub mod store;

pub use card::{Card, CardId, SourceType, TopicWeights, UserId};
pub use config::FeedConfig;
pub use cursor::{Cursor, FeedMode};
pub use feed::{FeedPage, FeedRanker};
pub use store::{CardStore, MemoryStore, UserProfile};
