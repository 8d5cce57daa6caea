//! # Engine Module
//!
//! The orchestration core: the [`Engine`] loop, the batch [`Downloader`], the
//! [`ItemPipeline`] and the generic [`MiddlewareChain`] all three are built on.

mod chain;
mod core;
mod downloader;
mod item_pipeline;

pub use chain::{ChainOutcome, Droppable, MiddlewareChain, Stage};
pub use self::core::Engine;
pub use downloader::Downloader;
pub use item_pipeline::ItemPipeline;
