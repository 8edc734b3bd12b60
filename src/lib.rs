//! flickr-gallery-rs: acquire recent Flickr photos into a local metadata
//! store and a two-tier image cache.
//!
//! The pipeline is a page fetcher ([`gallery::PagingFetcher`]) feeding a
//! deduplicating store ([`state::PhotoRepository`]), plus an image resolver
//! ([`resolver::ImageResolver`]) that answers from the binary cache
//! ([`cache::BinaryCache`]) before going to the network
//! ([`flickr::FlickrClient`]). Everything is constructed by the caller and
//! passed in; nothing here is a process-wide singleton.

#![warn(clippy::all)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod flickr;
pub mod gallery;
pub mod resolver;
pub mod retry;
pub mod shutdown;
pub mod state;
pub mod sync;
pub mod types;
