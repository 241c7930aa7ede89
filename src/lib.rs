//! Listener-count ratings: look tracks up on Last.fm, turn listener counts
//! into 1-10 ratings, store them in the library and mirror them to Kodi.

pub mod config;
pub mod error;
pub mod http;
pub mod kodi;
pub mod lastfm;
pub mod library;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod progress;
pub mod rating;
pub mod scoring;
