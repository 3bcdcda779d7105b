//! Core library for mood-playlist-sync: Spotify credential lifecycle,
//! track resolution and playlist assembly behind an AI playlist generator.
pub mod api;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod models;
pub mod playlist;
pub mod resolver;
pub mod service;
pub mod util;
