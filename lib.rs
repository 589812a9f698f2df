//! Happy Places: a personal catalog of places with a photo, a note, a date
//! and an optional location.
//!
//! Places are edited through a [`session::DraftSession`], which reconciles
//! the user's edits with the stored record, device location fixes, map picks
//! and reverse-geocoded addresses before committing to the
//! [`store::RecordStore`].

pub mod config;
pub mod db;
pub mod draft;
pub mod error;
pub mod geocode;
pub mod images;
pub mod location;
pub mod map_picker;
pub mod models;
pub mod places;
pub mod schema;
pub mod session;
pub mod store;

pub use error::{Error, Result};
