//! Thin async clients for Firebase Authentication and Cloudflare storage.
//!
//! * [`auth`] verifies Firebase ID tokens, manages users and guards axum/tower
//!   services with a bearer token middleware.
//! * [`cloudflare`] talks to D1, Workers KV and R2 through the Cloudflare v4 API.
//!
//! Each service sits behind a cargo feature of the same name; both are on by
//! default.

#[cfg(feature = "firebase")]
pub mod auth;
#[cfg(feature = "cloudflare")]
pub mod cloudflare;
pub mod core;

#[cfg(feature = "firebase")]
pub use self::firebase_app::FirebaseApp;

#[cfg(feature = "firebase")]
mod firebase_app;
