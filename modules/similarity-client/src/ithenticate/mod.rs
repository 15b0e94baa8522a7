//! iThenticate-style backend: session login, folder-scoped document
//! submission, poll-until-processed, then per-part source reports.

mod client;
mod types;

pub use client::IthenticateClient;
