//! Personalized recommendations for a travel blogging platform.
//!
//! Candidate collectors read blogs, packages, travelers and destinations from
//! a [`db::DocumentStore`], the generator scores and persists them per user,
//! and the retrieval functions serve them back, including a public trending
//! feed.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
