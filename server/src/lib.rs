//! Chatter Server - Realtime chat relay.
//!
//! This crate provides a minimal chat backend:
//! - A WebSocket channel where clients send messages, receive the full
//!   message collection after every send, see how many clients are
//!   connected, and relay typing feedback to each other
//! - A bearer-token protected HTTP endpoint returning the caller's profile
//!
//! # Architecture
//!
//! Connection tasks hand client events to the [`hub::Hub`], which persists
//! messages through the [`store`] traits and publishes addressed events on a
//! single [`broadcast`] channel. HTTP routing and the WebSocket transport
//! live in [`routes`].

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod hub;
pub mod registry;
pub mod routes;
pub mod sqlite;
pub mod store;
pub mod types;
