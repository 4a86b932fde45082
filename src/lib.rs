//! Warden - session, brute-force, CSRF and rate-limit guard layer
//!
//! This library provides the trust/access layer that sits in front of a
//! request-handling pipeline:
//! - Session lifecycle with sliding expiration and per-user/per-device caps
//! - Failed-login tracking and lockouts per IP, device and email
//! - Per-session anti-forgery tokens
//! - Fixed-window rate limiting per route class and client IP
//!
//! All state lives in a shared key-value backend; the crate holds no locks
//! and no persistent state of its own.

pub mod config;
pub mod kv;
pub mod models;
pub mod services;

mod keys;
