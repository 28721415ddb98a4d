//! Phase-timed experiment runner for AI-assisted brainstorming studies.
//!
//! A participant logs in, is assigned uniformly at random to one of the
//! configured conditions, reads the condition's guideline pages, then
//! brainstorms with a chat model whose system instruction depends on the
//! condition. A researcher panel behind a shared passphrase can inspect and
//! steer the session and export the chat log as JSON.

pub mod admin;
pub mod assets;
pub mod chat;
pub mod cli;
pub mod conditions;
pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod phase;
pub mod providers;
pub mod render;
pub mod router;
pub mod session;
pub mod timer;
pub mod web;
