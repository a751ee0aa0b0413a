//! Referent: board meeting recordings in, signed-off minutes out.
//!
//! The service ingests chunked audio uploads, assembles them with ffmpeg,
//! runs diarization and transcription, maps speakers to the registered
//! participants, generates Norwegian board documents with a language model
//! and renders them to PDF. Meetings move through a fixed state machine and
//! demo meetings are reaped once their retention window passes.

pub mod api;
pub mod app;
pub mod assembler;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod ingest;
pub mod meeting;
pub mod pipeline;
pub mod retention;
pub mod services;
pub mod share;
pub mod storage;

pub use error::{ReferentError, Result};
