//! Persistence of chunks, observations and activity cards.
//!
//!  - Everything lives in one SQLite file owned by [db::Database].
//!  - Times are stored as RFC3339 UTC strings with second precision.
//!  - Chunks keep their analysis state so interrupted work can be resumed.

pub mod cards;
pub mod chunks;
pub mod db;
pub mod entities;
pub mod migrations;
