//! Library to backup [PostgreSQL][pg] databases with `pg_dump`.
//!
//! Every database of a list is dumped into a timestamped archive, old archives
//! are rotated out and the outcome is reported through an external notification script.
//! Optionally the new archives are uploaded to an FTP server.
//! The whole run is sequenced by [`run::BackupRun`].
//!
//! [pg]: https://www.postgresql.org/

#![forbid(unsafe_code)]

pub mod backends;
pub mod cli;
pub mod command;
pub mod notification;
pub mod run;
pub mod settings;
pub mod transfer;
pub mod util;
