//! Replication of room state to the external sync service

pub mod channel;
pub mod handshake;
pub mod protocol;
pub mod storage;
