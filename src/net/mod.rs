pub mod broadcast;
pub mod commands;
pub mod connection;
pub mod game_session;
pub mod limits;
pub mod outbox;
pub mod protocol;
pub mod viewport;
