/// Simulation timing
pub mod tick {
    /// Room tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Seconds between periodic room stats log lines
    pub const STATS_LOG_INTERVAL_SECS: u64 = 30;
}

/// Viewport geometry (world units)
pub mod viewport {
    /// Default half width of a player's visible region
    pub const DEFAULT_HALF_WIDTH: f32 = 1024.0;
    /// Default half height of a player's visible region
    pub const DEFAULT_HALF_HEIGHT: f32 = 576.0;
    /// Largest half extent a client may request (spectators zoomed out)
    pub const MAX_HALF_EXTENT: f32 = 4096.0;
    /// Smallest half extent a client may request
    pub const MIN_HALF_EXTENT: f32 = 64.0;
}

/// Spatial index tuning
pub mod spatial {
    /// Cell size for the mob grid. Roughly a quarter of a default viewport width
    /// keeps a query to ~50 cells.
    pub const GRID_CELL_SIZE: f32 = 512.0;
    /// Initial capacity for grid cells
    pub const GRID_INITIAL_CAPACITY: usize = 512;
    /// Initial capacity for ids within a cell
    pub const CELL_INITIAL_CAPACITY: usize = 8;
}

/// Sync replication channel
pub mod sync {
    /// Default time to wait for an acknowledgement before scheduling a resend
    pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;
    /// Fixed resend delay, and the base of the exponential one
    pub const DEFAULT_RESEND_INTERVAL_MS: u64 = 1_000;
    /// Upper bound for the exponential resend delay
    pub const DEFAULT_RESEND_MAX_MS: u64 = 60_000;
    /// Nonce length in bytes before base64 encoding
    pub const NONCE_BYTES: usize = 32;
    /// Maximum number of updates transmitted in one flush
    pub const MAX_UPDATES_PER_FLUSH: usize = 256;

    /// Acknowledgement result codes exchanged with the sync service
    pub mod ack {
        /// Update accepted and applied by the peer
        pub const OK: i32 = 0;
        /// Peer could not apply the update right now, retry later
        pub const TRANSIENT: i32 = 1;
        /// Peer rejected the update as malformed, retrying will never succeed
        pub const REJECTED_MALFORMED: i32 = 2;
        /// Peer rejected the update permanently for another reason
        pub const REJECTED_PERMANENT: i32 = 3;
        /// Local marker: acknowledgement deadline elapsed
        pub const LOCAL_TIMEOUT: i32 = -1;
        /// Local marker: no acknowledgement received yet
        pub const LOCAL_NONE: i32 = -2;
    }
}

/// Per-connection packet budget. Counters grow by the cost of each packet and
/// decay by `DECAY_PER_SECOND` of their limit.
pub mod limits {
    pub const ANY: u32 = 300;
    pub const CHAT: u32 = 4;
    pub const KEY: u32 = 200;
    pub const RESPAWN: u32 = 4;
    pub const SPECTATE: u32 = 6;
    pub const SU: u32 = 3;
    pub const DEBUG: u32 = 3;
    pub const SPAM: u32 = 10;
    /// Fraction of each limit forgiven per second
    pub const DECAY_PER_SECOND: f32 = 0.5;
}

/// Connection timers
pub mod timeouts {
    pub const LOGIN_MS: u64 = 2_000;
    pub const PONG_MS: u64 = 5_000;
    pub const RESPAWN_MS: u64 = 2_000;
    pub const LAGGING_MS: u64 = 1_000;
    pub const PING_PERIOD_MS: u64 = 5_000;
}
