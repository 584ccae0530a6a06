// src/config/constants.rs
//! Pipeline configuration constants

/// Rising-edge trigger constants
pub mod trigger {
    pub const DEFAULT_THRESHOLD: u8 = 180;
    pub const DEFAULT_PRE_SAMPLES: usize = 500;
    pub const DEFAULT_POST_SAMPLES: usize = 500;
    pub const DEFAULT_TRIGGER_CHANNEL: usize = 1;

    // A threshold of 0 can never arm and 255 can never be exceeded
    pub const MIN_THRESHOLD: u8 = 1;
    pub const MAX_THRESHOLD: u8 = 254;
    pub const MAX_WINDOW_SAMPLES: usize = 1 << 24;
}

/// Transfer engine constants
pub mod transfer {
    pub const DEFAULT_OUTSTANDING_SLOTS: usize = 5;
    pub const MAX_OUTSTANDING_SLOTS: usize = 64;
    pub const DEFAULT_CHUNK_SIZE: usize = 0x2000;
    pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
    pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1000;
}

/// Inter-stage and caller-facing queue constants
pub mod pipeline {
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
    pub const DEFAULT_STAGE_CHANNEL_DEPTH: usize = 64;
    pub const ERROR_SINK_CAPACITY: usize = 256;
}

/// Configuration file locations and environment prefix
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/scope/config.toml";
    pub const LOCAL_CONFIG_FILE: &str = "scope.toml";
    pub const DEFAULT_CONFIG_FILE: &str = "config/scope.toml";
    pub const ENV_PREFIX: &str = "SCOPE";
}
