pub const CHUNK_DIR_NAME: &str = "chunks";
pub const TMP_DIR_NAME: &str = "tmp";

pub const CHECKSUM_HEADER: &str = "x-chunk-checksum";
pub const REPLICAS_HEADER: &str = "x-chunk-replicas";

pub const MAX_ID_LEN: usize = 512;

pub const DEFAULT_CHUNK_SIZE: i64 = 1024;
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CHUNKS_PER_FILE: u64 = 1_000_000;
