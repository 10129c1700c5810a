use time::OffsetDateTime;

pub fn utc_now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
