/*!
A small learning-management web application.

Admins, teachers and students manage levels, lessons and exercises through
server-rendered forms. See `inter` for the HTTP side and `store` for
persistence.
*/
use time::{
    format_description::FormatItem,
    macros::format_description,
    OffsetDateTime,
    PrimitiveDateTime,
};

pub mod config;
pub mod course;
pub mod inter;
pub mod progress;
pub mod session;
pub mod store;
pub mod user;

/// Format of dates coming in from (and going out to) HTML date inputs.
pub const DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

/// Format used to display timestamps in templates.
pub const DATETIME_FMT: &[FormatItem] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Current UTC time with the offset dropped, which is how timestamps are
/// stored.
pub fn now() -> PrimitiveDateTime {
    let t = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(t.date(), t.time())
}

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}
