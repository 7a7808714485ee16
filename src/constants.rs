use std::sync::LazyLock;

use time::{format_description::BorrowedFormatItem, macros::format_description};

pub mod version;

pub static POISE_VERSION: &str = "0.6.1";
pub static STARTUP_TIME: LazyLock<std::time::SystemTime> =
    LazyLock::new(std::time::SystemTime::now);

/// how quote timestamps are written to and read from the database.
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// `quote list` shows at most this many quotes before summarizing the rest.
pub const QUOTE_LIST_LIMIT: usize = 5;
