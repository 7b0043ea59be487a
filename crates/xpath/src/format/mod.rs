//! Picture-string formatters: `format-dateTime`/`format-date`/`format-time`,
//! `format-integer`, and the decimal-format machinery behind
//! `format-number`.

mod datetime;
mod integer;
mod number;
mod picture;

pub use datetime::{format_date, format_date_time, format_time};
pub use integer::format_integer;
pub use number::{DecimalFormat, format_number};
