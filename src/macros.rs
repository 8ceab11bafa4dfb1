//! Macros for building entries with less ceremony.
//!
//! # Examples
//!
//! ```
//! use log_intake_transport::{entry, fields, LogLevel};
//!
//! let user_id = 42;
//! let entry = entry!(LogLevel::Info, "user {} logged in", user_id)
//!     .with_fields(fields! { "user_id" => user_id, "method" => "sso" });
//!
//! assert_eq!(entry.message, "user 42 logged in");
//! assert_eq!(entry.fields.len(), 2);
//! ```

/// Build a [`LogContext`](crate::LogContext) from `key => value` pairs.
///
/// # Examples
///
/// ```
/// use log_intake_transport::{fields, FieldValue};
///
/// let ctx = fields! { "status" => 200, "path" => "/health" };
/// assert_eq!(ctx.get("status"), Some(&FieldValue::Int(200)));
///
/// let empty = fields! {};
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::LogContext::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut ctx = $crate::LogContext::new();
        $(ctx.add_field($key, $value);)+
        ctx
    }};
}

/// Build a [`LogEntry`](crate::LogEntry) with a formatted message.
///
/// # Examples
///
/// ```
/// use log_intake_transport::{entry, LogLevel};
///
/// let entry = entry!(LogLevel::Error, "request failed with {}", 503);
/// assert_eq!(entry.level, LogLevel::Error);
/// assert_eq!(entry.message, "request failed with 503");
/// ```
#[macro_export]
macro_rules! entry {
    ($level:expr, $($arg:tt)+) => {
        $crate::LogEntry::new($level, format!($($arg)+))
    };
}
