//! Small helpers shared by the CLI and the feed layer.
//!
//! - **URL validation** for addresses typed by the user
//! - **Text processing**: control-character stripping for upstream text and
//!   width-aware truncation for table output

mod text;
mod url_validator;

pub use text::{display_width, pad_to_width, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_url, UrlValidationError};
