//! Terminal output for the one-shot commands
//!
//! Uses `cliclack` in interactive terminals with automatic fallback to
//! plain output in CI/non-interactive environments.

mod context;
mod output;
mod progress;
mod theme;

pub use context::UiContext;
pub use output::{
    format_bytes, intro, key_value, outro_success, remark, row, section, step_ok_detail,
    step_warn_hint,
};
pub use progress::TaskSpinner;
pub use theme::{init_theme, StrataTheme};
