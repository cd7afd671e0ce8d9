//! Driver configuration and the platform rendering hooks.
//!
//! [`StateSettings`] is injected into [`State::new`](crate::state::State::new)
//! and validated there; construction fails fast if the platform is absent or
//! any field is out of range.

use std::fmt;
use std::rc::Rc;

use crate::error::StateError;

/// Target-platform rendering used when materializing bindings.
pub trait PlatformFunctions: fmt::Debug {
    /// Renders a reference to the local variable `name`.
    fn render_local_var_name(&self, name: &str) -> String;

    /// Renders the statement declaring `name` initialized to `value`.
    fn render_binding(&self, name: &str, value: &str) -> String;
}

/// Renders locals as Rust `let` bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustPlatform;

impl PlatformFunctions for RustPlatform {
    fn render_local_var_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn render_binding(&self, name: &str, value: &str) -> String {
        format!("let {name} = {value};")
    }
}

/// Configuration for a [`State`](crate::state::State).
#[derive(Debug, Clone)]
pub struct StateSettings {
    /// Rendering hooks. `None` is a configuration error.
    pub platform: Option<Rc<dyn PlatformFunctions>>,
    /// Prefix of generated local names. Default: `"s"`.
    pub local_var_prefix: String,
    /// Upper bound on generated seeds. `None` means unlimited.
    pub max_seeds: Option<usize>,
    /// Whether `finalize` rejects cyclic dependency graphs. Default: true.
    pub check_cycles: bool,
}

impl Default for StateSettings {
    fn default() -> Self {
        StateSettings {
            platform: None,
            local_var_prefix: "s".to_string(),
            max_seeds: None,
            check_cycles: true,
        }
    }
}

impl StateSettings {
    /// Default settings rendering through `platform`.
    pub fn with_platform(platform: impl PlatformFunctions + 'static) -> Self {
        StateSettings {
            platform: Some(Rc::new(platform)),
            ..Default::default()
        }
    }

    /// Validates the settings.
    pub fn check(&self) -> Result<(), StateError> {
        if self.platform.is_none() {
            return Err(StateError::Config {
                reason: "no platform functions provided".into(),
            });
        }
        if !is_identifier(&self.local_var_prefix) {
            return Err(StateError::Config {
                reason: format!(
                    "local variable prefix '{}' is not an identifier",
                    self.local_var_prefix
                ),
            });
        }
        if self.max_seeds == Some(0) {
            return Err(StateError::Config {
                reason: "max_seeds must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
