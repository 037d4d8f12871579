//! Version information for parley.

/// Parley version from Cargo.toml
pub const PARLEY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version information sent to the backend.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    /// Parley client version.
    pub parley: &'static str,
    /// Name of the presentation surface driving the session (terminal, desktop, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            parley: PARLEY_VERSION,
            surface: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the presentation surface name.
    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surface = Some(surface.into());
        self
    }

    /// `User-Agent` header value, e.g. `parley/0.1.0 (terminal)`.
    pub fn user_agent(&self) -> String {
        match &self.surface {
            Some(surface) => format!("parley/{} ({})", self.parley, surface),
            None => format!("parley/{}", self.parley),
        }
    }
}
