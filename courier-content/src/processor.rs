//! The ordered transform pipeline applied to each outbound message body.

use courier_common::message::TrackingToken;
use serde::{Deserialize, Serialize};

use crate::{append_unsubscribe_footer, inject_tracking_pixel, rewrite_links};

const fn default_true() -> bool {
    true
}

/// Which tracking transforms are applied. All default to on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_true")]
    pub include_click_tracking: bool,
    #[serde(default = "default_true")]
    pub include_unsubscribe: bool,
    #[serde(default = "default_true")]
    pub include_open_tracking: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            include_click_tracking: true,
            include_unsubscribe: true,
            include_open_tracking: true,
        }
    }
}

/// Applies the configured transforms to a message body, in a fixed order:
/// click rewrite first, then the unsubscribe footer, then the open pixel.
///
/// Click rewriting runs before any injection so the injected markup's own
/// links (the unsubscribe href) are never routed through the click redirect.
#[derive(Debug, Clone)]
pub struct ContentProcessor {
    base_url: String,
    config: TrackingConfig,
}

impl ContentProcessor {
    #[must_use]
    pub fn new(base_url: impl Into<String>, config: TrackingConfig) -> Self {
        Self {
            base_url: base_url.into(),
            config,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run the pipeline once for one message body.
    ///
    /// Not idempotent: feeding the output back in double-wraps every tracked
    /// URL. Exactly one call per (message, token).
    #[must_use]
    pub fn process(&self, html: &str, token: &TrackingToken) -> String {
        let mut out = if self.config.include_click_tracking {
            rewrite_links(html, token, &self.base_url)
        } else {
            html.to_string()
        };

        if self.config.include_unsubscribe {
            out = append_unsubscribe_footer(&out, token, &self.base_url);
        }

        if self.config.include_open_tracking {
            out = inject_tracking_pixel(&out, token, &self.base_url);
        }

        out
    }
}
