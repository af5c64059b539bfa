//! Outbound HTML rewrites: click-tracking redirects, the open pixel, and the
//! unsubscribe footer, plus the raw link inventory used for campaign
//! analytics.
//!
//! Rewriting is applied exactly once per message, keyed by that message's
//! tracking token. The transform is deliberately NOT idempotent: running it
//! over its own output would double-wrap every tracked URL.

mod inject;
mod processor;
mod rewrite;

pub use inject::{append_unsubscribe_footer, inject_tracking_pixel};
pub use processor::{ContentProcessor, TrackingConfig};
pub use rewrite::{extract_links, rewrite_links};
