// src/session.rs
//! Overlay session manager
//!
//! Starts the overlay runtime and loads the configured identities exactly
//! once per process, no matter how many threads hit an interposed entry
//! point first. Identity locators come from `ZITI_IDENTITIES`; every listed
//! identity is loaded and its outcome logged, and the first successfully
//! loaded context is retained as the active context used by the bind path.
//! Load failures never terminate the host process.

use std::ffi::CString;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::observability;
use crate::overlay::{OverlayContext, OverlayLib};
use crate::utils::config::ShimConfig;

/// The one-time-initialized overlay session.
pub struct Session {
    context: Option<OverlayContext>,
}

static SESSION: OnceCell<Session> = OnceCell::new();

impl Session {
    /// Return the process-wide session, initializing it on first use.
    ///
    /// Concurrent first callers block until the single initialization pass
    /// completes; all observe the same session afterward.
    pub fn get() -> &'static Session {
        SESSION.get_or_init(Self::initialize)
    }

    fn initialize() -> Session {
        observability::init_tracing();

        let overlay = OverlayLib::get();
        if !overlay.init_runtime() {
            debug!("overlay runtime unavailable, session stays inactive");
            return Session { context: None };
        }

        let config = ShimConfig::from_env();
        if config.identities.is_empty() {
            debug!("no overlay identities configured");
            return Session { context: None };
        }

        let mut active = None;
        for locator in &config.identities {
            let c_locator = match CString::new(locator.as_str()) {
                Ok(c) => c,
                Err(_) => {
                    warn!(identity = %locator, "identity locator contains NUL, skipped");
                    continue;
                }
            };

            match overlay.load_identity(&c_locator) {
                Some(ctx) => {
                    info!(identity = %locator, "loaded overlay identity");
                    // Only the first context serves the bind path.
                    if active.is_none() {
                        active = Some(ctx);
                    }
                }
                None => warn!(identity = %locator, "failed to load overlay identity"),
            }
        }

        Session { context: active }
    }

    /// The active overlay context, if any identity loaded successfully.
    pub fn active_context(&self) -> Option<OverlayContext> {
        self.context
    }
}
