// packages/engine/src/interception/calibration.rs
//! View-attach trigger for the one-shot calibration routine
//!
//! The host's "set content view" calls are forwarded first; once the host
//! returns, the calibration routine runs exactly once for that call. The
//! routine itself lives outside the engine and never touches the listener
//! registry.

use crate::observability::names;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What a screen was given as its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSpec {
    /// An already-built view, by id
    View(String),
    /// A layout resource to inflate
    Layout(u32),
}

/// The screen whose content was just attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
    pub activity: String,
    pub content: ContentSpec,
}

/// Host UI call that attaches content to a screen
pub trait ContentHost: Send + Sync {
    fn set_content_view(&self, activity: &str, content: &ContentSpec);
}

/// Calibration performed once a view is attached
pub trait CalibrationRoutine: Send + Sync {
    fn run(&self, context: &ViewContext);
}

/// Forwards content-view calls and raises the calibration trigger
pub struct ViewAttachHook<H> {
    host: H,
    routine: Arc<dyn CalibrationRoutine>,
    invocations: AtomicU64,
}

impl<H: ContentHost> ViewAttachHook<H> {
    pub fn new(host: H, routine: Arc<dyn CalibrationRoutine>) -> Self {
        Self {
            host,
            routine,
            invocations: AtomicU64::new(0),
        }
    }

    pub fn set_content_view(&self, activity: &str, view_id: impl Into<String>) {
        self.attach(activity, ContentSpec::View(view_id.into()));
    }

    pub fn set_content_layout(&self, activity: &str, layout_res_id: u32) {
        self.attach(activity, ContentSpec::Layout(layout_res_id));
    }

    fn attach(&self, activity: &str, content: ContentSpec) {
        self.host.set_content_view(activity, &content);

        let context = ViewContext {
            activity: activity.to_string(),
            content,
        };
        debug!("View attached for {}, running calibration", activity);
        self.routine.run(&context);

        self.invocations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(names::CALIBRATIONS).increment(1);
    }

    /// How many times the routine has been run
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}
