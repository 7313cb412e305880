//! Viewport media queries
//!
//! `screen` conditions are evaluated against the live viewport rather than the
//! state snapshot. The [`Viewport`] trait abstracts the host's media query
//! support; [`SimulatedViewport`] is an in-process implementation driven by
//! explicit [`resize`](SimulatedViewport::resize) calls.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

/// Viewport errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("Invalid media query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },
}

/// Result type for viewport operations
pub type ViewportResult<T> = Result<T, ViewportError>;

/// Callback invoked when a watched media query flips
pub type ViewportCallback = Arc<dyn Fn() + Send + Sync>;

/// Source of media query results
pub trait Viewport: Send + Sync {
    /// Evaluate a media query against the current viewport
    fn matches(&self, media_query: &str) -> bool;

    /// Watch a media query; `callback` runs whenever its result changes.
    /// The watch ends when the returned handle is dropped.
    fn watch(&self, media_query: &str, callback: ViewportCallback) -> ViewportWatch;
}

/// Live subscription to a media query
///
/// Dropping the handle unsubscribes.
pub struct ViewportWatch {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ViewportWatch {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A watch that never fires
    pub fn inert() -> Self {
        Self { unsubscribe: None }
    }
}

impl Drop for ViewportWatch {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for ViewportWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportWatch")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// A single media feature test
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaFeature {
    MinWidth(f64),
    MaxWidth(f64),
    MinHeight(f64),
    MaxHeight(f64),
    Orientation(Orientation),
}

impl MediaFeature {
    fn matches(&self, width: f64, height: f64) -> bool {
        match *self {
            MediaFeature::MinWidth(v) => width >= v,
            MediaFeature::MaxWidth(v) => width <= v,
            MediaFeature::MinHeight(v) => height >= v,
            MediaFeature::MaxHeight(v) => height <= v,
            MediaFeature::Orientation(Orientation::Portrait) => height >= width,
            MediaFeature::Orientation(Orientation::Landscape) => width > height,
        }
    }
}

/// A parsed media query
///
/// Comma-separated alternatives are OR'd; features joined with `and` inside an
/// alternative are AND'd. A bare media type (`screen`, `all`) matches any size.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQuery {
    alternatives: Vec<Vec<MediaFeature>>,
}

fn feature_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\(\s*([a-z-]+)\s*:\s*([a-z0-9.]+?)\s*(px)?\s*\)$").expect("valid regex")
    })
}

fn and_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+and\s+").expect("valid regex"))
}

impl MediaQuery {
    /// Parse a media query string
    pub fn parse(query: &str) -> ViewportResult<Self> {
        let invalid = |reason: String| ViewportError::InvalidQuery {
            query: query.to_string(),
            reason,
        };

        let lowered = query.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return Err(invalid("empty query".into()));
        }

        let mut alternatives = Vec::new();
        for alternative in lowered.split(',') {
            let mut features = Vec::new();
            for part in and_regex().split(alternative.trim()) {
                let part = part.trim();
                match part {
                    "all" | "screen" | "only screen" => continue,
                    "" => return Err(invalid("empty media feature".into())),
                    _ => {}
                }

                let caps = feature_regex()
                    .captures(part)
                    .ok_or_else(|| invalid(format!("cannot parse '{part}'")))?;
                let name = &caps[1];
                let value = &caps[2];

                let feature = if name == "orientation" {
                    match value {
                        "portrait" => MediaFeature::Orientation(Orientation::Portrait),
                        "landscape" => MediaFeature::Orientation(Orientation::Landscape),
                        other => return Err(invalid(format!("unknown orientation '{other}'"))),
                    }
                } else {
                    let pixels: f64 = value
                        .parse()
                        .map_err(|_| invalid(format!("'{value}' is not a length")))?;
                    match name {
                        "min-width" => MediaFeature::MinWidth(pixels),
                        "max-width" => MediaFeature::MaxWidth(pixels),
                        "min-height" => MediaFeature::MinHeight(pixels),
                        "max-height" => MediaFeature::MaxHeight(pixels),
                        other => return Err(invalid(format!("unsupported feature '{other}'"))),
                    }
                };
                features.push(feature);
            }
            alternatives.push(features);
        }

        Ok(Self { alternatives })
    }

    /// Evaluate against a viewport of the given size
    pub fn matches(&self, width: f64, height: f64) -> bool {
        self.alternatives
            .iter()
            .any(|features| features.iter().all(|f| f.matches(width, height)))
    }
}

impl FromStr for MediaQuery {
    type Err = ViewportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaQuery::parse(s)
    }
}

struct Watcher {
    id: u64,
    query: Option<MediaQuery>,
    last: bool,
    callback: ViewportCallback,
}

struct ViewportInner {
    width: f64,
    height: f64,
    next_id: u64,
    watchers: Vec<Watcher>,
}

impl ViewportInner {
    fn evaluate(&self, query: Option<&MediaQuery>) -> bool {
        query.is_some_and(|q| q.matches(self.width, self.height))
    }
}

/// In-process viewport with an explicit size
#[derive(Clone)]
pub struct SimulatedViewport {
    inner: Arc<Mutex<ViewportInner>>,
}

impl SimulatedViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ViewportInner {
                width: f64::from(width),
                height: f64::from(height),
                next_id: 0,
                watchers: Vec::new(),
            })),
        }
    }

    /// Current `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        (inner.width as u32, inner.height as u32)
    }

    /// Number of live watches
    pub fn watcher_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watchers
            .len()
    }

    /// Resize the viewport and notify every watcher whose query flipped.
    /// Callbacks run after the internal lock is released.
    pub fn resize(&self, width: u32, height: u32) {
        let callbacks: Vec<ViewportCallback> = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.width = f64::from(width);
            inner.height = f64::from(height);

            let (w, h) = (inner.width, inner.height);
            inner
                .watchers
                .iter_mut()
                .filter_map(|watcher| {
                    let now = watcher.query.as_ref().is_some_and(|q| q.matches(w, h));
                    if now == watcher.last {
                        return None;
                    }
                    watcher.last = now;
                    Some(Arc::clone(&watcher.callback))
                })
                .collect()
        };

        debug!(width, height, notified = callbacks.len(), "Viewport resized");
        for callback in callbacks {
            callback();
        }
    }
}

impl Default for SimulatedViewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl fmt::Debug for SimulatedViewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.size();
        f.debug_struct("SimulatedViewport")
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

fn parse_logged(media_query: &str) -> Option<MediaQuery> {
    match MediaQuery::parse(media_query) {
        Ok(query) => Some(query),
        Err(e) => {
            debug!(error = %e, "Media query never matches");
            None
        }
    }
}

impl Viewport for SimulatedViewport {
    fn matches(&self, media_query: &str) -> bool {
        let query = parse_logged(media_query);
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let result = inner.evaluate(query.as_ref());
        trace!(media_query, result, "Evaluated media query");
        result
    }

    fn watch(&self, media_query: &str, callback: ViewportCallback) -> ViewportWatch {
        let query = parse_logged(media_query);
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = inner.next_id;
            inner.next_id += 1;
            let last = inner.evaluate(query.as_ref());
            inner.watchers.push(Watcher {
                id,
                query,
                last,
                callback,
            });
            id
        };

        let weak: Weak<Mutex<ViewportInner>> = Arc::downgrade(&self.inner);
        ViewportWatch::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .watchers
                    .retain(|w| w.id != id);
            }
        })
    }
}
