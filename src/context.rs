//! # Session Context
//!
//! Classification vocabulary and process-wide wiring that sessions share.
//! Nothing here is a singleton: callers build a [`Context`], customize it,
//! and hand an `Arc` of it to each editor session that should share it.
//! Two sessions with different contexts never observe each other's label
//! overrides.

use hashbrown::HashMap;
use phf::phf_map;

/// ASPRS LAS point classes. Codes without an entry read as "reserved".
static CLASSIFICATION_LABELS: phf::Map<u8, &'static str> = phf_map! {
    0u8 => "never classified",
    1u8 => "unassigned",
    2u8 => "ground",
    3u8 => "low vegetation",
    4u8 => "medium vegetation",
    5u8 => "high vegetation",
    6u8 => "building",
    7u8 => "low point (noise)",
    8u8 => "model key point",
    9u8 => "water",
    10u8 => "rail",
    11u8 => "road surface",
    12u8 => "overlap",
    13u8 => "wire guard",
    14u8 => "wire conductor",
    15u8 => "transmission tower",
    16u8 => "wire structure connector",
    17u8 => "bridge deck",
    18u8 => "high noise",
};

/// Shared vocabulary for one or more editor sessions.
#[derive(Debug, Default)]
pub struct Context {
    labels: HashMap<u8, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for a classification code: session override first, then the
    /// LAS table, then "reserved".
    pub fn classification_label(&self, code: u8) -> &str {
        if let Some(label) = self.labels.get(&code) {
            return label;
        }
        CLASSIFICATION_LABELS.get(&code).copied().unwrap_or("reserved")
    }

    /// Renames a classification code for this context. Forestry projects
    /// routinely repurpose the reserved band (19..63) for species or stem
    /// classes.
    pub fn set_classification_label(&mut self, code: u8, label: impl Into<String>) {
        self.labels.insert(code, label.into());
    }

    /// Drops an override, restoring the LAS label.
    pub fn reset_classification_label(&mut self, code: u8) {
        self.labels.remove(&code);
    }

    /// Installs the process-wide log subscriber, filtered by `RUST_LOG`.
    ///
    /// Explicit and idempotent: library code only emits events, and a host
    /// that already installed its own subscriber keeps it.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(true)
            .try_init();
    }
}
