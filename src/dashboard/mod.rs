//! The web dashboard.
//!
//! The browser-side behaviours of a typical single page dashboard (a sortable table whose sort
//! order is remembered, expandable detail rows, a light/dark theme and a bulk-actions dropdown)
//! are kept as server-side state in [`ui::Ui`]. Anything that has to survive a restart goes
//! through a [`prefs::PreferenceStore`] keyed like browser local storage:
//!
//! | key     | value                                          |
//! |---------|------------------------------------------------|
//! | `theme` | `light` or `dark`                              |
//! | `sort`  | `{"key":"expiration","direction":"desc"}`      |
//!
//! [`view::Dashboard`] is the data a render needs, shared by the HTML page ([`render`]) and the
//! JSON status endpoint.

pub mod logs;
pub mod prefs;
pub mod render;
pub mod ui;
pub mod view;

pub use prefs::{DynPreferenceStore, FilePreferences, MemoryPreferences, PreferenceStore};
pub use ui::{Flash, FlashLevel, Theme, Ui};
pub use view::{Dashboard, NextRuns};
