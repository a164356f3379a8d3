//! Visibility resolution.
//!
//! Collapses the layer stack under the cursor into the minimal set of
//! layers that can actually be seen from above.

mod resolver;

pub use resolver::{resolve_visible_layers, ResolvedLayer, VisibleCell, VisibleGrid};
