//! Structural checks for addressing arrays.
//!
//! Owner/neighbour addressing and grouped sort/target arrays carry invariants
//! that every later stage relies on: owners non-decreasing, `owner < neighbour`
//! on every face, offsets that start at zero and end at the array length.
//! Types that hold such arrays implement [`DebugInvariants`]; the cheap form
//! runs only in debug builds or with the `strict-invariants` feature.
//!
//! ```
//! use ldu_agglom::prelude::*;
//!
//! let addr = LduAddressing::new(3, vec![0, 1], vec![1, 2]).unwrap();
//! assert!(addr.validate_invariants().is_ok());
//! addr.debug_assert_invariants();
//! ```

use crate::mesh_error::AgglomError;

/// Addressing whose layout can be re-checked after construction.
pub trait DebugInvariants {
    /// Panic on a broken layout when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// First violated layout rule.
    fn validate_invariants(&self) -> Result<(), AgglomError>;
}

/// Run a layout check and panic with `ctx` on failure, only in checked builds.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[addressing] ", $($ctx)*, ": {}"), e);
        }
    };
}
