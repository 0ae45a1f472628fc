//! Public error type for grid generation.

/// Rasterizer error conditions.
///
/// Out-of-grid atoms and out-of-range type indices are not errors; they are
/// skipped silently, since typing schemes use negative sentinels and random
/// augmentation legitimately pushes atoms outside the box.
#[derive(Debug)]
pub enum GridError {
    /// An input or output tensor shape does not match the call's contract.
    ShapeMismatch(&'static str),
    /// The coordinate set carries the wrong typing representation for the call.
    MissingTyping(&'static str),
    /// Host and device tensors were mixed within a single call.
    StorageMismatch(&'static str),
    /// Grid settings or per-atom inputs violate a configuration invariant.
    InvalidConfiguration(&'static str),
    /// GPU kernel launch failed.
    Launch(String),
}
