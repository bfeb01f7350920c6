//! Host-stack headroom for the recursive walks over source trees.

/// Remaining stack below which the next recursion step moves to a new segment.
const RED_ZONE: usize = 128 * 1024;
/// Size of each heap-allocated segment.
const SEGMENT_SIZE: usize = 4 * 1024 * 1024;

/// Runs `f`, first switching to a fresh stack segment when the current one is
/// nearly used up. Recursion depth is then bounded by the caller's own limits,
/// not by the stack size of whichever thread runs the pipeline.
pub(crate) fn ensure<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}
