// src/stages/mod.rs
// Detectors for the big green dot -> red dot -> green dot sequence, plus the
// post-completion reset check. Each one reads the indicator store and decides;
// none of them writes anything.
pub mod completion;
pub mod entry;
pub mod invalidation;
pub mod reset;

pub use completion::{detect_completion, find_completion, CompletionOutcome};
pub use entry::{find_entry, EntryOutcome};
pub use invalidation::{detect_invalidation, find_invalidation, InvalidationOutcome};
pub use reset::{check_reset, detect_reset, ResetOutcome};
