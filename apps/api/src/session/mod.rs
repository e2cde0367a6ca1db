// Session domain: conversation lifecycle, anonymization tokens, and the
// interview completion state machine.

pub mod completion;
pub mod handlers;
pub mod lifecycle;
pub mod prompts;

/// Prefix marking synthetic, never-persisted session ids handed out for
/// preview/ephemeral starts. Operations on these ids are write-free no-ops.
pub const PREVIEW_ID_PREFIX: &str = "preview-";

pub fn is_preview_id(session_id: &str) -> bool {
    session_id.starts_with(PREVIEW_ID_PREFIX)
}
