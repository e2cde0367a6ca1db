// Retention domain: scheduled cutoff enforcement over raw responses and
// orphaned sessions, with an append-only audit log.

pub mod enforcer;
pub mod handlers;
