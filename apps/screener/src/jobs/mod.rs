// Job management: the openings résumés are screened against.
// Jobs are created once and read-only afterwards; a batch never edits its job.

pub mod handlers;
