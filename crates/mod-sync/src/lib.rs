mod catchup;
mod runner;
mod state;

pub use catchup::collect_new_mails;
pub use runner::{DoneSet, MailOutcome, RunSummary, Runner};
pub use state::SyncState;
