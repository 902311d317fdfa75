//! Unit tests for the public building blocks

mod test_backup;
mod test_retry;
mod test_stage;
mod test_transfer;
