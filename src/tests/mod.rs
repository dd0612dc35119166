//! tests/mod.rs


mod batch_tests;
mod delivery_tests;
mod generation_tests;
mod imap_tests;
mod layout_tests;
mod ledger_tests;
