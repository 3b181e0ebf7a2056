// Test module entry point for replication tests
// Source, target and transport behaviour end to end

mod common;
mod source_tests;
mod tcp_tests;
