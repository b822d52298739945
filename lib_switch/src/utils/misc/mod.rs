/// System information retrieval (process identity, host, addresses).
pub mod sys_info;
/// General helper functions for time formatting, tokens, and hashing.
pub mod utils;
