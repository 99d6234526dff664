//! Small shared utilities.

pub mod block_param;
