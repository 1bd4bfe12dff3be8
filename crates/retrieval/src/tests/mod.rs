//! End-to-end retrieval scenarios over an in-memory store.

mod pipeline;
mod support;
