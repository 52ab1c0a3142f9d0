//! Integration tests for Collection: lazy loading, views, ranges and writes.

mod range;
mod scenarios;
mod support;
