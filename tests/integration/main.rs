//! Integration tests: full weekly runs through the public API.

mod clv;
mod end_to_end;
mod fixtures;
